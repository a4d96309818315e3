//! # Streaming and Player Tests
//!
//! Raw audio delivery, track metadata API and play counting.
//!
//! ```bash
//! cargo test --test streaming_test
//! ```

mod common;

use aula_audio::catalog;
use aula_audio::serve::TrackInfo;
use aula_audio::users::Role;
use common::{create_track, create_user, signed_in, start_test_server};

#[tokio::test]
async fn test_each_track_streams_its_own_bytes() {
    let server = start_test_server(|_| {}).await;
    let teacher = create_user(&server, "docente@school.test", Role::Teacher).await;
    let (client, _student) = signed_in(&server, "alumno@school.test", "student").await;

    let first = create_track(&server, "Las Vocales", "vocales.mp3", b"first-track-bytes", teacher.id).await;
    let second = create_track(&server, "Los Numeros", "numeros.wav", b"second track, other bytes", teacher.id).await;

    let response = client
        .get(format!("{}/stream/{}", server.url, first))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["content-type"], "audio/mpeg");
    assert_eq!(response.headers()["content-length"], "17");
    assert_eq!(response.bytes().await.unwrap().as_ref(), b"first-track-bytes");

    let response = client
        .get(format!("{}/stream/{}", server.url, second))
        .send()
        .await
        .unwrap();
    assert_eq!(response.headers()["content-type"], "audio/wav");
    assert_eq!(response.bytes().await.unwrap().as_ref(), b"second track, other bytes");

    let first_info: TrackInfo = client
        .get(format!("{}/api/cancion/{}", server.url, first))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let second_info: TrackInfo = client
        .get(format!("{}/api/cancion/{}", server.url, second))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(first_info.titulo, "Las Vocales");
    assert_eq!(first_info.archivo, format!("/stream/{}", first));
    assert_eq!(first_info.duracion, "1:35");
    assert_eq!(second_info.titulo, "Los Numeros");
    assert_ne!(first_info, second_info);
}

#[tokio::test]
async fn test_streaming_requires_login() {
    let server = start_test_server(|_| {}).await;
    let teacher = create_user(&server, "docente@school.test", Role::Teacher).await;
    let id = create_track(&server, "Privada", "privada.mp3", b"bytes", teacher.id).await;

    let client = common::no_redirect_browser();
    let response = client
        .get(format!("{}/stream/{}", server.url, id))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 303);
}

#[tokio::test]
async fn test_missing_or_inactive_tracks_are_not_found() {
    let server = start_test_server(|_| {}).await;
    let teacher = create_user(&server, "docente@school.test", Role::Teacher).await;
    let (client, _student) = signed_in(&server, "alumno@school.test", "student").await;

    let response = client
        .get(format!("{}/stream/9999", server.url))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);

    // Row present, file gone
    let orphan = create_track(&server, "Huerfana", "huerfana.mp3", b"bytes", teacher.id).await;
    std::fs::remove_file(server.state.uploads.music_dir().join("huerfana.mp3")).unwrap();
    let response = client
        .get(format!("{}/stream/{}", server.url, orphan))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);

    let hidden = create_track(&server, "Oculta", "oculta.mp3", b"bytes", teacher.id).await;
    assert!(catalog::deactivate_track(&server.state.pool, hidden).await.unwrap());
    for path in [format!("/stream/{}", hidden), format!("/api/cancion/{}", hidden), format!("/reproductor/{}", hidden)] {
        let response = client.get(format!("{}{}", server.url, path)).send().await.unwrap();
        assert_eq!(response.status(), 404, "{}", path);
    }
}

#[tokio::test]
async fn test_player_view_counts_one_play() {
    let server = start_test_server(|_| {}).await;
    let teacher = create_user(&server, "docente@school.test", Role::Teacher).await;
    let (client, student) = signed_in(&server, "alumno@school.test", "student").await;
    let id = create_track(&server, "Himno", "himno.mp3", b"bytes", teacher.id).await;

    let response = client
        .get(format!("{}/reproductor/{}", server.url, id))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body = response.text().await.unwrap();
    assert!(body.contains("Himno"));
    assert!(body.contains(&format!("/stream/{}", id)));
    assert!(body.contains("1 plays"));

    let track = catalog::find_track(&server.state.pool, id).await.unwrap().unwrap();
    assert_eq!(track.play_count, 1);
    assert_eq!(catalog::count_plays(&server.state.pool, id).await.unwrap(), 1);

    let event_user: i64 = sqlx::query_scalar("SELECT user_id FROM play_events WHERE track_id = ?")
        .bind(id)
        .fetch_one(&server.state.pool)
        .await
        .unwrap();
    assert_eq!(event_user, student.id);

    // Progress reports update the event without counting another play
    let response: serde_json::Value = client
        .post(format!("{}/api/reproduccion", server.url))
        .json(&serde_json::json!({"cancion_id": id, "segundos": 42, "completada": true}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(response["registrada"], true);

    let (seconds, completed): (i64, bool) =
        sqlx::query_as("SELECT seconds_played, completed FROM play_events WHERE track_id = ?")
            .bind(id)
            .fetch_one(&server.state.pool)
            .await
            .unwrap();
    assert_eq!(seconds, 42);
    assert!(completed);

    let track = catalog::find_track(&server.state.pool, id).await.unwrap().unwrap();
    assert_eq!(track.play_count, 1);

    // A second visit is a second play
    client
        .get(format!("{}/reproductor/{}", server.url, id))
        .send()
        .await
        .unwrap();
    let track = catalog::find_track(&server.state.pool, id).await.unwrap().unwrap();
    assert_eq!(track.play_count, 2);
    assert_eq!(catalog::count_plays(&server.state.pool, id).await.unwrap(), 2);
}

#[tokio::test]
async fn test_non_numeric_ids_are_not_found() {
    let server = start_test_server(|_| {}).await;
    let (client, _student) = signed_in(&server, "alumno@school.test", "student").await;

    for path in ["/stream/abc", "/reproductor/x", "/api/cancion/uno", "/playlists/lista"] {
        let response = client.get(format!("{}{}", server.url, path)).send().await.unwrap();
        assert_eq!(response.status(), 404, "{}", path);
        let body = response.text().await.unwrap();
        assert!(body.contains("Page not found"), "{}", path);
    }
}
