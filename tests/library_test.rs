//! # Library Tests
//!
//! Catalog search, popularity ranking, dashboard and miscellaneous routes.
//!
//! ```bash
//! cargo test --test library_test
//! ```

mod common;

use aula_audio::catalog::{self, NewTrack};
use aula_audio::users::Role;
use common::{create_track, create_user, signed_in, start_test_server};

async fn get_text(client: &reqwest::Client, url: String) -> String {
    client.get(url).send().await.unwrap().text().await.unwrap()
}

#[tokio::test]
async fn test_search_filters_by_text_genre_and_subject() {
    let server = start_test_server(|_| {}).await;
    let teacher = create_user(&server, "docente@school.test", Role::Teacher).await;
    let (client, _student) = signed_in(&server, "alumno@school.test", "student").await;

    for (title, artist, genre, subject) in [
        ("Tablas del Siete", "Coro Escolar", "educativo", "matematicas"),
        ("Marinera Norteña", "Conjunto del Norte", "folclore", "arte"),
        ("Huayno de la Sierra", "Conjunto del Sur", "folclore", "historia"),
    ] {
        catalog::insert_track(
            &server.state.pool,
            &NewTrack {
                title: title.to_string(),
                artist: artist.to_string(),
                genre: Some(genre.to_string()),
                subject: Some(subject.to_string()),
                audio_file: format!("{}.mp3", title.len()),
                uploaded_by: teacher.id,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    }

    let body = get_text(&client, format!("{}/biblioteca?buscar=conjunto", server.url)).await;
    assert!(body.contains("2 tracks found"));
    assert!(body.contains("Marinera Norteña"));
    assert!(body.contains("Huayno de la Sierra"));
    assert!(!body.contains("Tablas del Siete"));

    let body = get_text(
        &client,
        format!("{}/biblioteca?buscar=&genero=folclore&materia=historia", server.url),
    )
    .await;
    assert!(body.contains("1 tracks found"));
    assert!(body.contains("Huayno de la Sierra"));

    let body = get_text(&client, format!("{}/biblioteca", server.url)).await;
    assert!(body.contains("3 tracks found"));

    let body = get_text(&client, format!("{}/biblioteca?buscar=zzz", server.url)).await;
    assert!(body.contains("0 tracks found"));
}

#[tokio::test]
async fn test_popular_ranking_follows_plays() {
    let server = start_test_server(|_| {}).await;
    let teacher = create_user(&server, "docente@school.test", Role::Teacher).await;
    let (client, student) = signed_in(&server, "alumno@school.test", "student").await;

    let quiet = create_track(&server, "Poco Escuchada", "poco.mp3", b"p", teacher.id).await;
    let loud = create_track(&server, "Muy Escuchada", "muy.mp3", b"m", teacher.id).await;
    for _ in 0..3 {
        catalog::record_play(&server.state.pool, student.id, loud).await.unwrap();
    }
    catalog::record_play(&server.state.pool, student.id, quiet).await.unwrap();

    let body = get_text(&client, format!("{}/populares", server.url)).await;
    let loud_at = body.find("Muy Escuchada").unwrap();
    let quiet_at = body.find("Poco Escuchada").unwrap();
    assert!(loud_at < quiet_at);
}

#[tokio::test]
async fn test_dashboard_shows_counts_to_everyone() {
    let server = start_test_server(|_| {}).await;
    let teacher = create_user(&server, "docente@school.test", Role::Teacher).await;
    create_user(&server, "alumno1@school.test", Role::Student).await;
    create_user(&server, "alumno2@school.test", Role::Student).await;
    create_track(&server, "Visible", "visible.mp3", b"v", teacher.id).await;
    let hidden = create_track(&server, "Retirada", "retirada.mp3", b"r", teacher.id).await;
    catalog::deactivate_track(&server.state.pool, hidden).await.unwrap();

    let stats = catalog::dashboard_stats(&server.state.pool).await.unwrap();
    assert_eq!(stats.tracks, 1);
    assert_eq!(stats.teachers, 1);
    assert_eq!(stats.students, 2);

    // Anonymous visitors get the dashboard too
    let response = reqwest::get(format!("{}/", server.url)).await.unwrap();
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_health_and_unknown_routes() {
    let server = start_test_server(|_| {}).await;

    let response = reqwest::get(format!("{}/health", server.url)).await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "OK");

    let response = reqwest::get(format!("{}/no-existe", server.url)).await.unwrap();
    assert_eq!(response.status(), 404);
    let body = response.text().await.unwrap();
    assert!(body.contains("Page not found"));
}

#[tokio::test]
async fn test_paging_past_the_end_still_renders() {
    let server = start_test_server(|_| {}).await;
    let teacher = create_user(&server, "docente@school.test", Role::Teacher).await;
    let (client, _student) = signed_in(&server, "alumno@school.test", "student").await;

    for n in 0..21 {
        catalog::insert_track(
            &server.state.pool,
            &NewTrack {
                title: format!("Leccion {:02}", n),
                artist: "Coro Escolar".to_string(),
                audio_file: format!("leccion{}.mp3", n),
                uploaded_by: teacher.id,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    }

    // Newest first, so the second page holds the oldest track
    let body = get_text(&client, format!("{}/biblioteca?page=2", server.url)).await;
    assert!(body.contains("21 tracks found"));
    assert!(body.contains("Leccion 00"));
    assert!(!body.contains("Leccion 20"));
    assert!(body.contains("Page 2 of 2"));

    for path in [
        "/biblioteca?page=99",
        "/biblioteca?page=18446744073709551615",
        "/playlists?page=9223372036854775807",
        "/playlists?page=18446744073709551615",
    ] {
        let response = client.get(format!("{}{}", server.url, path)).send().await.unwrap();
        assert_eq!(response.status(), 200, "{}", path);
        let body = response.text().await.unwrap();
        assert!(!body.contains("Leccion"), "{}", path);
    }
}
