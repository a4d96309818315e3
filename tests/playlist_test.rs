//! # Playlist Tests
//!
//! Creating, filling, viewing and deleting playlists through the HTTP surface.
//!
//! ```bash
//! cargo test --test playlist_test
//! ```

mod common;

use aula_audio::catalog;
use aula_audio::users::Role;
use common::{browser, create_track, create_user, login, signed_in, start_test_server, PASSWORD};

async fn create_playlist(client: &reqwest::Client, url: &str, name: &str, public: bool) -> (i64, String) {
    let mut form = vec![("nombre", name), ("descripcion", "Para la clase del lunes")];
    if public {
        form.push(("publica", "1"));
    }
    let response = client
        .post(format!("{}/playlists", url))
        .form(&form)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let id = response
        .url()
        .path()
        .rsplit('/')
        .next()
        .unwrap()
        .parse()
        .unwrap();
    (id, response.text().await.unwrap())
}

async fn add_track(client: &reqwest::Client, url: &str, playlist: i64, track: i64) -> String {
    client
        .post(format!("{}/playlists/{}/canciones", url, playlist))
        .form(&[("cancion_id", track.to_string())])
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap()
}

async fn entry_count(server: &common::TestServer, playlist: i64) -> i64 {
    catalog::count_playlist_entries(&server.state.pool, playlist)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_owner_builds_a_playlist_in_order() {
    let server = start_test_server(|_| {}).await;
    let (client, owner) = signed_in(&server, "docente@school.test", "teacher").await;
    let first = create_track(&server, "Primera", "primera.mp3", b"1", owner.id).await;
    let second = create_track(&server, "Segunda", "segunda.mp3", b"2", owner.id).await;

    let (id, body) = create_playlist(&client, &server.url, "Repaso de Matemáticas", true).await;
    assert!(body.contains("Playlist created!"));
    assert!(body.contains("Repaso de Matemáticas"));

    let body = add_track(&client, &server.url, id, second).await;
    assert!(body.contains("Track added to the playlist."));
    add_track(&client, &server.url, id, first).await;

    let entries = catalog::playlist_tracks(&server.state.pool, id).await.unwrap();
    let order: Vec<(i64, i64)> = entries.iter().map(|e| (e.position, e.track.id)).collect();
    assert_eq!(order, vec![(1, second), (2, first)]);

    let body = client
        .get(format!("{}/playlists/{}", server.url, id))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(body.contains("2 tracks"));
    assert!(body.contains("3:10"));
    assert!(body.find("Segunda").unwrap() < body.find("Primera").unwrap());

    // Unknown tracks are refused
    let body = add_track(&client, &server.url, id, 9999).await;
    assert!(body.contains("Track not found."));
    assert_eq!(entry_count(&server, id).await, 2);
}

#[tokio::test]
async fn test_playlist_name_is_required() {
    let server = start_test_server(|_| {}).await;
    let (client, owner) = signed_in(&server, "alumno@school.test", "student").await;

    let response = client
        .post(format!("{}/playlists", server.url))
        .form(&[("nombre", "   ")])
        .send()
        .await
        .unwrap();
    assert_eq!(response.url().path(), "/playlists");
    let body = response.text().await.unwrap();
    assert!(body.contains("Playlist name must be between 1 and 200 characters."));
    assert!(catalog::user_playlists(&server.state.pool, owner.id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_visibility_and_ownership_rules() {
    let server = start_test_server(|_| {}).await;
    let (owner_client, owner) = signed_in(&server, "docente@school.test", "teacher").await;
    let (other_client, _other) = signed_in(&server, "alumno@school.test", "student").await;
    let track = create_track(&server, "Tema", "tema.mp3", b"t", owner.id).await;

    let (private_id, _) = create_playlist(&owner_client, &server.url, "Solo para mi", false).await;
    let (public_id, _) = create_playlist(&owner_client, &server.url, "Para todos", true).await;

    // Private playlists do not exist for anyone else
    let response = other_client
        .get(format!("{}/playlists/{}", server.url, private_id))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);

    let body = other_client
        .get(format!("{}/playlists", server.url))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(body.contains("Para todos"));
    assert!(!body.contains("Solo para mi"));

    // Public ones can be viewed but not changed
    let body = other_client
        .get(format!("{}/playlists/{}", server.url, public_id))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(body.contains("Para todos"));
    assert!(!body.contains("Delete playlist"));

    let body = add_track(&other_client, &server.url, public_id, track).await;
    assert!(body.contains("Only the owner can add tracks to this playlist."));
    assert_eq!(entry_count(&server, public_id).await, 0);

    let body = other_client
        .post(format!("{}/playlists/{}/eliminar", server.url, public_id))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(body.contains("You cannot delete this playlist."));
    assert!(catalog::find_playlist(&server.state.pool, public_id)
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_deleting_a_playlist_keeps_its_tracks() {
    let server = start_test_server(|_| {}).await;
    let (client, owner) = signed_in(&server, "docente@school.test", "teacher").await;
    let first = create_track(&server, "Uno", "uno.mp3", b"1", owner.id).await;
    let second = create_track(&server, "Dos", "dos.mp3", b"2", owner.id).await;

    let (id, _) = create_playlist(&client, &server.url, "Temporal", false).await;
    add_track(&client, &server.url, id, first).await;
    add_track(&client, &server.url, id, second).await;
    assert_eq!(entry_count(&server, id).await, 2);

    let response = client
        .post(format!("{}/playlists/{}/eliminar", server.url, id))
        .send()
        .await
        .unwrap();
    assert_eq!(response.url().path(), "/playlists");
    let body = response.text().await.unwrap();
    assert!(body.contains("Playlist deleted."));

    assert!(catalog::find_playlist(&server.state.pool, id).await.unwrap().is_none());
    assert_eq!(entry_count(&server, id).await, 0);
    for track in [first, second] {
        let track = catalog::find_active_track(&server.state.pool, track).await.unwrap();
        assert!(track.is_some());
    }
    assert_eq!(common::count_tracks(&server).await, 2);
}

#[tokio::test]
async fn test_admin_can_delete_any_playlist() {
    let server = start_test_server(|_| {}).await;
    let (owner_client, _owner) = signed_in(&server, "docente@school.test", "teacher").await;
    let (id, _) = create_playlist(&owner_client, &server.url, "Moderada", true).await;

    create_user(&server, "director@school.test", Role::Admin).await;
    let admin_client = browser();
    login(&admin_client, &server.url, "director@school.test", PASSWORD).await;

    let response = admin_client
        .post(format!("{}/playlists/{}/eliminar", server.url, id))
        .send()
        .await
        .unwrap();
    assert_eq!(response.url().path(), "/playlists");
    assert!(catalog::find_playlist(&server.state.pool, id).await.unwrap().is_none());
}
