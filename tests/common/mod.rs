//! Helpers shared by the HTTP integration tests

#![allow(dead_code)]

use std::sync::Arc;
use tokio::net::TcpListener;

use aula_audio::catalog::{self, NewTrack};
use aula_audio::config::AppConfig;
use aula_audio::serve::{build_router, AppState};
use aula_audio::users::{self, Role, User};

pub const SECRET: &str = "integration-test-secret";
pub const PASSWORD: &str = "secreto123";

pub struct TestServer {
    pub url: String,
    pub state: Arc<AppState>,
    pub handle: tokio::task::JoinHandle<()>,
    // Dropped last: holds the database file and the uploads tree
    pub guard: tempfile::TempDir,
}

/// Start the full application on an ephemeral port
///
/// `tweak` can adjust the config (size ceilings mostly) before the state is built.
pub async fn start_test_server<F>(tweak: F) -> TestServer
where
    F: FnOnce(&mut AppConfig),
{
    let (pool, guard) = aula_audio::db::create_test_connection_in_temporary_file()
        .await
        .unwrap();
    aula_audio::db::init_database_schema(&pool).await.unwrap();

    let mut config = AppConfig {
        secret_key: SECRET.to_string(),
        upload_dir: guard.path().join("uploads"),
        ..AppConfig::default()
    };
    tweak(&mut config);

    let state = Arc::new(AppState::new(pool, config));
    state.uploads.ensure_dirs().await.unwrap();
    let app = build_router(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let url = format!("http://{}", addr);

    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give server time to start
    tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;

    TestServer {
        url,
        state,
        handle,
        guard,
    }
}

/// A browser-like client: keeps cookies and follows redirects
pub fn browser() -> reqwest::Client {
    reqwest::Client::builder().cookie_store(true).build().unwrap()
}

/// A client that stops at redirects so their targets can be checked
pub fn no_redirect_browser() -> reqwest::Client {
    reqwest::Client::builder()
        .cookie_store(true)
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}

pub async fn register(client: &reqwest::Client, url: &str, email: &str, role: &str) -> reqwest::Response {
    let mut form = vec![
        ("email", email),
        ("nombre", "Rosa"),
        ("apellidos", "Quispe Mamani"),
        ("password", PASSWORD),
        ("password2", PASSWORD),
        ("rol", role),
    ];
    if role == "student" {
        form.push(("grado", "2do"));
        form.push(("seccion", "B"));
    } else {
        form.push(("especialidad", "Comunicación"));
    }
    client
        .post(format!("{}/registro", url))
        .form(&form)
        .send()
        .await
        .unwrap()
}

pub async fn login(client: &reqwest::Client, url: &str, email: &str, password: &str) -> reqwest::Response {
    client
        .post(format!("{}/login", url))
        .form(&[("email", email), ("password", password)])
        .send()
        .await
        .unwrap()
}

/// Register through the form, log in, and return the stored user
pub async fn signed_in(server: &TestServer, email: &str, role: &str) -> (reqwest::Client, User) {
    let client = browser();
    let response = register(&client, &server.url, email, role).await;
    assert!(response.status().is_success());
    let response = login(&client, &server.url, email, PASSWORD).await;
    assert!(response.status().is_success());

    let user = users::find_by_email(&server.state.pool, email)
        .await
        .unwrap()
        .unwrap();
    (client, user)
}

/// Insert a user directly, bypassing the form
pub async fn create_user(server: &TestServer, email: &str, role: Role) -> User {
    users::insert_user(
        &server.state.pool,
        &users::NewUser {
            email: email.to_string(),
            first_name: "Jorge".to_string(),
            last_name: "Huaman".to_string(),
            password_hash: users::hash_password(SECRET, PASSWORD).unwrap(),
            role,
            grade: None,
            section: None,
            specialty: None,
        },
    )
    .await
    .unwrap()
}

/// Place `bytes` in the music directory and catalog them as a track
pub async fn create_track(server: &TestServer, title: &str, file_name: &str, bytes: &[u8], uploaded_by: i64) -> i64 {
    let path = server.state.uploads.music_dir().join(file_name);
    tokio::fs::write(&path, bytes).await.unwrap();

    catalog::insert_track(
        &server.state.pool,
        &NewTrack {
            title: title.to_string(),
            artist: "Coro Escolar".to_string(),
            genre: Some("educativo".to_string()),
            subject: Some("matematicas".to_string()),
            duration_secs: Some(95),
            audio_file: file_name.to_string(),
            uploaded_by,
            ..Default::default()
        },
    )
    .await
    .unwrap()
}

/// A valid 16-bit PCM mono WAV of silence
pub fn wav_bytes(sample_rate: u32, seconds: u32) -> Vec<u8> {
    let data_len = sample_rate * seconds * 2;
    let mut out = Vec::with_capacity(44 + data_len as usize);
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes()); // PCM
    out.extend_from_slice(&1u16.to_le_bytes()); // mono
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&(sample_rate * 2).to_le_bytes()); // byte rate
    out.extend_from_slice(&2u16.to_le_bytes()); // block align
    out.extend_from_slice(&16u16.to_le_bytes()); // bits per sample
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    out.resize(44 + data_len as usize, 0);
    out
}

pub async fn count_tracks(server: &TestServer) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM tracks")
        .fetch_one(&server.state.pool)
        .await
        .unwrap()
}

pub fn music_files(server: &TestServer) -> Vec<String> {
    std::fs::read_dir(server.state.uploads.music_dir())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect()
}
