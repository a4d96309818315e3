//! # Authentication Tests
//!
//! Registration, login, logout and access control over real HTTP.
//!
//! ```bash
//! cargo test --test auth_test
//! ```

mod common;

use aula_audio::users::Role;
use common::{browser, login, no_redirect_browser, register, start_test_server, PASSWORD};

#[tokio::test]
async fn test_register_then_login_opens_a_session() {
    let server = start_test_server(|_| {}).await;
    let client = browser();

    let response = register(&client, &server.url, "Rosa.Quispe@School.test", "student").await;
    assert_eq!(response.status(), 200);
    assert!(response.url().path().ends_with("/login"));
    let body = response.text().await.unwrap();
    assert!(body.contains("Registration successful! You can now log in."));

    // Stored lowercased, with the student-only fields kept
    let user = aula_audio::users::find_by_email(&server.state.pool, "rosa.quispe@school.test")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(user.role, Role::Student);
    assert_eq!(user.grade.as_deref(), Some("2do"));
    assert_eq!(user.specialty, None);

    let response = login(&client, &server.url, "rosa.quispe@school.test", PASSWORD).await;
    assert_eq!(response.status(), 200);
    assert_eq!(response.url().path(), "/");
    let body = response.text().await.unwrap();
    assert!(body.contains("Welcome, Rosa!"));

    // The session cookie now unlocks protected pages
    let response = client
        .get(format!("{}/biblioteca", server.url))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.url().path(), "/biblioteca");
}

#[tokio::test]
async fn test_wrong_password_does_not_log_in() {
    let server = start_test_server(|_| {}).await;
    let client = browser();
    register(&client, &server.url, "luis@school.test", "student").await;

    let response = login(&client, &server.url, "luis@school.test", "not-the-password").await;
    assert_eq!(response.status(), 200);
    let body = response.text().await.unwrap();
    assert!(body.contains("Invalid email or password."));

    // Unknown emails get the same answer
    let response = login(&client, &server.url, "nobody@school.test", PASSWORD).await;
    let body = response.text().await.unwrap();
    assert!(body.contains("Invalid email or password."));

    let client = no_redirect_browser();
    login(&client, &server.url, "luis@school.test", "not-the-password").await;
    let response = client
        .get(format!("{}/biblioteca", server.url))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 303);
    let location = response.headers()["location"].to_str().unwrap();
    assert_eq!(location, "/login?next=%2Fbiblioteca");
}

#[tokio::test]
async fn test_login_returns_to_requested_page() {
    let server = start_test_server(|_| {}).await;
    let client = browser();
    register(&client, &server.url, "ana@school.test", "teacher").await;

    // Following the redirect lands on the login form carrying `next`
    let response = client
        .get(format!("{}/populares", server.url))
        .send()
        .await
        .unwrap();
    assert_eq!(response.url().path(), "/login");
    let body = response.text().await.unwrap();
    assert!(body.contains("Please log in to access this page."));

    let response = client
        .post(format!("{}/login?next=%2Fpopulares", server.url))
        .form(&[("email", "ana@school.test"), ("password", PASSWORD)])
        .send()
        .await
        .unwrap();
    assert_eq!(response.url().path(), "/populares");

    // Off-site targets are ignored
    let client = no_redirect_browser();
    let response = client
        .post(format!("{}/login?next=https%3A%2F%2Fevil.example", server.url))
        .form(&[("email", "ana@school.test"), ("password", PASSWORD)])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 303);
    assert_eq!(response.headers()["location"], "/");
}

#[tokio::test]
async fn test_registration_rejects_bad_input() {
    let server = start_test_server(|_| {}).await;
    let client = browser();

    let response = client
        .post(format!("{}/registro", server.url))
        .form(&[
            ("email", "mario@school.test"),
            ("nombre", "Mario"),
            ("apellidos", "Rojas"),
            ("password", "abc123"),
            ("password2", "abc124"),
        ])
        .send()
        .await
        .unwrap();
    let body = response.text().await.unwrap();
    assert!(body.contains("Passwords do not match."));

    // Nobody can sign up as an administrator
    let response = client
        .post(format!("{}/registro", server.url))
        .form(&[
            ("email", "mario@school.test"),
            ("nombre", "Mario"),
            ("apellidos", "Rojas"),
            ("password", "abc123"),
            ("password2", "abc123"),
            ("rol", "admin"),
        ])
        .send()
        .await
        .unwrap();
    let body = response.text().await.unwrap();
    assert!(body.contains("Please choose a valid role."));
    assert_eq!(aula_audio::users::count_all(&server.state.pool).await.unwrap(), 0);

    register(&client, &server.url, "mario@school.test", "student").await;
    let response = register(&client, &server.url, "MARIO@school.test", "student").await;
    let body = response.text().await.unwrap();
    assert!(body.contains("This email is already registered."));
    assert_eq!(aula_audio::users::count_all(&server.state.pool).await.unwrap(), 1);
}

#[tokio::test]
async fn test_logout_ends_the_session() {
    let server = start_test_server(|_| {}).await;
    let client = no_redirect_browser();
    register(&client, &server.url, "eva@school.test", "student").await;
    let response = login(&client, &server.url, "eva@school.test", PASSWORD).await;
    assert_eq!(response.status(), 303);

    let response = client
        .get(format!("{}/biblioteca", server.url))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let response = client
        .get(format!("{}/logout", server.url))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 303);

    let response = client
        .get(format!("{}/biblioteca", server.url))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 303);

    let sessions: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sessions")
        .fetch_one(&server.state.pool)
        .await
        .unwrap();
    assert_eq!(sessions, 0);
}
