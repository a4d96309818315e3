use axum::{
    extract::{DefaultBodyLimit, FromRequestParts, Multipart, Path, Query, State},
    http::{request::Parts, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePool;
use std::sync::Arc;
use time::Duration;
use tower_http::services::ServeDir;

use crate::catalog::{self, TrackFilter};
use crate::config::AppConfig;
use crate::constants::{DASHBOARD_LIST_LIMIT, FLASH_COOKIE, SESSION_COOKIE, TRACKS_PER_PAGE};
use crate::db;
use crate::error::{AppError, MediaKind, UploadError};
use crate::streaming;
use crate::upload::{cover_warning, TrackForm, UploadPipeline};
use crate::users::{self, Registration, User};
use crate::views::{self, Flash, PageContext};

/// Shared state for all handlers
pub struct AppState {
    pub pool: SqlitePool,
    pub config: AppConfig,
    pub uploads: UploadPipeline,
}

impl AppState {
    pub fn new(pool: SqlitePool, config: AppConfig) -> Self {
        let uploads = UploadPipeline::new(
            config.upload_dir.clone(),
            config.audio_limit(),
            config.image_limit(),
        );
        AppState {
            pool,
            config,
            uploads,
        }
    }
}

pub type SharedState = Arc<AppState>;
type HandlerResult = Result<Response, AppError>;

fn app_cookie(name: &'static str, value: String) -> Cookie<'static> {
    let mut cookie = Cookie::new(name, value);
    cookie.set_path("/");
    cookie.set_http_only(true);
    cookie.set_same_site(SameSite::Lax);
    cookie
}

fn session_cookie(config: &AppConfig, token: &str, max_age: Option<i64>) -> Cookie<'static> {
    let mut cookie = app_cookie(SESSION_COOKIE, token.to_string());
    cookie.set_max_age(max_age.map(Duration::seconds));
    cookie.set_secure(config.secure_cookies);
    cookie
}

fn removal_cookie(name: &'static str) -> Cookie<'static> {
    let mut cookie = app_cookie(name, String::new());
    cookie.make_removal();
    cookie
}

/// Flash messages travel in a cookie as url-encoded `level:message` lines
fn flash_cookie(flashes: &[Flash]) -> Cookie<'static> {
    let lines: Vec<String> = flashes
        .iter()
        .map(|f| format!("{}:{}", f.level, f.message))
        .collect();
    app_cookie(FLASH_COOKIE, urlencoding::encode(&lines.join("\n")).into_owned())
}

fn parse_flashes(raw: &str) -> Vec<Flash> {
    let Ok(decoded) = urlencoding::decode(raw) else {
        return Vec::new();
    };
    decoded
        .lines()
        .filter_map(|line| line.split_once(':'))
        .map(|(level, message)| Flash::new(level, message))
        .collect()
}

/// Flash messages left by the previous response
pub struct Flashes(pub Vec<Flash>);

impl<S: Send + Sync> FromRequestParts<S> for Flashes {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        Ok(Flashes(
            jar.get(FLASH_COOKIE)
                .map(|cookie| parse_flashes(cookie.value()))
                .unwrap_or_default(),
        ))
    }
}

async fn session_user(parts: &Parts, state: &SharedState) -> Result<Option<User>, AppError> {
    let jar = CookieJar::from_headers(&parts.headers);
    match jar.get(SESSION_COOKIE).map(|cookie| cookie.value()) {
        Some(token) if !token.is_empty() => users::find_session_user(&state.pool, token).await,
        _ => Ok(None),
    }
}

/// The logged-in user, if any
pub struct MaybeUser(pub Option<User>);

impl FromRequestParts<SharedState> for MaybeUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(session_user(parts, state).await?))
    }
}

/// The logged-in user; anonymous requests are sent to the login page
pub struct CurrentUser(pub User);

impl FromRequestParts<SharedState> for CurrentUser {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        match session_user(parts, state).await {
            Ok(Some(user)) => Ok(CurrentUser(user)),
            Ok(None) => {
                let next = parts
                    .uri
                    .path_and_query()
                    .map_or("/", |pq| pq.as_str());
                Err(redirect_with_flash(
                    &format!("/login?next={}", urlencoding::encode(next)),
                    "info",
                    "Please log in to access this page.",
                ))
            }
            Err(e) => Err(e.into_response()),
        }
    }
}

/// Numeric `{id}` path segment; anything else is a missing page
pub struct RecordId(pub i64);

impl<S: Send + Sync> FromRequestParts<S> for RecordId {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(id) = Path::<i64>::from_request_parts(parts, state)
            .await
            .map_err(|_| AppError::NotFound)?;
        Ok(RecordId(id))
    }
}

/// Render a page, clearing the flash cookie if flashes were shown
fn render(had_flashes: bool, status: StatusCode, html: String) -> Response {
    let mut jar = CookieJar::new();
    if had_flashes {
        jar = jar.add(removal_cookie(FLASH_COOKIE));
    }
    (status, jar, Html(html)).into_response()
}

fn redirect_with_flashes(
    to: &str,
    flashes: &[Flash],
    extra_cookies: Vec<Cookie<'static>>,
) -> Response {
    let jar = extra_cookies
        .into_iter()
        .fold(CookieJar::new(), |jar, cookie| jar.add(cookie))
        .add(flash_cookie(flashes));
    (jar, Redirect::to(to)).into_response()
}

fn redirect_with_flash(to: &str, level: &str, message: &str) -> Response {
    redirect_with_flashes(to, &[Flash::new(level, message)], Vec::new())
}

/// Only same-site absolute paths are followed after login
fn safe_next(next: Option<&str>) -> &str {
    match next {
        Some(n) if n.starts_with('/') && !n.starts_with("//") && !n.contains('\\') => n,
        _ => "/",
    }
}

fn parse_page(raw: Option<&str>) -> u64 {
    raw.and_then(|p| p.trim().parse().ok()).unwrap_or(1)
}

async fn index_handler(
    State(state): State<SharedState>,
    MaybeUser(user): MaybeUser,
    Flashes(flashes): Flashes,
) -> HandlerResult {
    let stats = catalog::dashboard_stats(&state.pool).await?;
    let popular = catalog::popular_tracks(&state.pool, DASHBOARD_LIST_LIMIT).await?;
    let recent = catalog::recent_public_playlists(&state.pool, DASHBOARD_LIST_LIMIT).await?;

    let had_flashes = !flashes.is_empty();
    let ctx = PageContext {
        user: user.as_ref(),
        flashes,
    };
    Ok(render(
        had_flashes,
        StatusCode::OK,
        views::dashboard_page(&ctx, &stats, &popular, &recent),
    ))
}

#[derive(Debug, Deserialize)]
struct NextQuery {
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LoginForm {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
    recordarme: Option<String>,
}

async fn login_form_handler(
    MaybeUser(user): MaybeUser,
    Query(query): Query<NextQuery>,
    Flashes(flashes): Flashes,
) -> HandlerResult {
    if user.is_some() {
        return Ok(Redirect::to("/").into_response());
    }
    let had_flashes = !flashes.is_empty();
    let ctx = PageContext {
        user: None,
        flashes,
    };
    Ok(render(
        had_flashes,
        StatusCode::OK,
        views::login_page(&ctx, "", query.next.as_deref()),
    ))
}

async fn login_handler(
    State(state): State<SharedState>,
    Query(query): Query<NextQuery>,
    Form(form): Form<LoginForm>,
) -> HandlerResult {
    let authenticated =
        users::authenticate(&state.pool, &state.config.secret_key, &form.email, &form.password)
            .await?;

    let Some(user) = authenticated else {
        warn!("Failed login attempt for email: {}", form.email);
        let ctx = PageContext {
            user: None,
            flashes: vec![Flash::new("danger", "Invalid email or password.")],
        };
        return Ok(render(
            false,
            StatusCode::OK,
            views::login_page(&ctx, &form.email, query.next.as_deref()),
        ));
    };

    let remember = form.recordarme.is_some();
    let session = users::create_session(&state.pool, user.id, remember).await?;
    info!("Successful login: {} ({})", user.email, user.role);

    let cookie = session_cookie(
        &state.config,
        &session.token,
        remember.then(|| session.max_age_secs()),
    );
    Ok(redirect_with_flashes(
        safe_next(query.next.as_deref()),
        &[Flash::new("success", format!("Welcome, {}!", user.first_name))],
        vec![cookie],
    ))
}

async fn register_form_handler(
    MaybeUser(user): MaybeUser,
    Flashes(flashes): Flashes,
) -> HandlerResult {
    if user.is_some() {
        return Ok(Redirect::to("/").into_response());
    }
    let had_flashes = !flashes.is_empty();
    let ctx = PageContext {
        user: None,
        flashes,
    };
    Ok(render(
        had_flashes,
        StatusCode::OK,
        views::register_page(&ctx, &Registration::default()),
    ))
}

async fn register_handler(
    State(state): State<SharedState>,
    Form(form): Form<Registration>,
) -> HandlerResult {
    match users::register(&state.pool, &state.config.secret_key, &form).await {
        Ok(_) => Ok(redirect_with_flash(
            "/login",
            "success",
            "Registration successful! You can now log in.",
        )),
        Err(AppError::Validation(message)) => {
            let ctx = PageContext {
                user: None,
                flashes: vec![Flash::new("danger", message)],
            };
            Ok(render(
                false,
                StatusCode::OK,
                views::register_page(&ctx, &form),
            ))
        }
        Err(e) => Err(e),
    }
}

async fn logout_handler(State(state): State<SharedState>, jar: CookieJar) -> HandlerResult {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        users::delete_session(&state.pool, cookie.value()).await?;
    }
    Ok(redirect_with_flashes(
        "/",
        &[Flash::new("info", "You have logged out.")],
        vec![removal_cookie(SESSION_COOKIE)],
    ))
}

#[derive(Debug, Deserialize)]
struct LibraryQuery {
    buscar: Option<String>,
    genero: Option<String>,
    materia: Option<String>,
    page: Option<String>,
}

async fn library_handler(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<LibraryQuery>,
    Flashes(flashes): Flashes,
) -> HandlerResult {
    let filter = TrackFilter::new(
        query.buscar.as_deref(),
        query.genero.as_deref(),
        query.materia.as_deref(),
    );
    let page = catalog::search_tracks(&state.pool, &filter, parse_page(query.page.as_deref())).await?;

    let had_flashes = !flashes.is_empty();
    let ctx = PageContext {
        user: Some(&user),
        flashes,
    };
    Ok(render(
        had_flashes,
        StatusCode::OK,
        views::library_page(&ctx, &page, &filter),
    ))
}

async fn popular_handler(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    Flashes(flashes): Flashes,
) -> HandlerResult {
    let tracks = catalog::popular_tracks(&state.pool, TRACKS_PER_PAGE).await?;
    let had_flashes = !flashes.is_empty();
    let ctx = PageContext {
        user: Some(&user),
        flashes,
    };
    Ok(render(
        had_flashes,
        StatusCode::OK,
        views::popular_page(&ctx, &tracks),
    ))
}

fn deny_upload(user: &User) -> Response {
    warn!("User {} tried to upload music without permission", user.email);
    redirect_with_flash("/", "danger", "You do not have permission to upload music.")
}

fn upload_form(
    state: &AppState,
    user: &User,
    flashes: Vec<Flash>,
    had_cookie: bool,
    status: StatusCode,
) -> Response {
    let ctx = PageContext {
        user: Some(user),
        flashes,
    };
    let mb = |bytes: u64| bytes / (1024 * 1024);
    render(
        had_cookie,
        status,
        views::upload_page(
            &ctx,
            mb(state.uploads.limit(MediaKind::Audio)),
            mb(state.uploads.limit(MediaKind::Image)),
        ),
    )
}

async fn upload_form_handler(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    Flashes(flashes): Flashes,
) -> HandlerResult {
    if !user.can_upload() {
        return Ok(deny_upload(&user));
    }
    let had_flashes = !flashes.is_empty();
    Ok(upload_form(&state, &user, flashes, had_flashes, StatusCode::OK))
}

async fn upload_handler(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    mut multipart: Multipart,
) -> HandlerResult {
    if !user.can_upload() {
        return Ok(deny_upload(&user));
    }

    let mut form = TrackForm::default();
    let mut audio = None;
    let mut cover = None;
    let mut warnings = Vec::new();
    let mut rejection: Option<UploadError> = None;

    // Keep reading after a rejection so the client gets a response rather than a reset
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) if e.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                rejection = Some(UploadError::too_large(
                    MediaKind::Audio,
                    state.uploads.limit(MediaKind::Audio),
                ));
                break;
            }
            Err(e) => {
                rejection.get_or_insert(UploadError::Multipart(e.body_text()));
                break;
            }
        };
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().unwrap_or_default().to_string();

        match name.as_str() {
            "archivo_audio" if rejection.is_none() && !file_name.is_empty() => {
                match state.uploads.spool(field, &file_name, MediaKind::Audio).await {
                    Ok(spooled) => audio = Some(spooled),
                    Err(e) => rejection = Some(e),
                }
            }
            "cover_image" if rejection.is_none() && !file_name.is_empty() => {
                match state.uploads.spool(field, &file_name, MediaKind::Image).await {
                    Ok(spooled) => cover = Some(spooled),
                    Err(e) => {
                        warn!("Cover rejected during upload by {}: {}", user.email, e);
                        warnings.push(cover_warning(&e));
                    }
                }
            }
            "archivo_audio" | "cover_image" => {}
            _ => match field.text().await {
                Ok(value) => form.set_field(&name, value),
                Err(e) => {
                    rejection.get_or_insert(UploadError::Multipart(e.body_text()));
                }
            },
        }
    }

    if let Some(e) = rejection {
        warn!("Upload by {} rejected: {}", user.email, e);
        let flash = Flash::new("danger", format!("Audio file error: {}", e));
        return Ok(upload_form(&state, &user, vec![flash], false, StatusCode::BAD_REQUEST));
    }
    let Some(audio) = audio else {
        let flash = Flash::new("danger", "Please choose an audio file.");
        return Ok(upload_form(&state, &user, vec![flash], false, StatusCode::BAD_REQUEST));
    };

    match state
        .uploads
        .store_track(&state.pool, &user, &form, audio, cover)
        .await
    {
        Ok(stored) => {
            let mut flashes = vec![Flash::new("success", "Track uploaded successfully!")];
            flashes.extend(
                warnings
                    .into_iter()
                    .chain(stored.warnings)
                    .map(|w| Flash::new("warning", w)),
            );
            Ok(redirect_with_flashes("/biblioteca", &flashes, Vec::new()))
        }
        Err(e @ (AppError::Validation(_) | AppError::Upload(UploadError::TooLarge { .. }))) => {
            let flash = Flash::new("danger", e.user_message());
            Ok(upload_form(&state, &user, vec![flash], false, StatusCode::BAD_REQUEST))
        }
        Err(AppError::Upload(e @ UploadError::UnrecognizedFormat { .. })) => {
            let flash = Flash::new("danger", format!("Audio file error: {}", e));
            Ok(upload_form(&state, &user, vec![flash], false, StatusCode::BAD_REQUEST))
        }
        Err(e) => {
            error!("Unexpected error while uploading for {}: {}", user.email, e);
            let flash = Flash::new(
                "danger",
                "Unexpected error while uploading the track. Please try again.",
            );
            Ok(upload_form(
                &state,
                &user,
                vec![flash],
                false,
                StatusCode::INTERNAL_SERVER_ERROR,
            ))
        }
    }
}

async fn player_handler(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    RecordId(id): RecordId,
    Flashes(flashes): Flashes,
) -> HandlerResult {
    let mut track = catalog::find_active_track(&state.pool, id)
        .await?
        .ok_or(AppError::NotFound)?;

    // Every view of the player counts as a play
    catalog::record_play(&state.pool, user.id, track.id).await?;
    track.play_count += 1;

    let own_playlists = catalog::user_playlists(&state.pool, user.id).await?;
    let had_flashes = !flashes.is_empty();
    let ctx = PageContext {
        user: Some(&user),
        flashes,
    };
    Ok(render(
        had_flashes,
        StatusCode::OK,
        views::player_page(&ctx, &track, &own_playlists),
    ))
}

#[derive(Debug, Deserialize)]
struct PageQuery {
    page: Option<String>,
}

async fn playlists_handler(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<PageQuery>,
    Flashes(flashes): Flashes,
) -> HandlerResult {
    let own = catalog::user_playlists(&state.pool, user.id).await?;
    let public =
        catalog::public_playlists(&state.pool, Some(user.id), parse_page(query.page.as_deref()))
            .await?;

    let had_flashes = !flashes.is_empty();
    let ctx = PageContext {
        user: Some(&user),
        flashes,
    };
    Ok(render(
        had_flashes,
        StatusCode::OK,
        views::playlists_page(&ctx, &own, &public),
    ))
}

async fn create_playlist_handler(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    Form(form): Form<catalog::PlaylistForm>,
) -> HandlerResult {
    let new_playlist = match form.into_new_playlist(user.id) {
        Ok(p) => p,
        Err(AppError::Validation(message)) => {
            return Ok(redirect_with_flash("/playlists", "danger", &message))
        }
        Err(e) => return Err(e),
    };
    let playlist = catalog::create_playlist(&state.pool, &new_playlist).await?;
    info!("User {} created playlist #{} '{}'", user.email, playlist.id, playlist.name);
    Ok(redirect_with_flash(
        &format!("/playlists/{}", playlist.id),
        "success",
        "Playlist created!",
    ))
}

async fn playlist_detail_handler(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    RecordId(id): RecordId,
    Flashes(flashes): Flashes,
) -> HandlerResult {
    let playlist = catalog::find_playlist(&state.pool, id)
        .await?
        .filter(|p| p.visible_to(&user))
        .ok_or(AppError::NotFound)?;
    let entries = catalog::playlist_tracks(&state.pool, playlist.id).await?;
    let total = catalog::total_duration(&entries);

    let had_flashes = !flashes.is_empty();
    let ctx = PageContext {
        user: Some(&user),
        flashes,
    };
    Ok(render(
        had_flashes,
        StatusCode::OK,
        views::playlist_page(
            &ctx,
            &playlist,
            &entries,
            &total,
            playlist.is_owned_by(&user),
            playlist.deletable_by(&user),
        ),
    ))
}

#[derive(Debug, Deserialize)]
struct AddTrackForm {
    #[serde(default)]
    cancion_id: String,
}

async fn add_track_handler(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    RecordId(id): RecordId,
    Form(form): Form<AddTrackForm>,
) -> HandlerResult {
    let playlist = catalog::find_playlist(&state.pool, id)
        .await?
        .filter(|p| p.visible_to(&user))
        .ok_or(AppError::NotFound)?;
    let back = format!("/playlists/{}", playlist.id);

    if !playlist.is_owned_by(&user) {
        warn!("User {} tried to modify playlist #{}", user.email, playlist.id);
        return Ok(redirect_with_flash(
            &back,
            "danger",
            "Only the owner can add tracks to this playlist.",
        ));
    }

    let Ok(track_id) = form.cancion_id.trim().parse::<i64>() else {
        return Ok(redirect_with_flash(&back, "danger", "Please choose a valid track."));
    };
    match catalog::add_to_playlist(&state.pool, playlist.id, track_id).await {
        Ok(_) => Ok(redirect_with_flash(&back, "success", "Track added to the playlist.")),
        Err(AppError::NotFound) => Ok(redirect_with_flash(&back, "danger", "Track not found.")),
        Err(e) => Err(e),
    }
}

async fn delete_playlist_handler(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    RecordId(id): RecordId,
) -> HandlerResult {
    let playlist = catalog::find_playlist(&state.pool, id)
        .await?
        .filter(|p| p.visible_to(&user))
        .ok_or(AppError::NotFound)?;

    if !playlist.deletable_by(&user) {
        warn!("User {} tried to delete playlist #{}", user.email, playlist.id);
        return Ok(redirect_with_flash(
            &format!("/playlists/{}", playlist.id),
            "danger",
            "You cannot delete this playlist.",
        ));
    }

    catalog::delete_playlist(&state.pool, playlist.id).await?;
    info!("User {} deleted playlist #{}", user.email, playlist.id);
    Ok(redirect_with_flash("/playlists", "success", "Playlist deleted."))
}

/// Track metadata for the player script
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct TrackInfo {
    pub id: i64,
    pub titulo: String,
    pub artista: String,
    pub album: Option<String>,
    pub genero: Option<String>,
    pub materia: Option<String>,
    pub duracion: String,
    pub archivo: String,
    pub cover: Option<String>,
    pub reproducciones: i64,
}

async fn track_api_handler(
    State(state): State<SharedState>,
    CurrentUser(_user): CurrentUser,
    RecordId(id): RecordId,
) -> Result<Json<TrackInfo>, AppError> {
    let track = catalog::find_active_track(&state.pool, id)
        .await?
        .ok_or(AppError::NotFound)?;

    Ok(Json(TrackInfo {
        id: track.id,
        duracion: track.duration_label(),
        archivo: format!("/stream/{}", track.id),
        cover: track.cover_url(),
        titulo: track.title,
        artista: track.artist,
        album: track.album,
        genero: track.genre,
        materia: track.subject,
        reproducciones: track.play_count,
    }))
}

#[derive(Debug, Deserialize)]
struct ProgressReport {
    cancion_id: i64,
    #[serde(default)]
    segundos: i64,
    #[serde(default)]
    completada: bool,
}

#[derive(Debug, Serialize)]
struct ProgressResponse {
    registrada: bool,
}

async fn progress_api_handler(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    Json(report): Json<ProgressReport>,
) -> Result<Json<ProgressResponse>, AppError> {
    let registrada = catalog::record_progress(
        &state.pool,
        user.id,
        report.cancion_id,
        report.segundos,
        report.completada,
    )
    .await?;
    Ok(Json(ProgressResponse { registrada }))
}

async fn stream_handler(
    State(state): State<SharedState>,
    CurrentUser(_user): CurrentUser,
    RecordId(id): RecordId,
) -> HandlerResult {
    let file = streaming::resolve_track_file(&state.pool, state.uploads.upload_dir(), id).await?;
    streaming::stream_response(file).await
}

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn not_found_handler() -> AppError {
    AppError::NotFound
}

/// Build the application router
pub fn build_router(state: SharedState) -> Router {
    let upload_body_limit = (state.uploads.limit(MediaKind::Audio)
        + state.uploads.limit(MediaKind::Image)
        + 1024 * 1024) as usize;

    Router::new()
        .route("/", get(index_handler))
        .route("/login", get(login_form_handler).post(login_handler))
        .route("/registro", get(register_form_handler).post(register_handler))
        .route("/logout", get(logout_handler))
        .route("/biblioteca", get(library_handler))
        .route("/populares", get(popular_handler))
        .route(
            "/subir",
            get(upload_form_handler)
                .post(upload_handler)
                .layer(DefaultBodyLimit::max(upload_body_limit)),
        )
        .route("/reproductor/{id}", get(player_handler))
        .route("/playlists", get(playlists_handler).post(create_playlist_handler))
        .route("/playlists/{id}", get(playlist_detail_handler))
        .route("/playlists/{id}/canciones", post(add_track_handler))
        .route("/playlists/{id}/eliminar", post(delete_playlist_handler))
        .route("/api/cancion/{id}", get(track_api_handler))
        .route("/api/reproduccion", post(progress_api_handler))
        .route("/stream/{id}", get(stream_handler))
        .route("/health", get(health_handler))
        .nest_service("/uploads/covers", ServeDir::new(state.uploads.covers_dir()))
        .nest_service("/uploads/avatars", ServeDir::new(state.uploads.avatars_dir()))
        .fallback(not_found_handler)
        .with_state(state)
}

/// Prepare the database and uploads tree, then serve until shutdown
pub async fn run_server(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    config.validate()?;
    if config.uses_development_secret() {
        warn!("SECRET_KEY is not set; using the development secret. Do not use this in production.");
    }

    let pool = db::open_database(&config.database_url)
        .await
        .map_err(|e| format!("Failed to open database {}: {}", config.database_url, e))?;
    db::init_database_schema(&pool)
        .await
        .map_err(|e| format!("Failed to initialize database schema: {}", e))?;

    let purged = users::purge_expired_sessions(&pool).await?;
    if purged > 0 {
        info!("Removed {} expired sessions", purged);
    }

    let port = config.port;
    let state = Arc::new(AppState::new(pool, config));
    state.uploads.ensure_dirs().await.map_err(|e| {
        format!(
            "Failed to create uploads tree at {}: {}",
            state.uploads.upload_dir().display(),
            e
        )
    })?;

    println!("Database: {}", state.config.database_url);
    println!("Uploads: {}", state.uploads.upload_dir().display());
    println!("Listening on: http://[::]:{} (IPv4 + IPv6)", port);
    println!("Endpoints:");
    println!("  GET  /                      - Dashboard");
    println!("  GET  /login, /registro      - Log in / register");
    println!("  GET  /biblioteca            - Library search");
    println!("  GET  /populares             - Most played tracks");
    println!("  POST /subir                 - Upload a track (teachers, admins)");
    println!("  GET  /reproductor/{{id}}      - Player (records a play)");
    println!("  GET  /playlists             - Playlists");
    println!("  GET  /api/cancion/{{id}}      - Track metadata (JSON)");
    println!("  GET  /stream/{{id}}           - Raw audio");
    println!("  GET  /health                - Health check");

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(format!("[::]:{}", port))
        .await
        .map_err(|e| format!("Failed to bind to port {}: {}", port, e))?;
    axum::serve(listener, app)
        .await
        .map_err(|e| format!("Server error: {}", e))?;

    Ok(())
}
