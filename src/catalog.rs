//! Tracks, playlists and play events

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::{Executor, Row};

use crate::constants::{PLAYLISTS_PER_PAGE, TRACKS_PER_PAGE};
use crate::db::now_ms;
use crate::error::{AppError, Result};
use crate::queries::{play_events, playlists, tracks};
use crate::users::{self, Role, User};

/// Format a duration in seconds as `m:ss`, `0:00` when unknown
pub fn format_duration(secs: Option<i64>) -> String {
    match secs {
        Some(secs) if secs > 0 => format!("{}:{:02}", secs / 60, secs % 60),
        _ => "0:00".to_string(),
    }
}

fn datetime_from_ms(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
}

#[derive(Debug, Clone)]
pub struct Track {
    pub id: i64,
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub genre: Option<String>,
    pub year: Option<i32>,
    pub duration_secs: Option<i64>,
    pub audio_file: String,
    pub cover_image: Option<String>,
    pub description: Option<String>,
    pub subject: Option<String>,
    pub target_grade: Option<String>,
    pub uploaded_by: i64,
    pub uploaded_at_ms: i64,
    pub is_active: bool,
    pub play_count: i64,
}

impl Track {
    pub fn duration_label(&self) -> String {
        format_duration(self.duration_secs)
    }

    pub fn uploaded_at(&self) -> DateTime<Utc> {
        datetime_from_ms(self.uploaded_at_ms)
    }

    pub fn cover_url(&self) -> Option<String> {
        self.cover_image
            .as_ref()
            .map(|name| format!("/uploads/covers/{}", name))
    }
}

fn track_from_row(row: &SqliteRow) -> std::result::Result<Track, sqlx::Error> {
    Ok(Track {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        artist: row.try_get("artist")?,
        album: row.try_get("album")?,
        genre: row.try_get("genre")?,
        year: row.try_get("year")?,
        duration_secs: row.try_get("duration_secs")?,
        audio_file: row.try_get("audio_file")?,
        cover_image: row.try_get("cover_image")?,
        description: row.try_get("description")?,
        subject: row.try_get("subject")?,
        target_grade: row.try_get("target_grade")?,
        uploaded_by: row.try_get("uploaded_by")?,
        uploaded_at_ms: row.try_get("uploaded_at")?,
        is_active: row.try_get("is_active")?,
        play_count: row.try_get("play_count")?,
    })
}

fn tracks_from_rows(rows: &[SqliteRow]) -> std::result::Result<Vec<Track>, sqlx::Error> {
    rows.iter().map(track_from_row).collect()
}

/// A validated track ready to be inserted
#[derive(Debug, Clone, Default)]
pub struct NewTrack {
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub genre: Option<String>,
    pub year: Option<i32>,
    pub duration_secs: Option<i64>,
    pub audio_file: String,
    pub cover_image: Option<String>,
    pub description: Option<String>,
    pub subject: Option<String>,
    pub target_grade: Option<String>,
    pub uploaded_by: i64,
}

/// Catalog search criteria, each one optional
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrackFilter {
    pub text: Option<String>,
    pub genre: Option<String>,
    pub subject: Option<String>,
}

impl TrackFilter {
    /// Build a filter from raw query values, treating blank values as absent
    pub fn new(text: Option<&str>, genre: Option<&str>, subject: Option<&str>) -> Self {
        let clean = |v: Option<&str>| {
            v.map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        TrackFilter {
            text: clean(text),
            genre: clean(genre),
            subject: clean(subject),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u64,
    pub per_page: u64,
    pub total: u64,
}

impl<T> Page<T> {
    pub fn total_pages(&self) -> u64 {
        if self.total == 0 {
            1
        } else {
            self.total.div_ceil(self.per_page)
        }
    }

    pub fn has_prev(&self) -> bool {
        self.page > 1
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages()
    }
}

/// Clamp a requested page and compute its row offset
/// The offset has to fit SQLite's signed 64-bit OFFSET
fn page_offset(page: u64, per_page: u64) -> (u64, u64) {
    let last = i64::MAX as u64 / per_page.max(1);
    let page = page.clamp(1, last);
    (page, (page - 1) * per_page)
}

/// Insert a track row, returning its id
/// Takes any executor so the upload pipeline can run it inside its transaction
pub async fn insert_track<'e, E>(executor: E, track: &NewTrack) -> Result<i64>
where
    E: Executor<'e, Database = sqlx::Sqlite>,
{
    let sql = tracks::insert(track, now_ms());
    let result = sqlx::query(&sql).execute(executor).await?;
    Ok(result.last_insert_rowid())
}

pub async fn find_track(pool: &SqlitePool, id: i64) -> Result<Option<Track>> {
    let sql = tracks::select_by_id(id);
    let row = sqlx::query(&sql).fetch_optional(pool).await?;
    Ok(row.as_ref().map(track_from_row).transpose()?)
}

pub async fn find_active_track(pool: &SqlitePool, id: i64) -> Result<Option<Track>> {
    Ok(find_track(pool, id).await?.filter(|t| t.is_active))
}

pub async fn search_tracks(pool: &SqlitePool, filter: &TrackFilter, page: u64) -> Result<Page<Track>> {
    let (page, offset) = page_offset(page, TRACKS_PER_PAGE);

    let sql = tracks::search(filter, TRACKS_PER_PAGE, offset);
    let rows = sqlx::query(&sql).fetch_all(pool).await?;
    let sql = tracks::count_search(filter);
    let total: i64 = sqlx::query_scalar(&sql).fetch_one(pool).await?;

    Ok(Page {
        items: tracks_from_rows(&rows)?,
        page,
        per_page: TRACKS_PER_PAGE,
        total: total.max(0) as u64,
    })
}

pub async fn popular_tracks(pool: &SqlitePool, limit: u64) -> Result<Vec<Track>> {
    let sql = tracks::select_popular(limit);
    let rows = sqlx::query(&sql).fetch_all(pool).await?;
    Ok(tracks_from_rows(&rows)?)
}

pub async fn deactivate_track(pool: &SqlitePool, id: i64) -> Result<bool> {
    let sql = tracks::deactivate(id);
    Ok(sqlx::query(&sql).execute(pool).await?.rows_affected() > 0)
}

#[derive(Debug, Clone)]
pub struct PlayEvent {
    pub id: i64,
    pub user_id: i64,
    pub track_id: i64,
    pub played_at_ms: i64,
    pub seconds_played: i64,
    pub completed: bool,
}

fn play_event_from_row(row: &SqliteRow) -> std::result::Result<PlayEvent, sqlx::Error> {
    Ok(PlayEvent {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        track_id: row.try_get("track_id")?,
        played_at_ms: row.try_get("played_at")?,
        seconds_played: row.try_get("seconds_played")?,
        completed: row.try_get("completed")?,
    })
}

/// Append a play event and bump the track's counter in one transaction
pub async fn record_play(pool: &SqlitePool, user_id: i64, track_id: i64) -> Result<PlayEvent> {
    let now = now_ms();
    let mut tx = pool.begin().await?;

    let sql = play_events::insert(user_id, track_id, now);
    let event_id = sqlx::query(&sql).execute(&mut *tx).await?.last_insert_rowid();

    let sql = tracks::increment_play_count(track_id);
    let updated = sqlx::query(&sql).execute(&mut *tx).await?.rows_affected();
    if updated != 1 {
        return Err(AppError::NotFound);
    }

    tx.commit().await?;

    Ok(PlayEvent {
        id: event_id,
        user_id,
        track_id,
        played_at_ms: now,
        seconds_played: 0,
        completed: false,
    })
}

/// Store listening progress on the user's latest play event for the track
///
/// The play counter is left alone. Returns false when the user never
/// opened the track in the player.
pub async fn record_progress(
    pool: &SqlitePool,
    user_id: i64,
    track_id: i64,
    seconds_played: i64,
    completed: bool,
) -> Result<bool> {
    let sql = play_events::select_latest_id(user_id, track_id);
    let latest: Option<i64> = sqlx::query_scalar(&sql).fetch_optional(pool).await?;
    let Some(event_id) = latest else {
        return Ok(false);
    };

    let sql = play_events::update_progress(event_id, seconds_played.max(0), completed);
    sqlx::query(&sql).execute(pool).await?;
    Ok(true)
}

pub async fn find_play_event(pool: &SqlitePool, id: i64) -> Result<Option<PlayEvent>> {
    let sql = play_events::select_by_id(id);
    let row = sqlx::query(&sql).fetch_optional(pool).await?;
    Ok(row.as_ref().map(play_event_from_row).transpose()?)
}

pub async fn count_plays(pool: &SqlitePool, track_id: i64) -> Result<i64> {
    let sql = play_events::count_for_track(track_id);
    Ok(sqlx::query_scalar(&sql).fetch_one(pool).await?)
}

#[derive(Debug, Clone)]
pub struct Playlist {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub cover_image: Option<String>,
    pub is_public: bool,
    pub owner_id: i64,
    pub created_at_ms: i64,
    pub is_active: bool,
}

impl Playlist {
    pub fn created_at(&self) -> DateTime<Utc> {
        datetime_from_ms(self.created_at_ms)
    }

    pub fn is_owned_by(&self, user: &User) -> bool {
        self.owner_id == user.id
    }

    /// Public playlists are visible to everyone, private ones to their owner and admins
    pub fn visible_to(&self, user: &User) -> bool {
        self.is_public || self.is_owned_by(user) || user.role == Role::Admin
    }

    pub fn deletable_by(&self, user: &User) -> bool {
        self.is_owned_by(user) || user.role == Role::Admin
    }
}

fn playlist_from_row(row: &SqliteRow) -> std::result::Result<Playlist, sqlx::Error> {
    Ok(Playlist {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        cover_image: row.try_get("cover_image")?,
        is_public: row.try_get("is_public")?,
        owner_id: row.try_get("owner_id")?,
        created_at_ms: row.try_get("created_at")?,
        is_active: row.try_get("is_active")?,
    })
}

fn playlists_from_rows(rows: &[SqliteRow]) -> std::result::Result<Vec<Playlist>, sqlx::Error> {
    rows.iter().map(playlist_from_row).collect()
}

#[derive(Debug, Clone)]
pub struct NewPlaylist {
    pub name: String,
    pub description: Option<String>,
    pub is_public: bool,
    pub owner_id: i64,
}

/// Playlist form as posted by the browser
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlaylistForm {
    #[serde(default, rename = "nombre")]
    pub name: String,
    #[serde(default, rename = "descripcion")]
    pub description: String,
    /// Checkbox: present when ticked
    #[serde(default, rename = "publica")]
    pub is_public: Option<String>,
}

impl PlaylistForm {
    pub fn into_new_playlist(self, owner_id: i64) -> Result<NewPlaylist> {
        let name = self.name.trim().to_string();
        if name.is_empty() || name.chars().count() > 200 {
            return Err(AppError::Validation(
                "Playlist name must be between 1 and 200 characters.".into(),
            ));
        }
        let description = self.description.trim().to_string();
        if description.chars().count() > 500 {
            return Err(AppError::Validation(
                "Description must be at most 500 characters.".into(),
            ));
        }
        Ok(NewPlaylist {
            name,
            description: (!description.is_empty()).then_some(description),
            is_public: self.is_public.is_some(),
            owner_id,
        })
    }
}

/// A track as it appears inside a playlist
#[derive(Debug, Clone)]
pub struct PlaylistEntry {
    pub position: i64,
    pub track: Track,
}

pub async fn create_playlist(pool: &SqlitePool, playlist: &NewPlaylist) -> Result<Playlist> {
    let sql = playlists::insert(playlist, now_ms());
    let id = sqlx::query(&sql).execute(pool).await?.last_insert_rowid();
    find_playlist(pool, id)
        .await?
        .ok_or_else(|| AppError::Internal("playlist vanished after insert".into()))
}

pub async fn find_playlist(pool: &SqlitePool, id: i64) -> Result<Option<Playlist>> {
    let sql = playlists::select_active_by_id(id);
    let row = sqlx::query(&sql).fetch_optional(pool).await?;
    Ok(row.as_ref().map(playlist_from_row).transpose()?)
}

/// Append a track at the end of a playlist, returning its position
pub async fn add_to_playlist(pool: &SqlitePool, playlist_id: i64, track_id: i64) -> Result<i64> {
    if find_active_track(pool, track_id).await?.is_none() {
        return Err(AppError::NotFound);
    }

    let sql = playlists::append_entry(playlist_id, track_id, now_ms())
        .map_err(|e| AppError::Internal(format!("Failed to build playlist append: {}", e)))?;
    let position: i64 = sqlx::query_scalar(&sql).fetch_one(pool).await?;

    Ok(position)
}

pub async fn playlist_tracks(pool: &SqlitePool, playlist_id: i64) -> Result<Vec<PlaylistEntry>> {
    let sql = playlists::select_entries_with_tracks(playlist_id);
    let rows = sqlx::query(&sql).fetch_all(pool).await?;
    let entries = rows
        .iter()
        .map(|row| {
            Ok(PlaylistEntry {
                position: row.try_get("position")?,
                track: track_from_row(row)?,
            })
        })
        .collect::<std::result::Result<Vec<_>, sqlx::Error>>()?;
    Ok(entries)
}

pub async fn count_playlist_entries(pool: &SqlitePool, playlist_id: i64) -> Result<i64> {
    let sql = playlists::count_entries(playlist_id);
    Ok(sqlx::query_scalar(&sql).fetch_one(pool).await?)
}

/// Total length of the tracks in a playlist, as `m:ss`
pub fn total_duration(entries: &[PlaylistEntry]) -> String {
    let total: i64 = entries
        .iter()
        .filter_map(|entry| entry.track.duration_secs)
        .sum();
    format_duration(Some(total))
}

pub async fn user_playlists(pool: &SqlitePool, owner_id: i64) -> Result<Vec<Playlist>> {
    let sql = playlists::select_by_owner(owner_id);
    let rows = sqlx::query(&sql).fetch_all(pool).await?;
    Ok(playlists_from_rows(&rows)?)
}

pub async fn public_playlists(
    pool: &SqlitePool,
    excluding_owner: Option<i64>,
    page: u64,
) -> Result<Page<Playlist>> {
    let (page, offset) = page_offset(page, PLAYLISTS_PER_PAGE);

    let sql = playlists::select_public(excluding_owner, PLAYLISTS_PER_PAGE, offset);
    let rows = sqlx::query(&sql).fetch_all(pool).await?;
    let sql = playlists::count_public(excluding_owner);
    let total: i64 = sqlx::query_scalar(&sql).fetch_one(pool).await?;

    Ok(Page {
        items: playlists_from_rows(&rows)?,
        page,
        per_page: PLAYLISTS_PER_PAGE,
        total: total.max(0) as u64,
    })
}

pub async fn recent_public_playlists(pool: &SqlitePool, limit: u64) -> Result<Vec<Playlist>> {
    let sql = playlists::select_public(None, limit, 0);
    let rows = sqlx::query(&sql).fetch_all(pool).await?;
    Ok(playlists_from_rows(&rows)?)
}

/// Delete a playlist and, through the foreign key cascade, its entries
/// Tracks are never touched
pub async fn delete_playlist(pool: &SqlitePool, playlist_id: i64) -> Result<bool> {
    let sql = playlists::delete(playlist_id);
    Ok(sqlx::query(&sql).execute(pool).await?.rows_affected() > 0)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DashboardStats {
    pub tracks: i64,
    pub teachers: i64,
    pub students: i64,
}

pub async fn dashboard_stats(pool: &SqlitePool) -> Result<DashboardStats> {
    let sql = tracks::count_active();
    let tracks: i64 = sqlx::query_scalar(&sql).fetch_one(pool).await?;
    Ok(DashboardStats {
        tracks,
        teachers: users::count_active_by_role(pool, Role::Teacher).await?,
        students: users::count_active_by_role(pool, Role::Student).await?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::users::{insert_user, NewUser};

    async fn setup() -> (SqlitePool, tempfile::TempDir, User) {
        let (pool, guard) = db::create_test_connection_in_temporary_file().await.unwrap();
        db::init_database_schema(&pool).await.unwrap();
        let user = insert_teacher(&pool).await;
        (pool, guard, user)
    }

    async fn insert_teacher(pool: &SqlitePool) -> User {
        insert_user(
            pool,
            &NewUser {
                email: "docente@school.test".to_string(),
                first_name: "Ana".to_string(),
                last_name: "Rojas".to_string(),
                password_hash: "unused".to_string(),
                role: Role::Teacher,
                grade: None,
                section: None,
                specialty: None,
            },
        )
        .await
        .unwrap()
    }

    fn track(title: &str, artist: &str, genre: &str, owner: i64) -> NewTrack {
        NewTrack {
            title: title.to_string(),
            artist: artist.to_string(),
            genre: Some(genre.to_string()),
            duration_secs: Some(125),
            audio_file: format!("{}.mp3", title),
            uploaded_by: owner,
            ..Default::default()
        }
    }

    #[test]
    fn durations_format_as_minutes_and_seconds() {
        assert_eq!(format_duration(Some(125)), "2:05");
        assert_eq!(format_duration(Some(59)), "0:59");
        assert_eq!(format_duration(None), "0:00");
        assert_eq!(format_duration(Some(0)), "0:00");
    }

    #[test]
    fn page_arithmetic() {
        let page: Page<()> = Page {
            items: vec![],
            page: 2,
            per_page: 20,
            total: 41,
        };
        assert_eq!(page.total_pages(), 3);
        assert!(page.has_prev());
        assert!(page.has_next());
        assert_eq!(page_offset(0, 20), (1, 0));
        assert_eq!(page_offset(3, 12), (3, 24));

        let (page, offset) = page_offset(u64::MAX, 20);
        assert_eq!(page, i64::MAX as u64 / 20);
        assert!(offset <= i64::MAX as u64);
    }

    #[tokio::test]
    async fn search_filters_and_orders_newest_first() {
        let (pool, _guard, user) = setup().await;
        let first = insert_track(&pool, &track("Tablas", "Coro", "educativo", user.id))
            .await
            .unwrap();
        let second = insert_track(&pool, &track("Himno", "Banda", "clasico", user.id))
            .await
            .unwrap();
        let hidden = insert_track(&pool, &track("Tablas Viejas", "Coro", "educativo", user.id))
            .await
            .unwrap();
        deactivate_track(&pool, hidden).await.unwrap();

        let all = search_tracks(&pool, &TrackFilter::default(), 0).await.unwrap();
        assert_eq!(all.page, 1);
        assert_eq!(all.total, 2);
        assert_eq!(
            all.items.iter().map(|t| t.id).collect::<Vec<_>>(),
            vec![second, first]
        );

        let by_text = search_tracks(&pool, &TrackFilter::new(Some("coro"), None, None), 1)
            .await
            .unwrap();
        assert_eq!(by_text.items.len(), 1);
        assert_eq!(by_text.items[0].id, first);

        let by_genre = search_tracks(&pool, &TrackFilter::new(None, Some("clasico"), Some("")), 1)
            .await
            .unwrap();
        assert_eq!(by_genre.items.len(), 1);
        assert_eq!(by_genre.items[0].id, second);
    }

    #[tokio::test]
    async fn record_play_keeps_counter_in_step_with_events() {
        let (pool, _guard, user) = setup().await;
        let id = insert_track(&pool, &track("Tablas", "Coro", "educativo", user.id))
            .await
            .unwrap();

        record_play(&pool, user.id, id).await.unwrap();
        let event = record_play(&pool, user.id, id).await.unwrap();

        let stored = find_track(&pool, id).await.unwrap().unwrap();
        assert_eq!(stored.play_count, 2);
        assert_eq!(count_plays(&pool, id).await.unwrap(), 2);

        assert!(record_progress(&pool, user.id, id, 90, true).await.unwrap());
        let updated = find_play_event(&pool, event.id).await.unwrap().unwrap();
        assert_eq!(updated.seconds_played, 90);
        assert!(updated.completed);
        assert_eq!(find_track(&pool, id).await.unwrap().unwrap().play_count, 2);

        assert!(!record_progress(&pool, user.id + 1, id, 10, false).await.unwrap());
        assert!(matches!(
            record_play(&pool, user.id, 9999).await,
            Err(AppError::NotFound) | Err(AppError::Database(_))
        ));
    }

    #[tokio::test]
    async fn playlist_positions_and_cascade() {
        let (pool, _guard, user) = setup().await;
        let a = insert_track(&pool, &track("A", "X", "pop", user.id)).await.unwrap();
        let b = insert_track(&pool, &track("B", "Y", "pop", user.id)).await.unwrap();

        let playlist = create_playlist(
            &pool,
            &NewPlaylist {
                name: "Repaso".to_string(),
                description: None,
                is_public: true,
                owner_id: user.id,
            },
        )
        .await
        .unwrap();

        assert_eq!(add_to_playlist(&pool, playlist.id, b).await.unwrap(), 1);
        assert_eq!(add_to_playlist(&pool, playlist.id, a).await.unwrap(), 2);
        let entries = playlist_tracks(&pool, playlist.id).await.unwrap();
        assert_eq!(entries.iter().map(|e| e.track.id).collect::<Vec<_>>(), vec![b, a]);
        assert_eq!(total_duration(&entries), "4:10");

        assert_eq!(public_playlists(&pool, None, 1).await.unwrap().total, 1);
        assert_eq!(public_playlists(&pool, Some(user.id), 1).await.unwrap().total, 0);

        assert!(delete_playlist(&pool, playlist.id).await.unwrap());
        assert_eq!(count_playlist_entries(&pool, playlist.id).await.unwrap(), 0);
        assert!(find_playlist(&pool, playlist.id).await.unwrap().is_none());
        assert!(find_track(&pool, a).await.unwrap().is_some());
        assert!(find_track(&pool, b).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn dashboard_counts_active_rows() {
        let (pool, _guard, user) = setup().await;
        insert_track(&pool, &track("A", "X", "pop", user.id)).await.unwrap();
        let stats = dashboard_stats(&pool).await.unwrap();
        assert_eq!(
            stats,
            DashboardStats {
                tracks: 1,
                teachers: 1,
                students: 0
            }
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_appends_get_consecutive_positions() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("wal.sqlite").display());
        let pool = db::open_database(&url).await.unwrap();
        db::init_database_schema(&pool).await.unwrap();
        let user = insert_teacher(&pool).await;
        let id = insert_track(&pool, &track("Ronda", "Coro", "pop", user.id))
            .await
            .unwrap();
        let playlist = create_playlist(
            &pool,
            &NewPlaylist {
                name: "Concurrida".to_string(),
                description: None,
                is_public: false,
                owner_id: user.id,
            },
        )
        .await
        .unwrap();

        let playlist_id = playlist.id;
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pool = pool.clone();
                tokio::spawn(async move { add_to_playlist(&pool, playlist_id, id).await })
            })
            .collect();
        let mut positions = Vec::new();
        for handle in handles {
            positions.push(handle.await.unwrap().unwrap());
        }
        positions.sort_unstable();
        assert_eq!(positions, (1..=8).collect::<Vec<i64>>());
        assert_eq!(count_playlist_entries(&pool, playlist_id).await.unwrap(), 8);
    }
}
