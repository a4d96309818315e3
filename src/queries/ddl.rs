use sea_query::{ColumnDef, ForeignKey, ForeignKeyAction, Index, SqliteQueryBuilder, Table};

use crate::schema::{Metadata, PlayEvents, PlaylistEntries, Playlists, Sessions, Tracks, Users};

/// CREATE TABLE IF NOT EXISTS metadata (key TEXT PRIMARY KEY, value TEXT NOT NULL)
pub fn create_metadata_table() -> String {
    Table::create()
        .table(Metadata::Table)
        .if_not_exists()
        .col(ColumnDef::new(Metadata::Key).string().primary_key())
        .col(ColumnDef::new(Metadata::Value).string().not_null())
        .to_string(SqliteQueryBuilder)
}

/// CREATE TABLE IF NOT EXISTS users (
///     id INTEGER PRIMARY KEY AUTOINCREMENT,
///     email TEXT NOT NULL UNIQUE,
///     ...,
///     role TEXT NOT NULL DEFAULT 'student',
///     registered_at INTEGER NOT NULL,   -- unix ms
///     last_access_at INTEGER NOT NULL   -- unix ms
/// )
pub fn create_users_table() -> String {
    Table::create()
        .table(Users::Table)
        .if_not_exists()
        .col(
            ColumnDef::new(Users::Id)
                .integer()
                .primary_key()
                .auto_increment(),
        )
        .col(ColumnDef::new(Users::Email).string().not_null().unique_key())
        .col(ColumnDef::new(Users::FirstName).string().not_null())
        .col(ColumnDef::new(Users::LastName).string().not_null())
        .col(ColumnDef::new(Users::PasswordHash).string().not_null())
        .col(
            ColumnDef::new(Users::Role)
                .string()
                .not_null()
                .default("student"),
        )
        .col(ColumnDef::new(Users::Grade).string())
        .col(ColumnDef::new(Users::Section).string())
        .col(ColumnDef::new(Users::Specialty).string())
        .col(ColumnDef::new(Users::Avatar).string())
        .col(
            ColumnDef::new(Users::IsActive)
                .integer()
                .not_null()
                .default(1),
        )
        .col(ColumnDef::new(Users::RegisteredAt).big_integer().not_null())
        .col(ColumnDef::new(Users::LastAccessAt).big_integer().not_null())
        .to_string(SqliteQueryBuilder)
}

/// CREATE TABLE IF NOT EXISTS sessions (
///     token TEXT PRIMARY KEY,
///     user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     created_at INTEGER NOT NULL,
///     expires_at INTEGER NOT NULL
/// )
pub fn create_sessions_table() -> String {
    Table::create()
        .table(Sessions::Table)
        .if_not_exists()
        .col(ColumnDef::new(Sessions::Token).string().primary_key())
        .col(ColumnDef::new(Sessions::UserId).integer().not_null())
        .col(ColumnDef::new(Sessions::CreatedAt).big_integer().not_null())
        .col(ColumnDef::new(Sessions::ExpiresAt).big_integer().not_null())
        .foreign_key(
            ForeignKey::create()
                .from(Sessions::Table, Sessions::UserId)
                .to(Users::Table, Users::Id)
                .on_delete(ForeignKeyAction::Cascade),
        )
        .to_string(SqliteQueryBuilder)
}

/// CREATE TABLE IF NOT EXISTS tracks (
///     id INTEGER PRIMARY KEY AUTOINCREMENT,
///     title TEXT NOT NULL,
///     artist TEXT NOT NULL,
///     ...,
///     audio_file TEXT NOT NULL,
///     uploaded_by INTEGER NOT NULL REFERENCES users(id),
///     uploaded_at INTEGER NOT NULL,
///     is_active INTEGER NOT NULL DEFAULT 1,
///     play_count INTEGER NOT NULL DEFAULT 0
/// )
pub fn create_tracks_table() -> String {
    Table::create()
        .table(Tracks::Table)
        .if_not_exists()
        .col(
            ColumnDef::new(Tracks::Id)
                .integer()
                .primary_key()
                .auto_increment(),
        )
        .col(ColumnDef::new(Tracks::Title).string().not_null())
        .col(ColumnDef::new(Tracks::Artist).string().not_null())
        .col(ColumnDef::new(Tracks::Album).string())
        .col(ColumnDef::new(Tracks::Genre).string())
        .col(ColumnDef::new(Tracks::Year).integer())
        .col(ColumnDef::new(Tracks::DurationSecs).integer())
        .col(ColumnDef::new(Tracks::AudioFile).string().not_null())
        .col(ColumnDef::new(Tracks::CoverImage).string())
        .col(ColumnDef::new(Tracks::Description).text())
        .col(ColumnDef::new(Tracks::Subject).string())
        .col(ColumnDef::new(Tracks::TargetGrade).string())
        .col(ColumnDef::new(Tracks::UploadedBy).integer().not_null())
        .col(ColumnDef::new(Tracks::UploadedAt).big_integer().not_null())
        .col(
            ColumnDef::new(Tracks::IsActive)
                .integer()
                .not_null()
                .default(1),
        )
        .col(
            ColumnDef::new(Tracks::PlayCount)
                .big_integer()
                .not_null()
                .default(0),
        )
        .foreign_key(
            ForeignKey::create()
                .from(Tracks::Table, Tracks::UploadedBy)
                .to(Users::Table, Users::Id),
        )
        .to_string(SqliteQueryBuilder)
}

/// CREATE TABLE IF NOT EXISTS playlists (
///     id INTEGER PRIMARY KEY AUTOINCREMENT,
///     name TEXT NOT NULL,
///     description TEXT,
///     cover_image TEXT,
///     is_public INTEGER NOT NULL DEFAULT 0,
///     owner_id INTEGER NOT NULL REFERENCES users(id),
///     created_at INTEGER NOT NULL,
///     is_active INTEGER NOT NULL DEFAULT 1
/// )
pub fn create_playlists_table() -> String {
    Table::create()
        .table(Playlists::Table)
        .if_not_exists()
        .col(
            ColumnDef::new(Playlists::Id)
                .integer()
                .primary_key()
                .auto_increment(),
        )
        .col(ColumnDef::new(Playlists::Name).string().not_null())
        .col(ColumnDef::new(Playlists::Description).text())
        .col(ColumnDef::new(Playlists::CoverImage).string())
        .col(
            ColumnDef::new(Playlists::IsPublic)
                .integer()
                .not_null()
                .default(0),
        )
        .col(ColumnDef::new(Playlists::OwnerId).integer().not_null())
        .col(ColumnDef::new(Playlists::CreatedAt).big_integer().not_null())
        .col(
            ColumnDef::new(Playlists::IsActive)
                .integer()
                .not_null()
                .default(1),
        )
        .foreign_key(
            ForeignKey::create()
                .from(Playlists::Table, Playlists::OwnerId)
                .to(Users::Table, Users::Id),
        )
        .to_string(SqliteQueryBuilder)
}

/// CREATE TABLE IF NOT EXISTS playlist_entries (
///     id INTEGER PRIMARY KEY AUTOINCREMENT,
///     playlist_id INTEGER NOT NULL REFERENCES playlists(id) ON DELETE CASCADE,
///     track_id INTEGER NOT NULL REFERENCES tracks(id),
///     position INTEGER NOT NULL,
///     added_at INTEGER NOT NULL
/// )
pub fn create_playlist_entries_table() -> String {
    Table::create()
        .table(PlaylistEntries::Table)
        .if_not_exists()
        .col(
            ColumnDef::new(PlaylistEntries::Id)
                .integer()
                .primary_key()
                .auto_increment(),
        )
        .col(ColumnDef::new(PlaylistEntries::PlaylistId).integer().not_null())
        .col(ColumnDef::new(PlaylistEntries::TrackId).integer().not_null())
        .col(ColumnDef::new(PlaylistEntries::Position).integer().not_null())
        .col(ColumnDef::new(PlaylistEntries::AddedAt).big_integer().not_null())
        .foreign_key(
            ForeignKey::create()
                .from(PlaylistEntries::Table, PlaylistEntries::PlaylistId)
                .to(Playlists::Table, Playlists::Id)
                .on_delete(ForeignKeyAction::Cascade),
        )
        .foreign_key(
            ForeignKey::create()
                .from(PlaylistEntries::Table, PlaylistEntries::TrackId)
                .to(Tracks::Table, Tracks::Id),
        )
        .to_string(SqliteQueryBuilder)
}

/// CREATE TABLE IF NOT EXISTS play_events (
///     id INTEGER PRIMARY KEY AUTOINCREMENT,
///     user_id INTEGER NOT NULL REFERENCES users(id),
///     track_id INTEGER NOT NULL REFERENCES tracks(id),
///     played_at INTEGER NOT NULL,
///     seconds_played INTEGER NOT NULL DEFAULT 0,
///     completed INTEGER NOT NULL DEFAULT 0
/// )
pub fn create_play_events_table() -> String {
    Table::create()
        .table(PlayEvents::Table)
        .if_not_exists()
        .col(
            ColumnDef::new(PlayEvents::Id)
                .integer()
                .primary_key()
                .auto_increment(),
        )
        .col(ColumnDef::new(PlayEvents::UserId).integer().not_null())
        .col(ColumnDef::new(PlayEvents::TrackId).integer().not_null())
        .col(ColumnDef::new(PlayEvents::PlayedAt).big_integer().not_null())
        .col(
            ColumnDef::new(PlayEvents::SecondsPlayed)
                .integer()
                .not_null()
                .default(0),
        )
        .col(
            ColumnDef::new(PlayEvents::Completed)
                .integer()
                .not_null()
                .default(0),
        )
        .foreign_key(
            ForeignKey::create()
                .from(PlayEvents::Table, PlayEvents::UserId)
                .to(Users::Table, Users::Id),
        )
        .foreign_key(
            ForeignKey::create()
                .from(PlayEvents::Table, PlayEvents::TrackId)
                .to(Tracks::Table, Tracks::Id),
        )
        .to_string(SqliteQueryBuilder)
}

/// CREATE UNIQUE INDEX IF NOT EXISTS idx_playlist_entries_position ON playlist_entries(playlist_id, position)
pub fn create_playlist_entries_position_index() -> String {
    Index::create()
        .if_not_exists()
        .unique()
        .name("idx_playlist_entries_position")
        .table(PlaylistEntries::Table)
        .col(PlaylistEntries::PlaylistId)
        .col(PlaylistEntries::Position)
        .to_string(SqliteQueryBuilder)
}

/// CREATE INDEX IF NOT EXISTS idx_tracks_uploaded_at ON tracks(uploaded_at)
pub fn create_tracks_uploaded_at_index() -> String {
    Index::create()
        .if_not_exists()
        .name("idx_tracks_uploaded_at")
        .table(Tracks::Table)
        .col(Tracks::UploadedAt)
        .to_string(SqliteQueryBuilder)
}

/// CREATE INDEX IF NOT EXISTS idx_tracks_play_count ON tracks(play_count)
pub fn create_tracks_play_count_index() -> String {
    Index::create()
        .if_not_exists()
        .name("idx_tracks_play_count")
        .table(Tracks::Table)
        .col(Tracks::PlayCount)
        .to_string(SqliteQueryBuilder)
}

/// CREATE INDEX IF NOT EXISTS idx_play_events_user_track ON play_events(user_id, track_id)
pub fn create_play_events_user_track_index() -> String {
    Index::create()
        .if_not_exists()
        .name("idx_play_events_user_track")
        .table(PlayEvents::Table)
        .col(PlayEvents::UserId)
        .col(PlayEvents::TrackId)
        .to_string(SqliteQueryBuilder)
}

/// CREATE INDEX IF NOT EXISTS idx_sessions_expires_at ON sessions(expires_at)
pub fn create_sessions_expires_at_index() -> String {
    Index::create()
        .if_not_exists()
        .name("idx_sessions_expires_at")
        .table(Sessions::Table)
        .col(Sessions::ExpiresAt)
        .to_string(SqliteQueryBuilder)
}
