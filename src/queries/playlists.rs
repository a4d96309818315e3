use sea_query::{Expr, Func, Order, Query, SqliteQueryBuilder};

use crate::catalog::NewPlaylist;
use crate::queries::tracks::TRACK_COLUMNS;
use crate::schema::{PlaylistEntries, Playlists, Tracks};

const PLAYLIST_COLUMNS: [Playlists; 8] = [
    Playlists::Id,
    Playlists::Name,
    Playlists::Description,
    Playlists::CoverImage,
    Playlists::IsPublic,
    Playlists::OwnerId,
    Playlists::CreatedAt,
    Playlists::IsActive,
];

/// INSERT INTO playlists (name, description, is_public, owner_id, created_at, is_active) VALUES (...)
pub fn insert(playlist: &NewPlaylist, now_ms: i64) -> String {
    Query::insert()
        .into_table(Playlists::Table)
        .columns([
            Playlists::Name,
            Playlists::Description,
            Playlists::IsPublic,
            Playlists::OwnerId,
            Playlists::CreatedAt,
            Playlists::IsActive,
        ])
        .values_panic([
            playlist.name.clone().into(),
            playlist.description.clone().into(),
            (playlist.is_public as i32).into(),
            playlist.owner_id.into(),
            now_ms.into(),
            1i32.into(),
        ])
        .to_string(SqliteQueryBuilder)
}

/// SELECT <playlist columns> FROM playlists WHERE id = ? AND is_active = 1
pub fn select_active_by_id(id: i64) -> String {
    Query::select()
        .columns(PLAYLIST_COLUMNS)
        .from(Playlists::Table)
        .and_where(Expr::col(Playlists::Id).eq(id))
        .and_where(Expr::col(Playlists::IsActive).eq(1))
        .to_string(SqliteQueryBuilder)
}

/// SELECT <playlist columns> FROM playlists WHERE owner_id = ? AND is_active = 1
/// ORDER BY created_at DESC, id DESC
pub fn select_by_owner(owner_id: i64) -> String {
    Query::select()
        .columns(PLAYLIST_COLUMNS)
        .from(Playlists::Table)
        .and_where(Expr::col(Playlists::OwnerId).eq(owner_id))
        .and_where(Expr::col(Playlists::IsActive).eq(1))
        .order_by(Playlists::CreatedAt, Order::Desc)
        .order_by(Playlists::Id, Order::Desc)
        .to_string(SqliteQueryBuilder)
}

/// SELECT <playlist columns> FROM playlists
/// WHERE is_public = 1 AND is_active = 1 [AND owner_id != ?]
/// ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?
pub fn select_public(excluding_owner: Option<i64>, limit: u64, offset: u64) -> String {
    let mut query = Query::select();
    query
        .columns(PLAYLIST_COLUMNS)
        .from(Playlists::Table)
        .and_where(Expr::col(Playlists::IsPublic).eq(1))
        .and_where(Expr::col(Playlists::IsActive).eq(1));
    if let Some(owner_id) = excluding_owner {
        query.and_where(Expr::col(Playlists::OwnerId).ne(owner_id));
    }
    query
        .order_by(Playlists::CreatedAt, Order::Desc)
        .order_by(Playlists::Id, Order::Desc)
        .limit(limit)
        .offset(offset)
        .to_string(SqliteQueryBuilder)
}

/// SELECT COUNT(id) FROM playlists WHERE is_public = 1 AND is_active = 1 [AND owner_id != ?]
pub fn count_public(excluding_owner: Option<i64>) -> String {
    let mut query = Query::select();
    query
        .expr(Func::count(Expr::col(Playlists::Id)))
        .from(Playlists::Table)
        .and_where(Expr::col(Playlists::IsPublic).eq(1))
        .and_where(Expr::col(Playlists::IsActive).eq(1));
    if let Some(owner_id) = excluding_owner {
        query.and_where(Expr::col(Playlists::OwnerId).ne(owner_id));
    }
    query.to_string(SqliteQueryBuilder)
}

/// DELETE FROM playlists WHERE id = ?
/// playlist_entries rows go with it through ON DELETE CASCADE
pub fn delete(id: i64) -> String {
    Query::delete()
        .from_table(Playlists::Table)
        .and_where(Expr::col(Playlists::Id).eq(id))
        .to_string(SqliteQueryBuilder)
}

/// INSERT INTO playlist_entries (playlist_id, track_id, position, added_at)
/// SELECT ?, ?, COALESCE(MAX(position), 0) + 1, ? FROM playlist_entries WHERE playlist_id = ?
/// RETURNING position
///
/// One statement, so SQLite takes the write lock before reading the current maximum.
pub fn append_entry(
    playlist_id: i64,
    track_id: i64,
    now_ms: i64,
) -> Result<String, sea_query::error::Error> {
    let next_position = Query::select()
        .expr(Expr::val(playlist_id))
        .expr(Expr::val(track_id))
        .expr(
            Expr::expr(Func::coalesce([
                Func::max(Expr::col(PlaylistEntries::Position)).into(),
                Expr::val(0).into(),
            ]))
            .add(1),
        )
        .expr(Expr::val(now_ms))
        .from(PlaylistEntries::Table)
        .and_where(Expr::col(PlaylistEntries::PlaylistId).eq(playlist_id))
        .to_owned();

    Ok(Query::insert()
        .into_table(PlaylistEntries::Table)
        .columns([
            PlaylistEntries::PlaylistId,
            PlaylistEntries::TrackId,
            PlaylistEntries::Position,
            PlaylistEntries::AddedAt,
        ])
        .select_from(next_position)?
        .returning_col(PlaylistEntries::Position)
        .to_string(SqliteQueryBuilder))
}

/// SELECT tracks.<track columns>, playlist_entries.position
/// FROM playlist_entries INNER JOIN tracks ON tracks.id = playlist_entries.track_id
/// WHERE playlist_entries.playlist_id = ? ORDER BY playlist_entries.position
pub fn select_entries_with_tracks(playlist_id: i64) -> String {
    Query::select()
        .columns(TRACK_COLUMNS.map(|column| (Tracks::Table, column)))
        .column((PlaylistEntries::Table, PlaylistEntries::Position))
        .from(PlaylistEntries::Table)
        .inner_join(
            Tracks::Table,
            Expr::col((Tracks::Table, Tracks::Id))
                .equals((PlaylistEntries::Table, PlaylistEntries::TrackId)),
        )
        .and_where(Expr::col((PlaylistEntries::Table, PlaylistEntries::PlaylistId)).eq(playlist_id))
        .order_by((PlaylistEntries::Table, PlaylistEntries::Position), Order::Asc)
        .to_string(SqliteQueryBuilder)
}

/// SELECT COUNT(id) FROM playlist_entries WHERE playlist_id = ?
pub fn count_entries(playlist_id: i64) -> String {
    Query::select()
        .expr(Func::count(Expr::col(PlaylistEntries::Id)))
        .from(PlaylistEntries::Table)
        .and_where(Expr::col(PlaylistEntries::PlaylistId).eq(playlist_id))
        .to_string(SqliteQueryBuilder)
}
