use sea_query::{Expr, Func, Order, Query, SqliteQueryBuilder};

use crate::schema::PlayEvents;

/// INSERT INTO play_events (user_id, track_id, played_at, seconds_played, completed)
/// VALUES (?, ?, ?, 0, 0)
pub fn insert(user_id: i64, track_id: i64, now_ms: i64) -> String {
    Query::insert()
        .into_table(PlayEvents::Table)
        .columns([
            PlayEvents::UserId,
            PlayEvents::TrackId,
            PlayEvents::PlayedAt,
            PlayEvents::SecondsPlayed,
            PlayEvents::Completed,
        ])
        .values_panic([
            user_id.into(),
            track_id.into(),
            now_ms.into(),
            0i32.into(),
            0i32.into(),
        ])
        .to_string(SqliteQueryBuilder)
}

/// SELECT id FROM play_events WHERE user_id = ? AND track_id = ? ORDER BY id DESC LIMIT 1
pub fn select_latest_id(user_id: i64, track_id: i64) -> String {
    Query::select()
        .column(PlayEvents::Id)
        .from(PlayEvents::Table)
        .and_where(Expr::col(PlayEvents::UserId).eq(user_id))
        .and_where(Expr::col(PlayEvents::TrackId).eq(track_id))
        .order_by(PlayEvents::Id, Order::Desc)
        .limit(1)
        .to_string(SqliteQueryBuilder)
}

/// UPDATE play_events SET seconds_played = ?, completed = ? WHERE id = ?
pub fn update_progress(id: i64, seconds_played: i64, completed: bool) -> String {
    Query::update()
        .table(PlayEvents::Table)
        .value(PlayEvents::SecondsPlayed, seconds_played)
        .value(PlayEvents::Completed, completed as i32)
        .and_where(Expr::col(PlayEvents::Id).eq(id))
        .to_string(SqliteQueryBuilder)
}

/// SELECT COUNT(id) FROM play_events WHERE track_id = ?
pub fn count_for_track(track_id: i64) -> String {
    Query::select()
        .expr(Func::count(Expr::col(PlayEvents::Id)))
        .from(PlayEvents::Table)
        .and_where(Expr::col(PlayEvents::TrackId).eq(track_id))
        .to_string(SqliteQueryBuilder)
}

/// SELECT id, user_id, track_id, played_at, seconds_played, completed FROM play_events WHERE id = ?
pub fn select_by_id(id: i64) -> String {
    Query::select()
        .columns([
            PlayEvents::Id,
            PlayEvents::UserId,
            PlayEvents::TrackId,
            PlayEvents::PlayedAt,
            PlayEvents::SecondsPlayed,
            PlayEvents::Completed,
        ])
        .from(PlayEvents::Table)
        .and_where(Expr::col(PlayEvents::Id).eq(id))
        .to_string(SqliteQueryBuilder)
}
