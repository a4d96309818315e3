use sea_query::{Expr, Query, SqliteQueryBuilder};

use crate::schema::Sessions;

/// INSERT INTO sessions (token, user_id, created_at, expires_at) VALUES (?, ?, ?, ?)
pub fn insert(token: &str, user_id: i64, created_at_ms: i64, expires_at_ms: i64) -> String {
    Query::insert()
        .into_table(Sessions::Table)
        .columns([
            Sessions::Token,
            Sessions::UserId,
            Sessions::CreatedAt,
            Sessions::ExpiresAt,
        ])
        .values_panic([
            token.into(),
            user_id.into(),
            created_at_ms.into(),
            expires_at_ms.into(),
        ])
        .to_string(SqliteQueryBuilder)
}

/// SELECT user_id FROM sessions WHERE token = ? AND expires_at > ?
pub fn select_live_user_id(token: &str, now_ms: i64) -> String {
    Query::select()
        .column(Sessions::UserId)
        .from(Sessions::Table)
        .and_where(Expr::col(Sessions::Token).eq(token))
        .and_where(Expr::col(Sessions::ExpiresAt).gt(now_ms))
        .to_string(SqliteQueryBuilder)
}

/// DELETE FROM sessions WHERE token = ?
pub fn delete(token: &str) -> String {
    Query::delete()
        .from_table(Sessions::Table)
        .and_where(Expr::col(Sessions::Token).eq(token))
        .to_string(SqliteQueryBuilder)
}

/// DELETE FROM sessions WHERE expires_at <= ?
pub fn delete_expired(now_ms: i64) -> String {
    Query::delete()
        .from_table(Sessions::Table)
        .and_where(Expr::col(Sessions::ExpiresAt).lte(now_ms))
        .to_string(SqliteQueryBuilder)
}
