use sea_query::{Cond, Expr, Func, Order, Query, SelectStatement, SqliteQueryBuilder};

use crate::catalog::{NewTrack, TrackFilter};
use crate::schema::Tracks;

pub(crate) const TRACK_COLUMNS: [Tracks; 16] = [
    Tracks::Id,
    Tracks::Title,
    Tracks::Artist,
    Tracks::Album,
    Tracks::Genre,
    Tracks::Year,
    Tracks::DurationSecs,
    Tracks::AudioFile,
    Tracks::CoverImage,
    Tracks::Description,
    Tracks::Subject,
    Tracks::TargetGrade,
    Tracks::UploadedBy,
    Tracks::UploadedAt,
    Tracks::IsActive,
    Tracks::PlayCount,
];

fn apply_filter(query: &mut SelectStatement, filter: &TrackFilter) {
    query.and_where(Expr::col(Tracks::IsActive).eq(1));

    if let Some(text) = filter.text.as_deref() {
        let pattern = format!("%{}%", text);
        query.cond_where(
            Cond::any()
                .add(Expr::col(Tracks::Title).like(pattern.as_str()))
                .add(Expr::col(Tracks::Artist).like(pattern.as_str()))
                .add(Expr::col(Tracks::Album).like(pattern.as_str())),
        );
    }
    if let Some(genre) = filter.genre.as_deref() {
        query.and_where(Expr::col(Tracks::Genre).eq(genre));
    }
    if let Some(subject) = filter.subject.as_deref() {
        query.and_where(Expr::col(Tracks::Subject).eq(subject));
    }
}

/// INSERT INTO tracks (title, artist, ..., uploaded_by, uploaded_at) VALUES (...)
/// New tracks start active with a zero play count
pub fn insert(track: &NewTrack, now_ms: i64) -> String {
    Query::insert()
        .into_table(Tracks::Table)
        .columns([
            Tracks::Title,
            Tracks::Artist,
            Tracks::Album,
            Tracks::Genre,
            Tracks::Year,
            Tracks::DurationSecs,
            Tracks::AudioFile,
            Tracks::CoverImage,
            Tracks::Description,
            Tracks::Subject,
            Tracks::TargetGrade,
            Tracks::UploadedBy,
            Tracks::UploadedAt,
            Tracks::IsActive,
            Tracks::PlayCount,
        ])
        .values_panic([
            track.title.clone().into(),
            track.artist.clone().into(),
            track.album.clone().into(),
            track.genre.clone().into(),
            track.year.into(),
            track.duration_secs.into(),
            track.audio_file.clone().into(),
            track.cover_image.clone().into(),
            track.description.clone().into(),
            track.subject.clone().into(),
            track.target_grade.clone().into(),
            track.uploaded_by.into(),
            now_ms.into(),
            1i32.into(),
            0i64.into(),
        ])
        .to_string(SqliteQueryBuilder)
}

/// SELECT <track columns> FROM tracks WHERE id = ?
pub fn select_by_id(id: i64) -> String {
    Query::select()
        .columns(TRACK_COLUMNS)
        .from(Tracks::Table)
        .and_where(Expr::col(Tracks::Id).eq(id))
        .to_string(SqliteQueryBuilder)
}

/// SELECT <track columns> FROM tracks WHERE is_active = 1 [AND filters]
/// ORDER BY uploaded_at DESC, id DESC LIMIT ? OFFSET ?
pub fn search(filter: &TrackFilter, limit: u64, offset: u64) -> String {
    let mut query = Query::select();
    query.columns(TRACK_COLUMNS).from(Tracks::Table);
    apply_filter(&mut query, filter);
    query
        .order_by(Tracks::UploadedAt, Order::Desc)
        .order_by(Tracks::Id, Order::Desc)
        .limit(limit)
        .offset(offset)
        .to_string(SqliteQueryBuilder)
}

/// SELECT COUNT(id) FROM tracks WHERE is_active = 1 [AND filters]
pub fn count_search(filter: &TrackFilter) -> String {
    let mut query = Query::select();
    query
        .expr(Func::count(Expr::col(Tracks::Id)))
        .from(Tracks::Table);
    apply_filter(&mut query, filter);
    query.to_string(SqliteQueryBuilder)
}

/// SELECT <track columns> FROM tracks WHERE is_active = 1
/// ORDER BY play_count DESC, id ASC LIMIT ?
pub fn select_popular(limit: u64) -> String {
    Query::select()
        .columns(TRACK_COLUMNS)
        .from(Tracks::Table)
        .and_where(Expr::col(Tracks::IsActive).eq(1))
        .order_by(Tracks::PlayCount, Order::Desc)
        .order_by(Tracks::Id, Order::Asc)
        .limit(limit)
        .to_string(SqliteQueryBuilder)
}

/// UPDATE tracks SET play_count = play_count + 1 WHERE id = ?
pub fn increment_play_count(id: i64) -> String {
    Query::update()
        .table(Tracks::Table)
        .value(Tracks::PlayCount, Expr::col(Tracks::PlayCount).add(1))
        .and_where(Expr::col(Tracks::Id).eq(id))
        .to_string(SqliteQueryBuilder)
}

/// UPDATE tracks SET is_active = 0 WHERE id = ?
pub fn deactivate(id: i64) -> String {
    Query::update()
        .table(Tracks::Table)
        .value(Tracks::IsActive, 0)
        .and_where(Expr::col(Tracks::Id).eq(id))
        .to_string(SqliteQueryBuilder)
}

/// SELECT COUNT(id) FROM tracks WHERE is_active = 1
pub fn count_active() -> String {
    Query::select()
        .expr(Func::count(Expr::col(Tracks::Id)))
        .from(Tracks::Table)
        .and_where(Expr::col(Tracks::IsActive).eq(1))
        .to_string(SqliteQueryBuilder)
}

/// SELECT id FROM tracks WHERE title = ? LIMIT 1
pub fn select_id_by_title(title: &str) -> String {
    Query::select()
        .column(Tracks::Id)
        .from(Tracks::Table)
        .and_where(Expr::col(Tracks::Title).eq(title))
        .limit(1)
        .to_string(SqliteQueryBuilder)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_filter_matches_title_artist_or_album() {
        let filter = TrackFilter {
            text: Some("tablas".to_string()),
            genre: Some("educativo".to_string()),
            subject: None,
        };
        let sql = search(&filter, 20, 40);
        assert!(sql.contains("\"title\" LIKE '%tablas%'"));
        assert!(sql.contains("\"artist\" LIKE '%tablas%'"));
        assert!(sql.contains("\"album\" LIKE '%tablas%'"));
        assert!(sql.contains(" OR "));
        assert!(sql.contains("\"genre\" = 'educativo'"));
        assert!(sql.contains("LIMIT 20"));
        assert!(sql.contains("OFFSET 40"));
    }

    #[test]
    fn search_without_filters_only_restricts_active() {
        let sql = count_search(&TrackFilter::default());
        assert!(sql.contains("\"is_active\" = 1"));
        assert!(!sql.contains("LIKE"));
    }
}
