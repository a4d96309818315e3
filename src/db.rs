//! SQLite connection handling and schema setup

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{Executor, Row};
use std::str::FromStr;

use crate::constants::EXPECTED_DB_VERSION;
use crate::queries::{ddl, metadata};

pub type DynError = Box<dyn std::error::Error + Send + Sync>;

/// Current time as unix milliseconds, the unit of every timestamp column
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Open a connection pool for production use
/// Creates the file if needed, enables WAL mode and foreign keys
pub async fn open_database(url: &str) -> Result<SqlitePool, DynError> {
    let options = SqliteConnectOptions::from_str(url)
        .map_err(|e| format!("Invalid database url '{}': {}", url, e))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// Create a pool backed by a file in a fresh temporary directory
/// Keep the returned guard alive for as long as the pool is used
pub async fn create_test_connection_in_temporary_file(
) -> Result<(SqlitePool, tempfile::TempDir), DynError> {
    let guard = tempfile::tempdir()?;
    let db_path = guard.path().join("test.sqlite");
    let options = SqliteConnectOptions::new()
        .filename(&db_path)
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok((pool, guard))
}

/// Create tables and indexes, then record or verify the schema version
pub async fn init_database_schema(pool: &SqlitePool) -> Result<(), DynError> {
    for sql in [
        ddl::create_metadata_table(),
        ddl::create_users_table(),
        ddl::create_sessions_table(),
        ddl::create_tracks_table(),
        ddl::create_playlists_table(),
        ddl::create_playlist_entries_table(),
        ddl::create_play_events_table(),
        ddl::create_playlist_entries_position_index(),
        ddl::create_tracks_uploaded_at_index(),
        ddl::create_tracks_play_count_index(),
        ddl::create_play_events_user_track_index(),
        ddl::create_sessions_expires_at_index(),
    ] {
        sqlx::query(&sql).execute(pool).await?;
    }

    match query_metadata(pool, "version").await? {
        None => upsert_metadata(pool, "version", EXPECTED_DB_VERSION).await?,
        Some(version) if version == EXPECTED_DB_VERSION => {}
        Some(version) => {
            return Err(format!(
                "Unsupported database version: '{}'. This application only supports version '{}'",
                version, EXPECTED_DB_VERSION
            )
            .into())
        }
    }

    Ok(())
}

/// Query a single metadata value by key
pub async fn query_metadata<'e, E>(executor: E, key: &str) -> Result<Option<String>, DynError>
where
    E: Executor<'e, Database = sqlx::Sqlite>,
{
    let sql = metadata::select_by_key(key);
    let result = sqlx::query(&sql).fetch_optional(executor).await?;

    Ok(result.map(|row| row.get::<String, _>(0)))
}

/// Update or insert a metadata key-value pair
pub async fn upsert_metadata<'e, E>(executor: E, key: &str, value: &str) -> Result<(), DynError>
where
    E: Executor<'e, Database = sqlx::Sqlite>,
{
    let sql = metadata::upsert(key, value);
    sqlx::query(&sql).execute(executor).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn schema_init_is_idempotent_and_versioned() {
        let (pool, _guard) = create_test_connection_in_temporary_file().await.unwrap();
        init_database_schema(&pool).await.unwrap();
        init_database_schema(&pool).await.unwrap();

        let version = query_metadata(&pool, "version").await.unwrap();
        assert_eq!(version.as_deref(), Some(EXPECTED_DB_VERSION));
    }

    #[tokio::test]
    async fn rejects_unknown_schema_version() {
        let (pool, _guard) = create_test_connection_in_temporary_file().await.unwrap();
        init_database_schema(&pool).await.unwrap();
        upsert_metadata(&pool, "version", "999").await.unwrap();

        let err = init_database_schema(&pool).await.unwrap_err();
        assert!(err.to_string().contains("Unsupported database version"));
    }
}
