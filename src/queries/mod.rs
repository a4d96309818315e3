//! SQL text builders, one module per table
//!
//! Every function returns a complete SQLite statement with its values inlined
//! by sea-query, ready for `sqlx::query(&sql)`.

pub mod ddl;
pub mod metadata;
pub mod play_events;
pub mod playlists;
pub mod sessions;
pub mod tracks;
pub mod users;
