//! Serving stored audio files back to the player

use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use log::warn;
use sqlx::sqlite::SqlitePool;
use std::path::{Path, PathBuf};
use tokio_util::io::ReaderStream;

use crate::catalog;
use crate::constants::MUSIC_DIR;
use crate::error::{AppError, Result};

/// Content type for a stored audio file, by extension
pub fn audio_content_type(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        Some("ogg") => "audio/ogg",
        Some("flac") => "audio/flac",
        Some("m4a") => "audio/mp4",
        _ => "application/octet-stream",
    }
}

#[derive(Debug, Clone)]
pub struct TrackFile {
    pub path: PathBuf,
    pub content_type: &'static str,
    pub len: u64,
}

/// Find the stored file of an active track
///
/// Unknown or inactive tracks and files missing from disk are all `NotFound`.
pub async fn resolve_track_file(
    pool: &SqlitePool,
    upload_dir: &Path,
    track_id: i64,
) -> Result<TrackFile> {
    let track = catalog::find_active_track(pool, track_id)
        .await?
        .ok_or(AppError::NotFound)?;

    // Stored names are generated, but never let one escape the music dir
    let name = Path::new(&track.audio_file);
    if name.components().count() != 1 {
        warn!("Track {} has a suspicious file name: {}", track.id, track.audio_file);
        return Err(AppError::NotFound);
    }

    let path = upload_dir.join(MUSIC_DIR).join(name);
    let metadata = match tokio::fs::metadata(&path).await {
        Ok(m) if m.is_file() => m,
        _ => {
            warn!("Audio file for track {} is missing: {}", track.id, path.display());
            return Err(AppError::NotFound);
        }
    };

    Ok(TrackFile {
        content_type: audio_content_type(&path),
        len: metadata.len(),
        path,
    })
}

/// Respond with the whole file; no ranges
pub async fn stream_response(file: TrackFile) -> Result<Response> {
    let handle = tokio::fs::File::open(&file.path).await?;
    let body = Body::from_stream(ReaderStream::new(handle));

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(file.content_type)),
            (header::CONTENT_LENGTH, HeaderValue::from(file.len)),
        ],
        body,
    )
        .into_response())
}
