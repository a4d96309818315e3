//! Error types shared by the stores, the upload pipeline and the HTTP layer

use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use log::error;
use thiserror::Error;

use crate::views;

pub type Result<T> = std::result::Result<T, AppError>;

/// Which kind of media an upload was expected to contain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Audio,
    Image,
}

impl MediaKind {
    pub fn noun(self) -> &'static str {
        match self {
            MediaKind::Audio => "audio file",
            MediaKind::Image => "image",
        }
    }
}

/// Failures of the upload pipeline
///
/// The `Display` text is shown to the user as-is.
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("The {} exceeds the maximum size of {limit_mb}MB", .kind.noun())]
    TooLarge { kind: MediaKind, limit_mb: u64 },

    #[error("The {} is empty", .0.noun())]
    Empty(MediaKind),

    #[error("Files with extension '{extension}' are not allowed for the {}", .kind.noun())]
    UnsupportedExtension { kind: MediaKind, extension: String },

    #[error("The file is not a valid {}: {detail}", .kind.noun())]
    UnrecognizedFormat { kind: MediaKind, detail: String },

    #[error("Malformed upload: {0}")]
    Multipart(String),

    #[error("Unexpected error while storing the file")]
    Io(#[from] std::io::Error),
}

impl UploadError {
    pub fn too_large(kind: MediaKind, limit_bytes: u64) -> Self {
        UploadError::TooLarge {
            kind,
            limit_mb: limit_bytes / (1024 * 1024),
        }
    }

    pub fn unrecognized(kind: MediaKind, detail: impl ToString) -> Self {
        UploadError::UnrecognizedFormat {
            kind,
            detail: detail.to_string(),
        }
    }
}

/// Application level errors
#[derive(Error, Debug)]
pub enum AppError {
    /// User-correctable input problem; the message is shown verbatim
    #[error("{0}")]
    Validation(String),

    /// Logged in, but the role does not allow the action
    #[error("{0}")]
    Forbidden(String),

    #[error("Resource not found")]
    NotFound,

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Message safe to show to an end user
    pub fn user_message(&self) -> String {
        match self {
            AppError::Validation(msg) | AppError::Forbidden(msg) => msg.clone(),
            AppError::Upload(e) => e.to_string(),
            AppError::NotFound => "The requested resource does not exist.".to_string(),
            AppError::Database(_) | AppError::Io(_) | AppError::Internal(_) => {
                "An unexpected error occurred. Please try again.".to_string()
            }
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::Upload(_) => StatusCode::BAD_REQUEST,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Database(_) | AppError::Io(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match status {
            StatusCode::NOT_FOUND => (status, Html(views::not_found_page())).into_response(),
            StatusCode::INTERNAL_SERVER_ERROR => {
                // Open transactions were dropped with the handler future, which rolls them back
                error!("Request failed: {}", self);
                (status, Html(views::server_error_page())).into_response()
            }
            _ => (status, Html(views::error_page(status, &self.user_message()))).into_response(),
        }
    }
}
