use std::path::PathBuf;

use axum::{http::StatusCode, response::IntoResponse};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Cannot read feed {}: {source}", path.display())]
    FeedRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Cannot parse feed {}: {source}", path.display())]
    FeedParse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid {feed} record #{index}: {reason}")]
    InvalidRecord {
        feed: &'static str,
        index: usize,
        reason: String,
    },

    #[error("Corrupt stored row: {0}")]
    CorruptRow(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}
