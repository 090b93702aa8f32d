//! Error types for the persistence boundary

use thiserror::Error;

use crate::config::friendly_io_error_message;

/// Failure reading or writing persisted timer or user data
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Encoding error: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
}

impl StoreError {
    /// Render the error for a log line, with disk-full / permission hints for IO errors
    pub fn describe(&self, context: &str) -> String {
        match self {
            StoreError::Io(e) => friendly_io_error_message(e, context),
            StoreError::Json(e) => format!("{}: {}", context, e),
            StoreError::Encoding(e) => format!("{}: {}", context, e),
        }
    }

    /// The stored content itself is unusable, as opposed to the disk failing
    pub fn is_corrupt(&self) -> bool {
        matches!(self, StoreError::Json(_) | StoreError::Encoding(_))
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
