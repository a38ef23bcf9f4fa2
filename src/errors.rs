//! Error types for the record index.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Record not found: {0}")]
    NotFound(i64),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Coarse classification used by the transport layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad client input.
    Validation,
    /// Lookup by id found nothing.
    NotFound,
    /// Anything raised below the query engine.
    Storage,
}

impl IndexError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Storage(_)
            | Self::Config(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::Sqlite(_) => ErrorKind::Storage,
        }
    }
}

pub type Result<T> = std::result::Result<T, IndexError>;
