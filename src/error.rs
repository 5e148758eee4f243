//! Error taxonomy shared by every engine operation.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Missing or malformed input, no matching result row, incomplete teacher decision.
    #[error("{0}")]
    Validation(String),

    /// No row to approve, update or read.
    #[error("{0}")]
    NotFound(String),

    /// Underlying persistence failure, including a rolled back transaction.
    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),
}

impl EngineError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Stable wire code used by the sidecar envelope.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "bad_params",
            Self::NotFound(_) => "not_found",
            Self::Store(_) => "db_query_failed",
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
