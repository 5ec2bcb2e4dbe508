//! Error types for the adherence engine and its storage.
//!
//! An undefined dose offset is not an error; it is `None` on the entry.

use thiserror::Error;

/// Failures of the transactional key-value store.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("json codec error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("store lock poisoned: {0}")]
    Poisoned(String),

    #[error("write attempted in a read-only transaction")]
    ReadOnly,
}

#[derive(Error, Debug)]
pub enum MedError {
    /// Malformed shorthand; `token` is the offending input.
    #[error("cannot parse `{token}`: {reason}")]
    Parse { token: String, reason: String },

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl MedError {
    pub(crate) fn parse(token: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Parse {
            token: token.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub(crate) fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }
}

impl From<rusqlite::Error> for MedError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Storage(StorageError::Sqlite(e))
    }
}

impl From<serde_json::Error> for MedError {
    fn from(e: serde_json::Error) -> Self {
        Self::Storage(StorageError::Json(e))
    }
}

pub type MedResult<T> = Result<T, MedError>;
