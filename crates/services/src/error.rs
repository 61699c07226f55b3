//! Shared error types for the services crate.

use thiserror::Error;

use exam_core::model::{AnswerBatchError, StudentError};
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by the registry, session manager and answer submission.
///
/// Each variant maps to one stable [`code`](ServiceError::code) so callers can
/// branch on it without parsing messages.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ServiceError {
    /// Malformed or incomplete input. Fix the input; retrying as-is won't help.
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("not found")]
    NotFound,
    /// The session was already finalized; the earlier submission stands.
    #[error("session already finished")]
    Conflict,
    /// Storage could not be reached. Safe to retry the whole operation.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("storage failure: {0}")]
    Storage(String),
}

impl ServiceError {
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::Validation(_) => "validation",
            ServiceError::NotFound => "not_found",
            ServiceError::Conflict => "conflict",
            ServiceError::Unavailable(_) => "unavailable",
            ServiceError::Storage(_) => "storage",
        }
    }

    /// HTTP-equivalent status for the error.
    #[must_use]
    pub fn status(&self) -> u16 {
        match self {
            ServiceError::Validation(_) => 400,
            ServiceError::NotFound => 404,
            ServiceError::Conflict => 409,
            ServiceError::Unavailable(_) => 503,
            ServiceError::Storage(_) => 500,
        }
    }

    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, ServiceError::Unavailable(_))
    }
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound => ServiceError::NotFound,
            StorageError::Conflict => ServiceError::Conflict,
            StorageError::Connection(msg) => ServiceError::Unavailable(msg),
            other => ServiceError::Storage(other.to_string()),
        }
    }
}

impl From<StudentError> for ServiceError {
    fn from(err: StudentError) -> Self {
        ServiceError::Validation(err.to_string())
    }
}

impl From<AnswerBatchError> for ServiceError {
    fn from(err: AnswerBatchError) -> Self {
        ServiceError::Validation(err.to_string())
    }
}

/// Errors emitted while loading configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid value for {key}: {raw}")]
    InvalidEnv { key: &'static str, raw: String },
    #[error("invalid config: {0}")]
    Invalid(String),
    #[error(transparent)]
    Rules(#[from] AnswerBatchError),
}

/// Errors emitted while bootstrapping services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
}
