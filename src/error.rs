// src/error.rs

use std::fmt::Display;

/// Errors surfaced by detection, persistence and merge operations.
///
/// Every variant means nothing was changed in the store.
#[derive(Debug, thiserror::Error)]
pub enum DedupeError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: i64 },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Storage failure: {0}")]
    TransientStorage(String),
}

pub type DedupeResult<T> = std::result::Result<T, DedupeError>;

impl DedupeError {
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        Self::NotFound { entity, id }
    }

    /// Wraps a driver or pool error with the operation it interrupted.
    pub fn storage<E: Display>(context: impl Into<String>) -> impl FnOnce(E) -> Self {
        let context = context.into();
        move |e| Self::TransientStorage(format!("{}: {}", context, e))
    }

    /// HTTP status the caller-facing layer maps this error to.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound { .. } => 404,
            Self::Conflict(_) => 409,
            Self::InvalidArgument(_) => 400,
            Self::TransientStorage(_) => 500,
        }
    }

    /// Only storage failures are safe to retry wholesale.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientStorage(_))
    }
}
