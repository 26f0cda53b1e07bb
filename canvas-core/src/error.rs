//! Error types shared by every canvas-core module.
//!
//! Validation and not-found failures are meant for direct display, so their
//! messages are written for a user, not a developer.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CanvasError {
    /// User input broke an entity invariant (empty name, duplicate, too long).
    #[error("Validation error: {0}")]
    Validation(String),

    /// Update or delete addressed an unknown id.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed import file, corrupt backup, checksum mismatch.
    #[error("Integrity error: {0}")]
    Integrity(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type CanvasResult<T> = Result<T, CanvasError>;

impl CanvasError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn integrity(msg: impl Into<String>) -> Self {
        Self::Integrity(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<anyhow::Error> for CanvasError {
    fn from(err: anyhow::Error) -> Self {
        CanvasError::Storage(err.to_string())
    }
}
