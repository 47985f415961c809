//! Error types for the recall memory store.

use thiserror::Error;

/// Top-level error type for all store operations.
///
/// A missing memory id is deliberately *not* represented here: updates
/// report it through a `false` return and lookups through `None`.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Malformed caller input; the operation was not attempted.
    #[error("Invalid input: {0}")]
    Validation(String),

    /// SQLite failure. The enclosing transaction has been rolled back.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Metadata could not be encoded or decoded as JSON.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Shorthand for a [`StoreError::Validation`] error.
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, StoreError>;
