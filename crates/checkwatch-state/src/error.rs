//! Error types for the problem record store.

use thiserror::Error;

/// Result type alias for state store operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur during state store operations.
#[derive(Debug, Error)]
pub enum StateError {
    /// The store could not be reached. Recoverable by reconnecting.
    #[error("state store unavailable: {0}")]
    Unavailable(String),

    #[error("failed to open database: {0}")]
    Open(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("store returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode store response: {0}")]
    Decode(String),
}

impl StateError {
    /// Whether this error means the store is unreachable rather than
    /// misbehaving.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, StateError::Unavailable(_))
    }
}
