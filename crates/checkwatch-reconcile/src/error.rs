//! Reconciler error types.

use thiserror::Error;

use checkwatch_core::HealthError;
use checkwatch_state::StateError;

/// Errors that abort a reconciliation cycle or the poll loop.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("state store error: {0}")]
    State(#[from] StateError),

    #[error("health source error: {0}")]
    Health(#[from] HealthError),

    #[error("registry still unreachable after {attempts} reconnect attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<ReconcileError>,
    },
}

impl ReconcileError {
    /// Connectivity failures are retried by reconnecting; everything else
    /// is fatal.
    pub fn is_connectivity(&self) -> bool {
        match self {
            ReconcileError::State(e) => e.is_connectivity(),
            ReconcileError::Health(e) => e.is_connectivity(),
            ReconcileError::RetriesExhausted { .. } => false,
        }
    }
}

pub type ReconcileResult<T> = Result<T, ReconcileError>;
