//! Read-only view of the service registry's health checks.

use std::future::Future;

use thiserror::Error;

use crate::types::{CheckObservation, HealthState, NodeCheck};

/// Result type alias for health source queries.
pub type HealthResult<T> = Result<T, HealthError>;

/// Errors returned by a [`HealthSource`].
#[derive(Debug, Error)]
pub enum HealthError {
    /// The registry could not be reached. Recoverable by reconnecting.
    #[error("registry unavailable: {0}")]
    Unavailable(String),

    #[error("registry returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode registry response: {0}")]
    Decode(String),

    #[error("request error: {0}")]
    Request(String),
}

impl HealthError {
    /// Whether this error means the registry is unreachable rather than
    /// misbehaving.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, HealthError::Unavailable(_))
    }
}

/// Current check statuses per node and datacenter.
pub trait HealthSource: Send + Sync {
    /// All datacenters known to the registry.
    fn list_datacenters(&self) -> impl Future<Output = HealthResult<Vec<String>>> + Send;

    /// Every check currently in `status` within `datacenter`.
    fn checks_for_status(
        &self,
        status: HealthState,
        datacenter: &str,
    ) -> impl Future<Output = HealthResult<Vec<CheckObservation>>> + Send;

    /// Every check registered on `node` within `datacenter`.
    fn checks_for_node(
        &self,
        datacenter: &str,
        node: &str,
    ) -> impl Future<Output = HealthResult<Vec<NodeCheck>>> + Send;
}
