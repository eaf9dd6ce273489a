//! Domain types shared by the registry clients and the reconciler.
//!
//! These mirror what the service registry reports about health checks.
//! They are snapshots: re-fetched every cycle and never persisted as-is.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Status of a health check as reported by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Passing,
    Warning,
    Critical,
    /// Anything the registry reports that we don't recognize.
    #[serde(other)]
    Unknown,
}

impl HealthState {
    /// The label used on the wire, in key paths and in alert subjects.
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthState::Passing => "passing",
            HealthState::Warning => "warning",
            HealthState::Critical => "critical",
            HealthState::Unknown => "unknown",
        }
    }
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing a state label that is not one of
/// `passing`, `warning` or `critical`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized health state: {0:?}")]
pub struct ParseHealthStateError(pub String);

impl FromStr for HealthState {
    type Err = ParseHealthStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "passing" => Ok(HealthState::Passing),
            "warning" => Ok(HealthState::Warning),
            "critical" => Ok(HealthState::Critical),
            _ => Err(ParseHealthStateError(s.to_string())),
        }
    }
}

/// A check currently reported in a given state within one datacenter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckObservation {
    pub datacenter: String,
    pub node: String,
    pub check_id: String,
    /// Owning service; `None` for node-level checks.
    pub service: Option<String>,
    pub status: HealthState,
    pub output: String,
}

/// A single check as listed for one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeCheck {
    pub check_id: String,
    pub service: Option<String>,
    pub status: HealthState,
    pub output: String,
}

/// Normalize a registry service name: the registry reports node-level
/// checks with an empty service name.
pub fn non_empty(service: String) -> Option<String> {
    if service.is_empty() { None } else { Some(service) }
}
