//! Alerts sent to operators and the `Notifier` seam that delivers them.

use std::fmt;
use std::future::Future;

use serde::Serialize;

use crate::key::ProblemKey;
use crate::types::CheckObservation;

/// Service and check id reported when the daemon itself fails.
pub const CRASH_SOURCE: &str = "checkwatch";

/// What happened to the check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AlertEvent {
    /// A monitored non-passing state was seen for the first time.
    Problem,
    /// A recorded problem is back in the resolved state.
    Resolved,
    /// The daemon hit an unexpected error and is stopping.
    Crashed,
}

impl fmt::Display for AlertEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AlertEvent::Problem => "Problem",
            AlertEvent::Resolved => "Resolved",
            AlertEvent::Crashed => "Crashed",
        })
    }
}

/// A single human-readable notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Alert {
    pub event: AlertEvent,
    pub datacenter: String,
    pub node: String,
    /// Empty for node-level checks.
    pub service: String,
    pub check_id: String,
    /// State label shown in the subject (`critical`, `passing`, `crashed`).
    pub state: String,
    pub output: String,
}

impl Alert {
    /// A newly detected problem, reported with the state it was found in.
    pub fn problem(key: &ProblemKey, obs: &CheckObservation) -> Self {
        Self {
            event: AlertEvent::Problem,
            datacenter: key.datacenter.clone(),
            node: key.node.clone(),
            service: key.service.clone().unwrap_or_default(),
            check_id: key.check_id.clone(),
            state: key.class.to_string(),
            output: obs.output.clone(),
        }
    }

    /// A recorded problem that has resolved. `output` is what the check
    /// reports now, not what was stored at detection time.
    pub fn resolved(key: &ProblemKey, resolved_state: &str, output: &str) -> Self {
        Self {
            event: AlertEvent::Resolved,
            datacenter: key.datacenter.clone(),
            node: key.node.clone(),
            service: key.service.clone().unwrap_or_default(),
            check_id: key.check_id.clone(),
            state: resolved_state.to_string(),
            output: output.to_string(),
        }
    }

    /// Final alert sent before the daemon terminates.
    pub fn crashed(detail: impl fmt::Display) -> Self {
        Self {
            event: AlertEvent::Crashed,
            datacenter: String::new(),
            node: String::new(),
            service: CRASH_SOURCE.to_string(),
            check_id: CRASH_SOURCE.to_string(),
            state: "crashed".to_string(),
            output: detail.to_string(),
        }
    }

    /// Subject line: `Problem: critical: svc-disk`.
    pub fn subject(&self) -> String {
        format!("{}: {}: {}", self.event, self.state, self.check_id)
    }

    /// Plain-text message body.
    pub fn body(&self) -> String {
        format!(
            "DC: {}\nNode: {}\nService: {}\nCheckID: {}\n\nOutput:\n{}",
            self.datacenter, self.node, self.service, self.check_id, self.output
        )
    }
}

/// Best-effort alert delivery.
///
/// Implementations must not fail: delivery errors are logged by the
/// implementation and otherwise dropped. Alerts are never retried.
pub trait Notifier: Send + Sync {
    fn send(&self, alert: &Alert) -> impl Future<Output = ()> + Send;
}
