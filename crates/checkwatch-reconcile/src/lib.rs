//! checkwatch-reconcile — turns health check observations into alerts.
//!
//! # Architecture
//!
//! ```text
//!   Supervisor (poll loop, recovery, shutdown)
//!       │
//!       ▼
//!   Reconciler::run_cycle
//!       ├── record sweep:      KvStore records ──► HealthSource::checks_for_node
//!       │                      resolved → delete + "Resolved" alert
//!       │                      vanished → delete, no alert
//!       └── observation sweep: HealthSource::checks_for_status
//!                              new → create record + "Problem" alert
//! ```
//!
//! The reconciler is generic over its three collaborators, so the same code
//! runs against Consul in production and in-memory fakes in tests.

pub mod engine;
pub mod error;
pub mod supervisor;

#[cfg(test)]
mod testing;

pub use engine::{CycleReport, ReconcileSettings, Reconciler, StoredRecord};
pub use error::{ReconcileError, ReconcileResult};
pub use supervisor::{Exit, RetryPolicy, Supervisor, SupervisorState};
