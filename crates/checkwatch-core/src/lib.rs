//! checkwatch-core — shared vocabulary for the checkwatch daemon.
//!
//! Holds the registry-facing domain types, the problem record key schema,
//! the alert model, the collaborator traits the reconciler is written
//! against, and configuration parsing.

pub mod alert;
pub mod config;
pub mod health;
pub mod key;
pub mod types;

pub use alert::{Alert, AlertEvent, Notifier};
pub use config::{CheckwatchConfig, ConfigError, LogFormat, StateBackend};
pub use health::{HealthError, HealthResult, HealthSource};
pub use key::{KeyError, ProblemKey};
pub use types::*;
