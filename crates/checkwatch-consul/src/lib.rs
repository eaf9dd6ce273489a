//! checkwatch-consul — Consul as both the health source and the problem
//! record store.
//!
//! # Architecture
//!
//! ```text
//! ConsulClient (hyper, one HTTP/1.1 connection per request)
//!   ├── ConsulKv     → KvStore       (/v1/kv, cas=0 for create-if-absent)
//!   └── ConsulHealth → HealthSource  (/v1/catalog/datacenters, /v1/health/*)
//! ```
//!
//! Transport failures (refused connection, reset, broken handshake) surface
//! as the `Unavailable` variant of `StateError` / `HealthError`, which the
//! supervisor treats as "wait and reconnect". Everything else, including
//! non-2xx answers from a reachable agent, is reported as-is.

pub mod client;
pub mod health;
pub mod kv;

pub use client::{ConsulClient, ConsulError};
pub use health::ConsulHealth;
pub use kv::ConsulKv;
