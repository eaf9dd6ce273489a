//! checkwatch-state — where already-alerted problems are remembered.
//!
//! Defines the [`KvStore`] contract the reconciler persists problem records
//! through, and an embedded implementation backed by
//! [redb](https://docs.rs/redb) for single-host deployments and tests.
//!
//! # Architecture
//!
//! Problem records are plain string keys (`{prefix}/{class}/{dc}/{node}/{check}`)
//! with the check output as value. Keys are stored in one redb table so a
//! range scan from a prefix lists exactly the records under it.
//!
//! The `EmbeddedStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`).

pub mod error;
pub mod store;
pub mod tables;

pub use error::{StateError, StateResult};
pub use store::{EmbeddedStore, KvStore};
