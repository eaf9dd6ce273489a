//! Problem record storage.
//!
//! `KvStore` is the contract the reconciler writes against: a flat,
//! '/'-delimited key space with create-if-absent writes. `EmbeddedStore`
//! implements it on top of redb, either on disk or in memory (for tests).
//! The Consul-backed implementation lives in `checkwatch-consul`.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::PROBLEMS;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Durable key-value storage with hierarchical key listing.
pub trait KvStore: Send + Sync {
    /// Value stored at `key`, if any.
    fn get(&self, key: &str) -> impl Future<Output = StateResult<Option<String>>> + Send;

    /// Create `key` with `value` unless it already exists.
    ///
    /// Returns `false` (and leaves the stored value alone) when the key is
    /// already present.
    fn put(&self, key: &str, value: &str) -> impl Future<Output = StateResult<bool>> + Send;

    /// Remove `key`, or with `recursive` every key starting with `key`.
    ///
    /// Returns `true` when the operation was applied; removing a key that
    /// does not exist is not an error.
    fn delete(&self, key: &str, recursive: bool)
    -> impl Future<Output = StateResult<bool>> + Send;

    /// All keys starting with `prefix`, in lexicographic order.
    fn list_keys(&self, prefix: &str) -> impl Future<Output = StateResult<Vec<String>>> + Send;
}

/// Thread-safe problem record store backed by redb.
#[derive(Clone)]
pub struct EmbeddedStore {
    db: Arc<Database>,
}

impl EmbeddedStore {
    /// Open (or create) a persistent store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "embedded state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(PROBLEMS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn get_sync(&self, key: &str) -> StateResult<Option<String>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(PROBLEMS).map_err(map_err!(Table))?;
        let value = table
            .get(key)
            .map_err(map_err!(Read))?
            .map(|guard| String::from_utf8_lossy(guard.value()).into_owned());
        Ok(value)
    }

    fn put_sync(&self, key: &str, value: &str) -> StateResult<bool> {
        // Check and insert inside one write transaction; redb serializes
        // writers, so two callers can't both see the key as absent.
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let created;
        {
            let mut table = txn.open_table(PROBLEMS).map_err(map_err!(Table))?;
            created = table.get(key).map_err(map_err!(Read))?.is_none();
            if created {
                table
                    .insert(key, value.as_bytes())
                    .map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, created, "problem record put");
        Ok(created)
    }

    fn delete_sync(&self, key: &str, recursive: bool) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let removed;
        {
            let mut table = txn.open_table(PROBLEMS).map_err(map_err!(Table))?;
            if recursive {
                let keys = scan_prefix(&table, key)?;
                for k in &keys {
                    table.remove(k.as_str()).map_err(map_err!(Write))?;
                }
                removed = keys.len();
            } else {
                removed = usize::from(table.remove(key).map_err(map_err!(Write))?.is_some());
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, recursive, removed, "problem record delete");
        Ok(true)
    }

    fn list_keys_sync(&self, prefix: &str) -> StateResult<Vec<String>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(PROBLEMS).map_err(map_err!(Table))?;
        scan_prefix(&table, prefix)
    }
}

/// Keys starting with `prefix`. Keys are sorted, so the scan stops at the
/// first key past the prefix.
fn scan_prefix(
    table: &impl ReadableTable<&'static str, &'static [u8]>,
    prefix: &str,
) -> StateResult<Vec<String>> {
    let mut keys = Vec::new();
    for entry in table.range(prefix..).map_err(map_err!(Read))? {
        let (key, _) = entry.map_err(map_err!(Read))?;
        let key = key.value();
        if !key.starts_with(prefix) {
            break;
        }
        keys.push(key.to_string());
    }
    Ok(keys)
}

impl KvStore for EmbeddedStore {
    async fn get(&self, key: &str) -> StateResult<Option<String>> {
        self.get_sync(key)
    }

    async fn put(&self, key: &str, value: &str) -> StateResult<bool> {
        self.put_sync(key, value)
    }

    async fn delete(&self, key: &str, recursive: bool) -> StateResult<bool> {
        self.delete_sync(key, recursive)
    }

    async fn list_keys(&self, prefix: &str) -> StateResult<Vec<String>> {
        self.list_keys_sync(prefix)
    }
}
