//! Reconciliation engine — keeps problem records in step with the registry.
//!
//! Each cycle makes two passes. The record sweep walks every stored
//! problem record and deletes those whose check has passed (notifying
//! "Resolved") or vanished (silently). The observation sweep then walks
//! every check currently in a monitored state and records and notifies
//! those not seen before. The record sweep always runs first, so a check
//! that flapped within one poll interval has its old record settled before
//! new detections are written.
//!
//! Any store or registry error aborts the whole cycle. Both passes are
//! idempotent, so the next cycle picks up wherever this one stopped.

use serde::Serialize;
use tracing::{debug, info, warn};

use checkwatch_core::{
    Alert, CheckObservation, CheckwatchConfig, HealthSource, HealthState, Notifier, ProblemKey,
};
use checkwatch_state::KvStore;

use crate::error::ReconcileResult;

/// What the reconciler watches for and where it keeps its records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileSettings {
    /// Namespace of problem records in the store.
    pub key_prefix: String,
    /// States that raise a problem.
    pub monitored: Vec<HealthState>,
    /// State that resolves a problem.
    pub resolved: HealthState,
}

impl ReconcileSettings {
    pub fn from_config(config: &CheckwatchConfig) -> Self {
        Self {
            key_prefix: config.key_prefix.clone(),
            monitored: config.monitored_states.clone(),
            resolved: config.resolved_state,
        }
    }
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self::from_config(&CheckwatchConfig::default())
    }
}

/// Counts from one cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub datacenters: usize,
    /// Records deleted because their check passed.
    pub resolved: usize,
    /// Records deleted because their check no longer exists.
    pub orphaned: usize,
    /// New records written.
    pub detected: usize,
    /// Stored keys under the namespace that could not be parsed.
    pub malformed: usize,
}

impl CycleReport {
    /// Whether the cycle changed anything.
    pub fn is_quiet(&self) -> bool {
        self.resolved == 0 && self.orphaned == 0 && self.detected == 0
    }
}

/// A stored problem record as listed for operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredRecord {
    pub path: String,
    /// `None` when the key does not follow the record schema.
    pub problem: Option<ProblemKey>,
    /// Check output captured at detection time.
    pub output: Option<String>,
}

/// Reconciles problem records in `S` against checks in `H`, alerting via `N`.
pub struct Reconciler<S, H, N> {
    store: S,
    health: H,
    notifier: N,
    settings: ReconcileSettings,
}

impl<S, H, N> Reconciler<S, H, N>
where
    S: KvStore,
    H: HealthSource,
    N: Notifier,
{
    pub fn new(store: S, health: H, notifier: N, settings: ReconcileSettings) -> Self {
        Self {
            store,
            health,
            notifier,
            settings,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn health(&self) -> &H {
        &self.health
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    pub fn settings(&self) -> &ReconcileSettings {
        &self.settings
    }

    /// Check that the registry answers. Returns its datacenters.
    pub async fn probe(&self) -> ReconcileResult<Vec<String>> {
        Ok(self.health.list_datacenters().await?)
    }

    /// Run one full reconciliation cycle.
    pub async fn run_cycle(&self) -> ReconcileResult<CycleReport> {
        let datacenters = self.health.list_datacenters().await?;
        let mut report = CycleReport {
            datacenters: datacenters.len(),
            ..Default::default()
        };

        self.sweep_records(&mut report).await?;
        self.sweep_observations(&datacenters, &mut report).await?;

        Ok(report)
    }

    /// Resolve or prune every stored record.
    async fn sweep_records(&self, report: &mut CycleReport) -> ReconcileResult<()> {
        let prefix = &self.settings.key_prefix;

        for &class in &self.settings.monitored {
            let keys = self
                .store
                .list_keys(&ProblemKey::class_prefix(prefix, class))
                .await?;

            for path in keys {
                let key = match ProblemKey::parse(prefix, &path) {
                    Ok(key) => key,
                    Err(e) => {
                        warn!(key = %path, error = %e, "skipping malformed problem record");
                        report.malformed += 1;
                        continue;
                    }
                };
                self.settle_record(&path, &key, report).await?;
            }
        }
        Ok(())
    }

    async fn settle_record(
        &self,
        path: &str,
        key: &ProblemKey,
        report: &mut CycleReport,
    ) -> ReconcileResult<()> {
        let checks = self
            .health
            .checks_for_node(&key.datacenter, &key.node)
            .await?;
        let mut matching = checks.iter().filter(|c| c.check_id == key.check_id).peekable();

        if matching.peek().is_none() {
            // The check itself is gone; "resolved" would be misleading.
            info!(key = %path, check_id = %key.check_id, "previously saved check is absent");
            if self.store.delete(path, false).await? {
                info!(key = %path, "deleted problem record");
                report.orphaned += 1;
            }
            return Ok(());
        }

        let Some(current) = matching.find(|c| c.status == self.settings.resolved) else {
            debug!(key = %path, "problem persists");
            return Ok(());
        };

        info!(key = %path, state = %self.settings.resolved, "found resolved state");
        if self.store.delete(path, false).await? {
            info!(key = %path, "deleted problem record");
            report.resolved += 1;
            let alert = Alert::resolved(key, self.settings.resolved.as_str(), &current.output);
            self.notifier.send(&alert).await;
        }
        Ok(())
    }

    /// Record and announce every observation not seen before.
    async fn sweep_observations(
        &self,
        datacenters: &[String],
        report: &mut CycleReport,
    ) -> ReconcileResult<()> {
        for dc in datacenters {
            for &class in &self.settings.monitored {
                let observations = self.health.checks_for_status(class, dc).await?;
                for obs in &observations {
                    if self.record_if_novel(class, obs).await? {
                        report.detected += 1;
                    }
                }
            }
        }
        Ok(())
    }

    async fn record_if_novel(
        &self,
        class: HealthState,
        obs: &CheckObservation,
    ) -> ReconcileResult<bool> {
        let key = ProblemKey::for_observation(class, obs);
        let path = key.path(&self.settings.key_prefix);

        if self.store.get(&path).await?.is_some() {
            return Ok(false);
        }
        if !self.store.put(&path, &obs.output).await? {
            debug!(key = %path, "problem record already created elsewhere");
            return Ok(false);
        }

        warn!(key = %path, state = %class, "found problem state, saved problem record");
        self.notifier.send(&Alert::problem(&key, obs)).await;
        Ok(true)
    }

    /// Every record under the namespace, with its stored output.
    pub async fn list_records(&self) -> ReconcileResult<Vec<StoredRecord>> {
        let prefix = &self.settings.key_prefix;
        let keys = self.store.list_keys(&format!("{prefix}/")).await?;

        let mut records = Vec::with_capacity(keys.len());
        for path in keys {
            let output = self.store.get(&path).await?;
            records.push(StoredRecord {
                problem: ProblemKey::parse(prefix, &path).ok(),
                output,
                path,
            });
        }
        Ok(records)
    }
}
