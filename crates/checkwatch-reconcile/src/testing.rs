//! In-memory collaborators for reconciler and supervisor tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use checkwatch_core::{
    Alert, AlertEvent, CheckObservation, HealthError, HealthResult, HealthSource, HealthState,
    NodeCheck, Notifier,
};
use checkwatch_state::{KvStore, StateError, StateResult};

#[derive(Default)]
struct Registry {
    datacenters: Vec<String>,
    checks: Vec<CheckObservation>,
    failures: VecDeque<HealthError>,
    probes: usize,
}

/// A scriptable service registry.
#[derive(Default)]
pub struct FakeHealth {
    inner: Mutex<Registry>,
}

impl FakeHealth {
    pub fn new(datacenters: &[&str]) -> Self {
        let health = Self::default();
        health.inner.lock().unwrap().datacenters =
            datacenters.iter().map(|dc| dc.to_string()).collect();
        health
    }

    /// Report `check_id` on `node` in `status`, replacing whatever was
    /// reported for it before.
    pub fn set_check(
        &self,
        datacenter: &str,
        node: &str,
        check_id: &str,
        service: Option<&str>,
        status: HealthState,
        output: &str,
    ) {
        self.remove_check(datacenter, node, check_id);
        self.push_check(datacenter, node, check_id, service, status, output);
    }

    /// Add a report without replacing existing ones for the same check.
    pub fn push_check(
        &self,
        datacenter: &str,
        node: &str,
        check_id: &str,
        service: Option<&str>,
        status: HealthState,
        output: &str,
    ) {
        self.inner.lock().unwrap().checks.push(CheckObservation {
            datacenter: datacenter.to_string(),
            node: node.to_string(),
            check_id: check_id.to_string(),
            service: service.map(str::to_string),
            status,
            output: output.to_string(),
        });
    }

    pub fn remove_check(&self, datacenter: &str, node: &str, check_id: &str) {
        self.inner.lock().unwrap().checks.retain(|c| {
            !(c.datacenter == datacenter && c.node == node && c.check_id == check_id)
        });
    }

    /// Make the next call (of any kind) fail with `err`. Queued failures
    /// are consumed in order.
    pub fn fail_next(&self, err: HealthError) {
        self.inner.lock().unwrap().failures.push_back(err);
    }

    /// Number of `list_datacenters` calls made so far.
    pub fn probes(&self) -> usize {
        self.inner.lock().unwrap().probes
    }

    fn take_failure(&self) -> HealthResult<()> {
        match self.inner.lock().unwrap().failures.pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl HealthSource for FakeHealth {
    async fn list_datacenters(&self) -> HealthResult<Vec<String>> {
        self.inner.lock().unwrap().probes += 1;
        self.take_failure()?;
        Ok(self.inner.lock().unwrap().datacenters.clone())
    }

    async fn checks_for_status(
        &self,
        status: HealthState,
        datacenter: &str,
    ) -> HealthResult<Vec<CheckObservation>> {
        self.take_failure()?;
        let registry = self.inner.lock().unwrap();
        Ok(registry
            .checks
            .iter()
            .filter(|c| c.datacenter == datacenter && c.status == status)
            .cloned()
            .collect())
    }

    async fn checks_for_node(&self, datacenter: &str, node: &str) -> HealthResult<Vec<NodeCheck>> {
        self.take_failure()?;
        let registry = self.inner.lock().unwrap();
        Ok(registry
            .checks
            .iter()
            .filter(|c| c.datacenter == datacenter && c.node == node)
            .map(|c| NodeCheck {
                check_id: c.check_id.clone(),
                service: c.service.clone(),
                status: c.status,
                output: c.output.clone(),
            })
            .collect())
    }
}

/// Remembers every alert instead of delivering it.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Alert>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<Alert> {
        self.sent.lock().unwrap().clone()
    }

    pub fn count(&self, event: AlertEvent) -> usize {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.event == event)
            .count()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }
}

impl Notifier for RecordingNotifier {
    async fn send(&self, alert: &Alert) {
        self.sent.lock().unwrap().push(alert.clone());
    }
}

/// Wraps a store and fails chosen calls.
pub struct FlakyStore<S> {
    inner: S,
    failures: Mutex<VecDeque<StateError>>,
}

impl<S: KvStore> FlakyStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            failures: Mutex::new(VecDeque::new()),
        }
    }

    /// Make the next store call fail with `err`.
    pub fn fail_next(&self, err: StateError) {
        self.failures.lock().unwrap().push_back(err);
    }

    fn take_failure(&self) -> StateResult<()> {
        match self.failures.lock().unwrap().pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl<S: KvStore> KvStore for FlakyStore<S> {
    async fn get(&self, key: &str) -> StateResult<Option<String>> {
        self.take_failure()?;
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, value: &str) -> StateResult<bool> {
        self.take_failure()?;
        self.inner.put(key, value).await
    }

    async fn delete(&self, key: &str, recursive: bool) -> StateResult<bool> {
        self.take_failure()?;
        self.inner.delete(key, recursive).await
    }

    async fn list_keys(&self, prefix: &str) -> StateResult<Vec<String>> {
        self.take_failure()?;
        self.inner.list_keys(prefix).await
    }
}
