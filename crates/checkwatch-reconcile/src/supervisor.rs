//! Poll loop with connection recovery.
//!
//! The `Supervisor` owns a [`Reconciler`] and runs it every poll interval.
//! A connectivity failure (registry or store unreachable) switches it into
//! recovery, where it probes the registry at once and then every retry
//! interval until it answers again. Any other failure is fatal: a crash alert is sent and
//! `run` returns [`Exit::Fatal`].
//!
//! Shutdown is observed only while sleeping; a cycle in flight always runs
//! to completion.

use std::fmt;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use checkwatch_core::{Alert, HealthSource, Notifier};
use checkwatch_state::KvStore;

use crate::engine::Reconciler;
use crate::error::ReconcileError;

/// Where the poll loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Connecting,
    Polling,
    Recovering,
    Terminated,
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SupervisorState::Connecting => "connecting",
            SupervisorState::Polling => "polling",
            SupervisorState::Recovering => "recovering",
            SupervisorState::Terminated => "terminated",
        };
        f.write_str(s)
    }
}

/// Why the poll loop stopped.
#[derive(Debug)]
pub enum Exit {
    /// Shutdown was requested.
    Shutdown,
    /// An unrecoverable error. A crash alert has already been sent.
    Fatal(ReconcileError),
}

impl Exit {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Exit::Fatal(_))
    }
}

/// How to retry while the registry is unreachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub interval: Duration,
    /// `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl RetryPolicy {
    pub fn unbounded(interval: Duration) -> Self {
        Self {
            interval,
            max_attempts: None,
        }
    }

    fn exhausted(&self, attempts: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::unbounded(Duration::from_secs(10))
    }
}

pub struct Supervisor<S, H, N> {
    reconciler: Reconciler<S, H, N>,
    poll_interval: Duration,
    retry: RetryPolicy,
    endpoint: String,
    state: SupervisorState,
}

impl<S, H, N> Supervisor<S, H, N>
where
    S: KvStore,
    H: HealthSource,
    N: Notifier,
{
    pub fn new(reconciler: Reconciler<S, H, N>, poll_interval: Duration, retry: RetryPolicy) -> Self {
        Self {
            reconciler,
            poll_interval,
            retry,
            endpoint: "registry".to_string(),
            state: SupervisorState::Connecting,
        }
    }

    /// Name the registry endpoint in connectivity logs.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    pub fn reconciler(&self) -> &Reconciler<S, H, N> {
        &self.reconciler
    }

    /// Run until shutdown is signalled on `shutdown` or a fatal error occurs.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Exit {
        let exit = self.drive(&mut shutdown).await;
        if let Exit::Fatal(e) = &exit {
            error!(endpoint = %self.endpoint, error = %e, "unrecoverable error, stopping");
            self.crash(e).await;
        }
        self.transition(SupervisorState::Terminated);
        exit
    }

    async fn drive(&mut self, shutdown: &mut watch::Receiver<bool>) -> Exit {
        if *shutdown.borrow() {
            return Exit::Shutdown;
        }

        self.transition(SupervisorState::Connecting);
        if let Err(exit) = self.await_registry(shutdown).await {
            return exit;
        }

        loop {
            self.transition(SupervisorState::Polling);
            match self.reconciler.run_cycle().await {
                Ok(report) if report.is_quiet() => {
                    debug!(datacenters = report.datacenters, malformed = report.malformed, "cycle complete");
                }
                Ok(report) => {
                    info!(
                        datacenters = report.datacenters,
                        detected = report.detected,
                        resolved = report.resolved,
                        orphaned = report.orphaned,
                        malformed = report.malformed,
                        "cycle complete"
                    );
                }
                Err(e) if e.is_connectivity() => {
                    error!(endpoint = %self.endpoint, error = %e, "lost connection to registry");
                    self.transition(SupervisorState::Recovering);
                    if let Err(exit) = self.await_registry(shutdown).await {
                        return exit;
                    }
                }
                Err(e) => return Exit::Fatal(e),
            }

            if pause(self.poll_interval, shutdown).await {
                return Exit::Shutdown;
            }
        }
    }

    /// Probe now, then every retry interval, until the registry answers.
    /// `Err` carries the exit to take instead.
    async fn await_registry(&mut self, shutdown: &mut watch::Receiver<bool>) -> Result<(), Exit> {
        let mut failures = 0u32;
        loop {
            match self.reconciler.probe().await {
                Ok(datacenters) if self.state == SupervisorState::Connecting => {
                    info!(endpoint = %self.endpoint, datacenters = datacenters.len(), "connected to registry");
                    return Ok(());
                }
                Ok(_) => {
                    info!(endpoint = %self.endpoint, failures, "connection restored");
                    return Ok(());
                }
                Err(e) if e.is_connectivity() => {
                    failures += 1;
                    if self.state == SupervisorState::Connecting {
                        error!(endpoint = %self.endpoint, error = %e, "cannot connect to registry");
                    } else {
                        warn!(endpoint = %self.endpoint, failures, error = %e, "registry still unreachable");
                    }
                    self.transition(SupervisorState::Recovering);
                    if self.retry.exhausted(failures) {
                        return Err(Exit::Fatal(ReconcileError::RetriesExhausted {
                            attempts: failures,
                            last: Box::new(e),
                        }));
                    }
                }
                Err(e) => return Err(Exit::Fatal(e)),
            }

            if pause(self.retry.interval, shutdown).await {
                return Err(Exit::Shutdown);
            }
        }
    }

    /// Best-effort crash notification.
    async fn crash(&self, error: &ReconcileError) {
        self.reconciler.notifier().send(&Alert::crashed(error)).await;
    }

    fn transition(&mut self, next: SupervisorState) {
        if self.state != next {
            debug!(from = %self.state, to = %next, "supervisor state change");
            self.state = next;
        }
    }
}

/// Sleep for `duration`. Returns `true` if shutdown was requested first.
async fn pause(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    if *shutdown.borrow() {
        return true;
    }

    let sleep = tokio::time::sleep(duration);
    tokio::pin!(sleep);

    let stopped = tokio::select! {
        _ = &mut sleep => return false,
        res = shutdown.wait_for(|stop| *stop) => res.is_ok(),
    };
    if !stopped {
        // Sender gone; nothing can request shutdown any more.
        sleep.await;
    }
    stopped
}
