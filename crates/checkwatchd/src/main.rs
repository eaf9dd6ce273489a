//! checkwatchd — the checkwatch daemon.
//!
//! Watches Consul health checks across every datacenter and mails an alert
//! when a check enters a monitored state and again when it recovers.
//! Already-alerted problems are remembered as KV records, so restarts do
//! not re-alert.
//!
//! # Usage
//!
//! ```text
//! checkwatchd --config /etc/checkwatch.toml run    # stops on Ctrl-C or SIGTERM
//! checkwatchd --log-file - once
//! checkwatchd records
//! ```
//!
//! Exit status: 0 on clean shutdown, 1 on startup failure, 70 when the
//! poll loop dies on an unrecoverable error.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tokio::sync::watch;
use tracing::{error, info};

use checkwatch_consul::{ConsulClient, ConsulHealth, ConsulKv};
use checkwatch_core::{CheckwatchConfig, HealthState, LogFormat, StateBackend};
use checkwatch_notify::SmtpNotifier;
use checkwatch_reconcile::{Exit, ReconcileSettings, Reconciler, RetryPolicy, Supervisor};
use checkwatch_state::{EmbeddedStore, KvStore};

mod logging;

/// `EX_SOFTWARE` from sysexits.h.
const EX_SOFTWARE: u8 = 70;

#[derive(Parser)]
#[command(
    name = "checkwatchd",
    about = "Alert on Consul health check problems",
    version,
    propagate_version = true
)]
struct Cli {
    /// TOML config file. Flags override values from it.
    #[arg(short, long, global = true, env = "CHECKWATCH_CONFIG")]
    config: Option<PathBuf>,

    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Run the poll loop until interrupted (default).
    Run,
    /// Run a single reconciliation cycle and print its report as JSON.
    Once,
    /// Print the stored problem records as JSON.
    Records,
}

#[derive(Args, Debug, Default)]
struct Overrides {
    /// Log destination; `-` for stderr.
    #[arg(long, global = true, env = "CHECKWATCH_LOG_FILE")]
    log_file: Option<PathBuf>,

    /// Log format: text or json.
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,

    #[arg(long, global = true, env = "CHECKWATCH_SMTP_HOST")]
    smtp_host: Option<String>,

    #[arg(long, global = true)]
    smtp_port: Option<u16>,

    #[arg(long, global = true)]
    smtp_sender: Option<String>,

    #[arg(long, global = true)]
    smtp_recipient: Option<String>,

    /// Consul agent, e.g. http://127.0.0.1:8500.
    #[arg(long, global = true, env = "CHECKWATCH_CONSUL_URL")]
    consul_url: Option<String>,

    #[arg(long, global = true, env = "CONSUL_HTTP_TOKEN", hide_env_values = true)]
    consul_token: Option<String>,

    /// Sleep between cycles, e.g. 10s.
    #[arg(long, global = true)]
    poll_interval: Option<String>,

    /// Sleep between reconnect attempts.
    #[arg(long, global = true)]
    retry_interval: Option<String>,

    /// Give up after this many reconnect attempts.
    #[arg(long, global = true)]
    max_retries: Option<u32>,

    /// Health state that raises a problem. Repeat for several.
    #[arg(long = "monitor", value_name = "STATE", global = true)]
    monitor: Vec<HealthState>,

    /// Health state that resolves a problem.
    #[arg(long, global = true)]
    resolved_state: Option<HealthState>,

    /// Namespace of problem records in the store.
    #[arg(long, global = true)]
    key_prefix: Option<String>,

    /// Where problem records live: consul or embedded.
    #[arg(long, global = true)]
    state_backend: Option<StateBackend>,

    /// Database file for the embedded backend.
    #[arg(long, global = true)]
    state_path: Option<PathBuf>,
}

impl Overrides {
    fn apply(self, config: &mut CheckwatchConfig) {
        if let Some(v) = self.log_file {
            config.log_file = v;
        }
        if let Some(v) = self.log_format {
            config.log_format = v;
        }
        if let Some(v) = self.smtp_host {
            config.smtp.host = v;
        }
        if let Some(v) = self.smtp_port {
            config.smtp.port = v;
        }
        if let Some(v) = self.smtp_sender {
            config.smtp.sender = v;
        }
        if let Some(v) = self.smtp_recipient {
            config.smtp.recipient = v;
        }
        if let Some(v) = self.consul_url {
            config.consul.url = v;
        }
        if let Some(v) = self.consul_token {
            config.consul.token = Some(v);
        }
        if let Some(v) = self.poll_interval {
            config.poll_interval = v;
        }
        if let Some(v) = self.retry_interval {
            config.retry_interval = v;
        }
        if let Some(v) = self.max_retries {
            config.max_retries = Some(v);
        }
        if !self.monitor.is_empty() {
            config.monitored_states = self.monitor;
        }
        if let Some(v) = self.resolved_state {
            config.resolved_state = v;
        }
        if let Some(v) = self.key_prefix {
            config.key_prefix = v;
        }
        if let Some(v) = self.state_backend {
            config.state_backend = v;
        }
        if let Some(v) = self.state_path {
            config.state_path = Some(v);
        }
    }
}

/// Defaults, then the config file, then flags and environment.
fn load_config(cli: Cli) -> anyhow::Result<(CheckwatchConfig, Command)> {
    let mut config = match &cli.config {
        Some(path) => CheckwatchConfig::from_file(path)?,
        None => CheckwatchConfig::default(),
    };
    cli.overrides.apply(&mut config);
    config.validate()?;
    Ok((config, cli.command.unwrap_or(Command::Run)))
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let (config, command) = load_config(Cli::parse())?;
    logging::init(&config)?;

    let client = ConsulClient::from_config(&config)?;
    let health = ConsulHealth::new(client.clone());
    let notifier = SmtpNotifier::new(&config.smtp)?;
    let settings = ReconcileSettings::from_config(&config);

    match config.state_backend {
        StateBackend::Consul => {
            let reconciler = Reconciler::new(ConsulKv::new(client), health, notifier, settings);
            execute(command, &config, reconciler).await
        }
        StateBackend::Embedded => {
            let path = config
                .state_path
                .as_deref()
                .context("embedded state backend needs a state_path")?;
            let store = EmbeddedStore::open(path)?;
            let reconciler = Reconciler::new(store, health, notifier, settings);
            execute(command, &config, reconciler).await
        }
    }
}

async fn execute<S: KvStore>(
    command: Command,
    config: &CheckwatchConfig,
    reconciler: Reconciler<S, ConsulHealth, SmtpNotifier>,
) -> anyhow::Result<ExitCode> {
    let endpoint = reconciler.health().client().endpoint();

    match command {
        Command::Run => {
            let retry = RetryPolicy {
                interval: config.retry_interval()?,
                max_attempts: config.max_retries,
            };
            let mut supervisor =
                Supervisor::new(reconciler, config.poll_interval()?, retry).with_endpoint(&endpoint);

            info!(
                version = env!("CARGO_PKG_VERSION"),
                %endpoint,
                backend = %config.state_backend,
                key_prefix = %config.key_prefix,
                "checkwatch starting"
            );

            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            let signal = shutdown_signal().context("failed to install signal handlers")?;
            tokio::spawn(async move {
                signal.await;
                info!("shutdown signal received");
                let _ = shutdown_tx.send(true);
            });

            match supervisor.run(shutdown_rx).await {
                Exit::Shutdown => {
                    info!("checkwatch stopped");
                    Ok(ExitCode::SUCCESS)
                }
                Exit::Fatal(_) => Ok(ExitCode::from(EX_SOFTWARE)),
            }
        }
        Command::Once => match reconciler.run_cycle().await {
            Ok(report) => {
                println!("{}", serde_json::to_string_pretty(&report)?);
                Ok(ExitCode::SUCCESS)
            }
            Err(e) => {
                error!(%endpoint, error = %e, "reconciliation cycle failed");
                eprintln!("checkwatchd: {e}");
                Ok(ExitCode::from(EX_SOFTWARE))
            }
        },
        Command::Records => {
            let records = reconciler.list_records().await?;
            println!("{}", serde_json::to_string_pretty(&records)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Resolves on Ctrl-C, or SIGTERM on unix. Handlers are installed before
/// this returns.
#[cfg(unix)]
fn shutdown_signal() -> std::io::Result<impl Future<Output = ()>> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = signal(SignalKind::terminate())?;
    Ok(async move {
        tokio::select! {
            Ok(()) = tokio::signal::ctrl_c() => {}
            _ = terminate.recv() => {}
        }
    })
}

#[cfg(not(unix))]
fn shutdown_signal() -> std::io::Result<impl Future<Output = ()>> {
    Ok(async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    })
}
