//! Tracing setup.

use std::fs::OpenOptions;
use std::sync::Mutex;

use anyhow::Context;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

use checkwatch_core::{CheckwatchConfig, LogFormat};

const DEFAULT_FILTER: &str = "info,checkwatch=debug";

/// Install the global subscriber. Logs are appended to the configured
/// file, or written to stderr when it is `-`. `RUST_LOG` overrides the
/// default filter.
pub fn init(config: &CheckwatchConfig) -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let to_stderr = config.logs_to_stderr();
    let writer = if to_stderr {
        BoxMakeWriter::new(std::io::stderr)
    } else {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.log_file)
            .with_context(|| format!("cannot open log file {}", config.log_file.display()))?;
        BoxMakeWriter::new(Mutex::new(file))
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(to_stderr);

    match config.log_format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    }
    .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))
}
