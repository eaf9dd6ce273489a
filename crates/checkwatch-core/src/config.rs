//! checkwatch.toml configuration parser.
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! working configuration pointed at a local Consul agent and SMTP relay.
//! The daemon layers command-line overrides on top and then calls
//! [`CheckwatchConfig::validate`] once before anything starts.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::HealthState;

pub const DEFAULT_LOG_FILE: &str = "/var/log/checkwatch.log";
pub const DEFAULT_KEY_PREFIX: &str = "alert-manager";
pub const DEFAULT_CONSUL_URL: &str = "http://127.0.0.1:8500";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("no health states are monitored")]
    NoMonitoredStates,

    #[error("resolved state {0} is also monitored")]
    ResolvedIsMonitored(HealthState),

    #[error("state \"unknown\" cannot be monitored or used as the resolved state")]
    UnknownState,

    #[error("invalid key prefix {0:?}")]
    KeyPrefix(String),

    #[error("invalid consul url {0:?}: only http://host:port is supported")]
    ConsulUrl(String),

    #[error("embedded state backend needs a state_path")]
    MissingStatePath,

    #[error("invalid duration for {field}: {value:?}")]
    Duration { field: &'static str, value: String },

    #[error("{0}")]
    Value(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct CheckwatchConfig {
    /// Append-only log destination; `-` logs to stderr.
    pub log_file: PathBuf,
    pub log_format: LogFormat,
    pub smtp: SmtpConfig,
    pub consul: ConsulConfig,
    /// Sleep between reconciliation cycles, e.g. "10s".
    pub poll_interval: String,
    /// Sleep between reconnect attempts while the registry is unreachable.
    pub retry_interval: String,
    /// Give up reconnecting after this many attempts. Unbounded if unset.
    pub max_retries: Option<u32>,
    pub monitored_states: Vec<HealthState>,
    pub resolved_state: HealthState,
    /// Namespace of problem records in the state store.
    pub key_prefix: String,
    pub state_backend: StateBackend,
    /// Database file for the embedded backend.
    pub state_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub sender: String,
    pub recipient: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ConsulConfig {
    pub url: String,
    /// ACL token sent as `X-Consul-Token`.
    pub token: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StateBackend {
    /// Problem records live in the registry's own KV store.
    #[default]
    Consul,
    /// Problem records live in a local redb file.
    Embedded,
}

impl Default for CheckwatchConfig {
    fn default() -> Self {
        Self {
            log_file: PathBuf::from(DEFAULT_LOG_FILE),
            log_format: LogFormat::Text,
            smtp: SmtpConfig::default(),
            consul: ConsulConfig::default(),
            poll_interval: "10s".to_string(),
            retry_interval: "10s".to_string(),
            max_retries: None,
            monitored_states: vec![HealthState::Warning, HealthState::Critical],
            resolved_state: HealthState::Passing,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            state_backend: StateBackend::Consul,
            state_path: None,
        }
    }
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 25,
            sender: "alert-manager@localhost".to_string(),
            recipient: "example@example.com".to_string(),
        }
    }
}

impl Default for ConsulConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_CONSUL_URL.to_string(),
            token: None,
        }
    }
}

impl CheckwatchConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Check cross-field constraints. Call once after all overrides are
    /// applied; the accessors below assume a validated config.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.monitored_states.is_empty() {
            return Err(ConfigError::NoMonitoredStates);
        }
        if self.resolved_state == HealthState::Unknown
            || self.monitored_states.contains(&HealthState::Unknown)
        {
            return Err(ConfigError::UnknownState);
        }
        if self.monitored_states.contains(&self.resolved_state) {
            return Err(ConfigError::ResolvedIsMonitored(self.resolved_state));
        }
        if self.key_prefix.is_empty()
            || self.key_prefix.starts_with('/')
            || self.key_prefix.ends_with('/')
        {
            return Err(ConfigError::KeyPrefix(self.key_prefix.clone()));
        }
        self.consul_authority()?;
        if self.state_backend == StateBackend::Embedded && self.state_path.is_none() {
            return Err(ConfigError::MissingStatePath);
        }
        self.poll_interval()?;
        self.retry_interval()?;
        if self.smtp.host.is_empty() {
            return Err(ConfigError::Value("smtp host is empty".to_string()));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Result<Duration, ConfigError> {
        interval("poll_interval", &self.poll_interval)
    }

    pub fn retry_interval(&self) -> Result<Duration, ConfigError> {
        interval("retry_interval", &self.retry_interval)
    }

    /// `host:port` part of the consul url.
    pub fn consul_authority(&self) -> Result<&str, ConfigError> {
        let url = self.consul.url.trim_end_matches('/');
        match url.strip_prefix("http://") {
            Some(authority) if !authority.is_empty() && !authority.contains('/') => {
                Ok(authority)
            }
            _ => Err(ConfigError::ConsulUrl(self.consul.url.clone())),
        }
    }

    /// Whether logs go to stderr instead of a file.
    pub fn logs_to_stderr(&self) -> bool {
        self.log_file.as_os_str() == "-"
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogFormat::Text => "text",
            LogFormat::Json => "json",
        })
    }
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(ConfigError::Value(format!("unknown log format {other:?}"))),
        }
    }
}

impl fmt::Display for StateBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StateBackend::Consul => "consul",
            StateBackend::Embedded => "embedded",
        })
    }
}

impl FromStr for StateBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "consul" => Ok(StateBackend::Consul),
            "embedded" => Ok(StateBackend::Embedded),
            other => Err(ConfigError::Value(format!("unknown state backend {other:?}"))),
        }
    }
}

/// A sleep interval; must be non-zero.
fn interval(field: &'static str, value: &str) -> Result<Duration, ConfigError> {
    parse_duration(value)
        .filter(|d| !d.is_zero())
        .ok_or_else(|| ConfigError::Duration {
            field,
            value: value.to_string(),
        })
}

/// Parse a duration string like "5s", "500ms", "1m".
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(secs) = s.strip_suffix('s') {
        if let Some(ms) = secs.strip_suffix('m') {
            ms.parse::<u64>().ok().map(Duration::from_millis)
        } else {
            secs.parse::<u64>().ok().map(Duration::from_secs)
        }
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = CheckwatchConfig::default();
        config.validate().unwrap();
        assert_eq!(config.poll_interval().unwrap(), Duration::from_secs(10));
        assert_eq!(config.consul_authority().unwrap(), "127.0.0.1:8500");
        assert_eq!(
            config.monitored_states,
            vec![HealthState::Warning, HealthState::Critical]
        );
    }

    #[test]
    fn empty_file_yields_defaults() {
        let config = CheckwatchConfig::from_toml("").unwrap();
        assert_eq!(config, CheckwatchConfig::default());
    }

    #[test]
    fn parse_partial_file() {
        let toml_str = r#"
poll_interval = "30s"
monitored_states = ["critical"]
key_prefix = "ops/alerts"

[smtp]
host = "mail.internal"
recipient = "oncall@example.com"

[consul]
url = "http://consul.service:8500"
token = "secret"
"#;
        let config = CheckwatchConfig::from_toml(toml_str).unwrap();
        config.validate().unwrap();
        assert_eq!(config.poll_interval().unwrap(), Duration::from_secs(30));
        assert_eq!(config.monitored_states, vec![HealthState::Critical]);
        assert_eq!(config.smtp.host, "mail.internal");
        assert_eq!(config.smtp.port, 25);
        assert_eq!(config.smtp.sender, "alert-manager@localhost");
        assert_eq!(config.consul.token.as_deref(), Some("secret"));
        assert_eq!(config.consul_authority().unwrap(), "consul.service:8500");
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = CheckwatchConfig::from_toml("smtp_reciever = \"x\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn from_file_reads_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkwatch.toml");
        std::fs::write(&path, "retry_interval = \"2m\"\nmax_retries = 5\n").unwrap();

        let config = CheckwatchConfig::from_file(&path).unwrap();
        assert_eq!(config.retry_interval().unwrap(), Duration::from_secs(120));
        assert_eq!(config.max_retries, Some(5));

        let missing = CheckwatchConfig::from_file(&dir.path().join("nope.toml"));
        assert!(matches!(missing, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn validate_rejects_bad_state_sets() {
        let mut config = CheckwatchConfig::default();
        config.monitored_states.clear();
        assert!(matches!(config.validate(), Err(ConfigError::NoMonitoredStates)));

        let mut config = CheckwatchConfig::default();
        config.monitored_states.push(HealthState::Passing);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ResolvedIsMonitored(HealthState::Passing))
        ));

        let mut config = CheckwatchConfig::default();
        config.resolved_state = HealthState::Unknown;
        assert!(matches!(config.validate(), Err(ConfigError::UnknownState)));
    }

    #[test]
    fn validate_rejects_bad_prefix_and_url() {
        for prefix in ["", "/alerts", "alerts/"] {
            let config = CheckwatchConfig {
                key_prefix: prefix.to_string(),
                ..Default::default()
            };
            assert!(matches!(config.validate(), Err(ConfigError::KeyPrefix(_))));
        }

        for url in ["https://consul:8501", "consul:8500", "http://", "http://host/path"] {
            let mut config = CheckwatchConfig::default();
            config.consul.url = url.to_string();
            assert!(
                matches!(config.validate(), Err(ConfigError::ConsulUrl(_))),
                "{url} should be rejected"
            );
        }
    }

    #[test]
    fn validate_embedded_needs_path() {
        let mut config = CheckwatchConfig {
            state_backend: StateBackend::Embedded,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::MissingStatePath)));

        config.state_path = Some(PathBuf::from("/var/lib/checkwatch/state.redb"));
        config.validate().unwrap();
    }

    #[test]
    fn validate_rejects_bad_duration() {
        let config = CheckwatchConfig {
            poll_interval: "soon".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Duration { field: "poll_interval", .. })
        ));
    }

    #[test]
    fn validate_rejects_zero_intervals() {
        let config = CheckwatchConfig {
            poll_interval: "0s".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Duration { field: "poll_interval", .. })
        ));

        let config = CheckwatchConfig {
            retry_interval: "0".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Duration { field: "retry_interval", .. })
        ));

        let config = CheckwatchConfig {
            poll_interval: "0ms".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn stderr_log_target() {
        let mut config = CheckwatchConfig::default();
        assert!(!config.logs_to_stderr());
        config.log_file = PathBuf::from("-");
        assert!(config.logs_to_stderr());
    }

    #[test]
    fn parse_duration_units() {
        assert_eq!(parse_duration("5s"), Some(Duration::from_secs(5)));
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("2m"), Some(Duration::from_secs(120)));
        assert_eq!(parse_duration("10"), Some(Duration::from_secs(10)));
        assert_eq!(parse_duration("ten"), None);
    }

    #[test]
    fn parse_duration_overflow_is_rejected() {
        assert_eq!(parse_duration("307445734561825861m"), None);

        let config = CheckwatchConfig {
            poll_interval: "307445734561825861m".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Duration { field: "poll_interval", .. })
        ));
    }

    #[test]
    fn enum_labels_parse() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("embedded".parse::<StateBackend>().unwrap(), StateBackend::Embedded);
        assert!("yaml".parse::<LogFormat>().is_err());
    }
}
