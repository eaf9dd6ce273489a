//! Minimal Consul HTTP transport.
//!
//! Each request opens a fresh TCP connection to the agent, performs an
//! HTTP/1.1 handshake with hyper, and collects the whole response body.
//! Connections are never reused.

use std::fmt;

use bytes::Bytes;
use http::{Method, Request, StatusCode};
use http_body_util::{BodyExt, Full};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use thiserror::Error;
use tracing::debug;

use checkwatch_core::{CheckwatchConfig, ConfigError, HealthError};
use checkwatch_state::StateError;

/// Characters left as-is in a path segment or query value.
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b':');

/// Errors from talking to the Consul agent.
#[derive(Debug, Error)]
pub enum ConsulError {
    /// TCP connect, handshake or transfer failed.
    #[error("connection to consul at {addr} failed: {reason}")]
    Connect { addr: String, reason: String },

    #[error("consul returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode consul response: {0}")]
    Decode(String),

    #[error("failed to build request: {0}")]
    Request(String),
}

impl From<ConsulError> for StateError {
    fn from(e: ConsulError) -> Self {
        match e {
            ConsulError::Connect { .. } => StateError::Unavailable(e.to_string()),
            ConsulError::Status { status, body } => StateError::Status { status, body },
            ConsulError::Decode(msg) => StateError::Decode(msg),
            ConsulError::Request(msg) => StateError::Write(msg),
        }
    }
}

impl From<ConsulError> for HealthError {
    fn from(e: ConsulError) -> Self {
        match e {
            ConsulError::Connect { .. } => HealthError::Unavailable(e.to_string()),
            ConsulError::Status { status, body } => HealthError::Status { status, body },
            ConsulError::Decode(msg) => HealthError::Decode(msg),
            ConsulError::Request(msg) => HealthError::Request(msg),
        }
    }
}

/// A buffered response from the agent.
#[derive(Debug)]
pub struct ConsulResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

impl ConsulResponse {
    /// Fail on any non-2xx status.
    pub fn success(self) -> Result<Self, ConsulError> {
        if self.status.is_success() {
            Ok(self)
        } else {
            Err(self.into_status_error())
        }
    }

    pub fn into_status_error(self) -> ConsulError {
        ConsulError::Status {
            status: self.status.as_u16(),
            body: String::from_utf8_lossy(&self.body).trim().to_string(),
        }
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, ConsulError> {
        serde_json::from_slice(&self.body).map_err(|e| ConsulError::Decode(e.to_string()))
    }
}

/// Connection details for one Consul agent. Cheap to clone.
#[derive(Clone)]
pub struct ConsulClient {
    /// `host:port` of the agent's HTTP API.
    authority: String,
    token: Option<String>,
}

impl fmt::Debug for ConsulClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsulClient")
            .field("authority", &self.authority)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl ConsulClient {
    pub fn new(authority: impl Into<String>, token: Option<String>) -> Self {
        Self {
            authority: authority.into(),
            token,
        }
    }

    pub fn from_config(config: &CheckwatchConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(config.consul_authority()?, config.consul.token.clone()))
    }

    /// `http://host:port`, for log lines.
    pub fn endpoint(&self) -> String {
        format!("http://{}", self.authority)
    }

    /// Send one request and buffer the response.
    ///
    /// Non-2xx statuses are returned as-is; callers decide which of them
    /// are meaningful (404 on a KV read means "absent").
    pub async fn request(
        &self,
        method: Method,
        path_and_query: &str,
        body: Option<String>,
    ) -> Result<ConsulResponse, ConsulError> {
        let connect_err = |reason: String| ConsulError::Connect {
            addr: self.authority.clone(),
            reason,
        };

        let stream = tokio::net::TcpStream::connect(&self.authority)
            .await
            .map_err(|e| connect_err(e.to_string()))?;

        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| connect_err(e.to_string()))?;

        // Drive the connection in the background.
        tokio::spawn(async move {
            let _ = conn.await;
        });

        let mut builder = Request::builder()
            .method(method.clone())
            .uri(path_and_query)
            .header("host", self.authority.as_str())
            .header("user-agent", "checkwatch/0.1");
        if let Some(token) = &self.token {
            builder = builder.header("x-consul-token", token.as_str());
        }
        let req = builder
            .body(Full::new(Bytes::from(body.unwrap_or_default())))
            .map_err(|e| ConsulError::Request(e.to_string()))?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| connect_err(e.to_string()))?;
        let status = resp.status();
        let body = resp
            .into_body()
            .collect()
            .await
            .map_err(|e| connect_err(e.to_string()))?
            .to_bytes();

        debug!(%method, path = %path_and_query, %status, "consul request");
        Ok(ConsulResponse { status, body })
    }
}

/// Percent-encode each '/'-separated segment of `path`, keeping the slashes.
pub fn encode_path(path: &str) -> String {
    path.split('/')
        .map(encode_component)
        .collect::<Vec<_>>()
        .join("/")
}

/// Percent-encode a single path segment or query value.
pub fn encode_component(value: &str) -> String {
    utf8_percent_encode(value, SEGMENT).to_string()
}
