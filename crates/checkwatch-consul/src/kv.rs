//! Consul KV as the problem record store.

use http::{Method, StatusCode};

use checkwatch_state::{KvStore, StateResult};

use crate::client::{ConsulClient, ConsulError, encode_path};

/// [`KvStore`] over Consul's `/v1/kv` endpoints.
///
/// Writes use `cas=0`, which Consul only applies when the key does not
/// exist yet, so create-if-absent holds even against other writers.
#[derive(Debug, Clone)]
pub struct ConsulKv {
    client: ConsulClient,
}

impl ConsulKv {
    pub fn new(client: ConsulClient) -> Self {
        Self { client }
    }
}

/// Consul answers writes and deletes with a bare `true` or `false`.
fn parse_bool(body: &str) -> Result<bool, ConsulError> {
    match body.trim() {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(ConsulError::Decode(format!("expected true/false, got {other:?}"))),
    }
}

impl KvStore for ConsulKv {
    async fn get(&self, key: &str) -> StateResult<Option<String>> {
        let path = format!("/v1/kv/{}?raw", encode_path(key));
        let resp = self.client.request(Method::GET, &path, None).await?;
        if resp.status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(resp.success()?.text()))
    }

    async fn put(&self, key: &str, value: &str) -> StateResult<bool> {
        let path = format!("/v1/kv/{}?cas=0", encode_path(key));
        let resp = self
            .client
            .request(Method::PUT, &path, Some(value.to_string()))
            .await?
            .success()?;
        Ok(parse_bool(&resp.text())?)
    }

    async fn delete(&self, key: &str, recursive: bool) -> StateResult<bool> {
        let mut path = format!("/v1/kv/{}", encode_path(key));
        if recursive {
            path.push_str("?recurse");
        }
        let resp = self
            .client
            .request(Method::DELETE, &path, None)
            .await?
            .success()?;
        Ok(parse_bool(&resp.text())?)
    }

    async fn list_keys(&self, prefix: &str) -> StateResult<Vec<String>> {
        let path = format!("/v1/kv/{}?keys", encode_path(prefix));
        let resp = self.client.request(Method::GET, &path, None).await?;
        if resp.status == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        let mut keys: Vec<String> = resp.success()?.json()?;
        keys.sort();
        Ok(keys)
    }
}
