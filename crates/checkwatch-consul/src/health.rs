//! Consul catalog and health endpoints as the health source.

use http::Method;
use serde::Deserialize;

use checkwatch_core::{
    CheckObservation, HealthResult, HealthSource, HealthState, NodeCheck, non_empty,
};

use crate::client::{ConsulClient, encode_component};

/// One entry of `/v1/health/state/:state` or `/v1/health/node/:node`.
#[derive(Debug, Deserialize)]
struct ApiCheck {
    #[serde(rename = "Node")]
    node: String,
    #[serde(rename = "CheckID")]
    check_id: String,
    #[serde(rename = "Status")]
    status: HealthState,
    #[serde(rename = "Output", default)]
    output: String,
    #[serde(rename = "ServiceName", default)]
    service_name: String,
}

/// [`HealthSource`] over Consul's catalog and health APIs.
#[derive(Debug, Clone)]
pub struct ConsulHealth {
    client: ConsulClient,
}

impl ConsulHealth {
    pub fn new(client: ConsulClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &ConsulClient {
        &self.client
    }

    async fn fetch_checks(&self, path: &str) -> HealthResult<Vec<ApiCheck>> {
        let resp = self
            .client
            .request(Method::GET, path, None)
            .await?
            .success()?;
        Ok(resp.json()?)
    }
}

fn observations(datacenter: &str, checks: Vec<ApiCheck>) -> Vec<CheckObservation> {
    checks
        .into_iter()
        .map(|c| CheckObservation {
            datacenter: datacenter.to_string(),
            node: c.node,
            check_id: c.check_id,
            service: non_empty(c.service_name),
            status: c.status,
            output: c.output,
        })
        .collect()
}

fn node_checks(checks: Vec<ApiCheck>) -> Vec<NodeCheck> {
    checks
        .into_iter()
        .map(|c| NodeCheck {
            check_id: c.check_id,
            service: non_empty(c.service_name),
            status: c.status,
            output: c.output,
        })
        .collect()
}

impl HealthSource for ConsulHealth {
    async fn list_datacenters(&self) -> HealthResult<Vec<String>> {
        let resp = self
            .client
            .request(Method::GET, "/v1/catalog/datacenters", None)
            .await?
            .success()?;
        Ok(resp.json()?)
    }

    async fn checks_for_status(
        &self,
        status: HealthState,
        datacenter: &str,
    ) -> HealthResult<Vec<CheckObservation>> {
        let path = format!(
            "/v1/health/state/{}?dc={}",
            status,
            encode_component(datacenter)
        );
        let checks = self.fetch_checks(&path).await?;
        // Every observation handed out must be in exactly `status`.
        let checks = checks.into_iter().filter(|c| c.status == status).collect();
        Ok(observations(datacenter, checks))
    }

    async fn checks_for_node(&self, datacenter: &str, node: &str) -> HealthResult<Vec<NodeCheck>> {
        let path = format!(
            "/v1/health/node/{}?dc={}",
            encode_component(node),
            encode_component(datacenter)
        );
        let checks = self.fetch_checks(&path).await?;
        Ok(node_checks(checks))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::tests::serve_once;

    const STATE_RESPONSE: &str = r#"[
        {"Node":"n1","CheckID":"svc-disk","Name":"disk","Status":"critical",
         "Notes":"","Output":"disk full","ServiceID":"","ServiceName":""},
        {"Node":"n2","CheckID":"service:web","Name":"web","Status":"critical",
         "Output":"HTTP 503","ServiceID":"web","ServiceName":"web"}
    ]"#;

    #[test]
    fn decode_state_response() {
        let checks: Vec<ApiCheck> = serde_json::from_str(STATE_RESPONSE).unwrap();
        let obs = observations("dc1", checks);

        assert_eq!(obs.len(), 2);
        assert_eq!(obs[0].datacenter, "dc1");
        assert_eq!(obs[0].check_id, "svc-disk");
        assert_eq!(obs[0].service, None);
        assert_eq!(obs[0].status, HealthState::Critical);
        assert_eq!(obs[1].service.as_deref(), Some("web"));
        assert_eq!(obs[1].output, "HTTP 503");
    }

    #[test]
    fn decode_tolerates_unknown_status_and_missing_fields() {
        let body = r#"[{"Node":"n1","CheckID":"_node_maintenance","Status":"maintenance"}]"#;
        let checks: Vec<ApiCheck> = serde_json::from_str(body).unwrap();
        let checks = node_checks(checks);

        assert_eq!(checks[0].status, HealthState::Unknown);
        assert_eq!(checks[0].output, "");
        assert_eq!(checks[0].service, None);
    }

    #[tokio::test]
    async fn checks_for_status_queries_datacenter() {
        let (addr, server) = serve_once("200 OK", STATE_RESPONSE).await;
        let health = ConsulHealth::new(ConsulClient::new(addr, None));

        let obs = health
            .checks_for_status(HealthState::Critical, "dc1")
            .await
            .unwrap();
        assert_eq!(obs.len(), 2);

        let head = server.await.unwrap();
        assert!(head.starts_with("GET /v1/health/state/critical?dc=dc1 "));
    }

    #[tokio::test]
    async fn checks_for_status_drops_other_states() {
        let body = r#"[
            {"Node":"n1","CheckID":"a","Status":"warning","Output":""},
            {"Node":"n1","CheckID":"b","Status":"critical","Output":""}
        ]"#;
        let (addr, _server) = serve_once("200 OK", body).await;
        let health = ConsulHealth::new(ConsulClient::new(addr, None));

        let obs = health
            .checks_for_status(HealthState::Warning, "dc1")
            .await
            .unwrap();
        assert_eq!(obs.len(), 1);
        assert_eq!(obs[0].check_id, "a");
    }

    #[tokio::test]
    async fn checks_for_node_encodes_node_name() {
        let (addr, server) = serve_once("200 OK", "[]").await;
        let health = ConsulHealth::new(ConsulClient::new(addr, None));

        let checks = health.checks_for_node("dc 2", "node one").await.unwrap();
        assert!(checks.is_empty());

        let head = server.await.unwrap();
        assert!(head.starts_with("GET /v1/health/node/node%20one?dc=dc%202 "));
    }

    #[tokio::test]
    async fn unreachable_agent_is_connectivity() {
        let health = ConsulHealth::new(ConsulClient::new("127.0.0.1:1", None));
        let err = health.list_datacenters().await.unwrap_err();
        assert!(err.is_connectivity());
    }
}
