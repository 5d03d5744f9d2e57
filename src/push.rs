//! Publishing the registry to the public site.
//!
//! Each record is POSTed to `{site_url}/api/current-servers`, authorised
//! with the shared CLI key.  A rejected record is logged and skipped.

use std::time::Duration;

use log::{info, warn};
use reqwest::Client;
use serde_json::json;

use crate::error::Result;
use crate::registry::FleetRegistry;
use crate::runtime::QueryError;
use crate::types::ServerRecord;

/// Outcome of publishing one registered server.
#[derive(Debug)]
pub struct PushResult {
    pub server: ServerRecord,
    pub outcome: std::result::Result<(), QueryError>,
}

pub struct SitePublisher {
    client: Client,
    endpoint: String,
    auth_key: String,
}

impl SitePublisher {
    /// Surrounding double quotes on `auth_key` are dropped, as `.env`
    /// files often carry them.
    pub fn new(
        site_url: &str,
        auth_key: &str,
        timeout: Duration,
    ) -> std::result::Result<Self, QueryError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/api/current-servers", site_url.trim_end_matches('/')),
            auth_key: auth_key.trim_matches('"').to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// POST one record. Absent optional fields are sent as `null`.
    pub async fn push(&self, server: &ServerRecord) -> std::result::Result<(), QueryError> {
        let payload = json!({
            "instance_id": server.instance_id,
            "public_ip": server.public_ip,
            "public_dns": server.public_dns,
            "name": server.display_name,
            "server_hostname": server.server_hostname,
        });

        let resp = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::AUTHORIZATION, &self.auth_key)
            .json(&payload)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(QueryError::Http(format!(
                "{} returned {}: {}",
                self.endpoint, status, body
            )));
        }
        Ok(())
    }

    /// Publish every server in the registry, in registry order.
    pub async fn push_all(&self, registry: &FleetRegistry) -> Result<Vec<PushResult>> {
        let servers = registry.list()?;
        info!("Publishing {} server(s) to {}", servers.len(), self.endpoint);

        let mut results = Vec::with_capacity(servers.len());
        for server in servers {
            let outcome = self.push(&server).await;
            match &outcome {
                Ok(()) => info!("Posted server {}", server.instance_id),
                Err(e) => warn!("Failed to post server {}: {}", server.instance_id, e),
            }
            results.push(PushResult { server, outcome });
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::Value;
    use std::sync::{Arc, Mutex};

    type Received = Arc<Mutex<Vec<Value>>>;

    async fn current_servers(
        State(received): State<Received>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> StatusCode {
        if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some("k-123") {
            return StatusCode::UNAUTHORIZED;
        }
        let rejected = body["instance_id"] == "i-bad";
        received.lock().unwrap().push(body);
        if rejected {
            StatusCode::INTERNAL_SERVER_ERROR
        } else {
            StatusCode::CREATED
        }
    }

    async fn spawn_site() -> (String, Received) {
        let received = Received::default();
        let app = Router::new()
            .route("/api/current-servers", post(current_servers))
            .with_state(received.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}/", addr), received)
    }

    #[test]
    fn endpoint_joins_site_url() {
        let publisher =
            SitePublisher::new("https://fleet.example/", "k", Duration::from_secs(1)).unwrap();
        assert_eq!(
            publisher.endpoint(),
            "https://fleet.example/api/current-servers"
        );
    }

    #[tokio::test]
    async fn rejected_record_does_not_stop_the_push() {
        let dir = tempfile::TempDir::new().unwrap();
        let (site, received) = spawn_site().await;

        let registry = FleetRegistry::open(dir.path().join("servers.json"));
        registry
            .upsert(ServerRecord::new("i-001", "203.0.113.5", "a.example").with_display_name("jump_01"))
            .unwrap();
        registry
            .upsert(ServerRecord::new("i-bad", "203.0.113.6", "b.example"))
            .unwrap();
        registry
            .upsert(
                ServerRecord::new("i-zzz", "203.0.113.7", "c.example")
                    .with_server_hostname("surf 24/7"),
            )
            .unwrap();

        let publisher = SitePublisher::new(&site, "\"k-123\"", Duration::from_secs(2)).unwrap();
        let results = publisher.push_all(&registry).await.unwrap();

        let outcomes: Vec<_> = results
            .iter()
            .map(|r| (r.server.instance_id.as_str(), r.outcome.is_ok()))
            .collect();
        assert_eq!(outcomes, [("i-001", true), ("i-bad", false), ("i-zzz", true)]);

        let received = received.lock().unwrap();
        assert_eq!(received.len(), 3);
        assert_eq!(
            received[0],
            json!({
                "instance_id": "i-001",
                "public_ip": "203.0.113.5",
                "public_dns": "a.example",
                "name": "jump_01",
                "server_hostname": null
            })
        );
        assert_eq!(received[2]["server_hostname"], "surf 24/7");
    }

    #[tokio::test]
    async fn wrong_key_is_an_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let (site, received) = spawn_site().await;

        let registry = FleetRegistry::open(dir.path().join("servers.json"));
        registry
            .upsert(ServerRecord::new("i-001", "203.0.113.5", "a.example"))
            .unwrap();

        let publisher = SitePublisher::new(&site, "nope", Duration::from_secs(2)).unwrap();
        let results = publisher.push_all(&registry).await.unwrap();

        let err = results[0].outcome.as_ref().unwrap_err();
        assert!(err.to_string().contains("401"));
        assert!(received.lock().unwrap().is_empty());
    }
}
