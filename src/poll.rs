//! Fleet-wide status polling.
//!
//! Walks the registry and asks each host's status service for its current
//! report.  One unreachable host does not stop the others from being
//! polled; its error is returned alongside the successful reports.

use std::time::Duration;

use log::{info, warn};
use reqwest::Client;

use crate::error::Result;
use crate::registry::FleetRegistry;
use crate::runtime::QueryError;
use crate::types::{ServerRecord, StatusReport};

/// Outcome of polling one registered server.
#[derive(Debug)]
pub struct PollResult {
    pub server: ServerRecord,
    pub status: std::result::Result<StatusReport, QueryError>,
}

pub struct StatusPoller {
    client: Client,
    port: u16,
    timeout: Duration,
}

impl StatusPoller {
    pub fn new(port: u16, timeout: Duration) -> std::result::Result<Self, QueryError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            port,
            timeout,
        })
    }

    pub fn status_url(&self, host: &str) -> String {
        format!("http://{}:{}/server-info", host, self.port)
    }

    /// Fetch one server's report from its status service.
    pub async fn fetch(&self, host: &str) -> std::result::Result<StatusReport, QueryError> {
        let resp = self.client.get(self.status_url(host)).send().await.map_err(|e| {
            if e.is_timeout() {
                QueryError::Timeout(self.timeout)
            } else {
                e.into()
            }
        })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(QueryError::Http(format!("{} returned {}: {}", host, status, body)));
        }
        Ok(resp.json::<StatusReport>().await?)
    }

    /// Poll every server in the registry, in registry order.
    pub async fn poll_fleet(&self, registry: &FleetRegistry) -> Result<Vec<PollResult>> {
        let servers = registry.list()?;
        info!("Polling {} server(s)", servers.len());

        let mut results = Vec::with_capacity(servers.len());
        for server in servers {
            let status = self.fetch(&server.public_ip).await;
            if let Err(e) = &status {
                warn!("Failed to poll {}: {}", server.instance_id, e);
            }
            results.push(PollResult { server, status });
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{router, AppState};
    use crate::runtime::RemoteQueryRunner;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct Canned(&'static str);

    #[async_trait]
    impl RemoteQueryRunner for Canned {
        async fn query_status(&self) -> std::result::Result<String, QueryError> {
            Ok(self.0.to_string())
        }
    }

    async fn spawn_status_service(raw: &'static str, dir: &tempfile::TempDir) -> u16 {
        let state = AppState {
            runner: Arc::new(Canned(raw)),
            registry: FleetRegistry::open(dir.path().join("unused.json")),
            query_timeout: Duration::from_secs(1),
        };
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, router(state)).await.unwrap();
        });
        port
    }

    #[test]
    fn builds_status_url() {
        let poller = StatusPoller::new(8000, Duration::from_secs(1)).unwrap();
        assert_eq!(
            poller.status_url("203.0.113.5"),
            "http://203.0.113.5:8000/server-info"
        );
    }

    #[tokio::test]
    async fn polls_each_registered_server() {
        let dir = tempfile::TempDir::new().unwrap();
        let port = spawn_status_service(
            "hostname: surf 24/7\nmap : surf_kitsune\nplayers : 5 humans, 0 bots (32 max)\n",
            &dir,
        )
        .await;

        let registry = FleetRegistry::open(dir.path().join("servers.json"));
        registry
            .upsert(ServerRecord::new("i-001", "127.0.0.1", "localhost"))
            .unwrap();

        let poller = StatusPoller::new(port, Duration::from_secs(2)).unwrap();
        let results = poller.poll_fleet(&registry).await.unwrap();

        assert_eq!(results.len(), 1);
        let report = results[0].status.as_ref().unwrap();
        assert_eq!(report.map.as_deref(), Some("surf_kitsune"));
        assert_eq!(report.human_players, Some(5));
        assert_eq!(report.max_players, Some(32));
        assert_eq!(report.hostname.as_deref(), Some("surf 24/7"));
    }

    #[tokio::test]
    async fn unreachable_server_does_not_stop_the_poll() {
        let dir = tempfile::TempDir::new().unwrap();
        let port = spawn_status_service("map : jump_beef\n", &dir).await;

        let registry = FleetRegistry::open(dir.path().join("servers.json"));
        registry
            .upsert(ServerRecord::new("i-001", "127.0.0.1", "localhost"))
            .unwrap();
        // TEST-NET-1 is never routable.
        registry
            .upsert(ServerRecord::new("i-002", "192.0.2.1", "nowhere.example"))
            .unwrap();

        let poller = StatusPoller::new(port, Duration::from_millis(300)).unwrap();
        let results = poller.poll_fleet(&registry).await.unwrap();

        assert_eq!(results.len(), 2);
        assert!(results[0].status.is_ok());
        assert!(results[1].status.is_err());
    }
}
