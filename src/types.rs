//! Data structures shared across the fleet tooling.
//!
//! These types are serialised using [`serde`](https://serde.rs/) and
//! travel between the registry file, the HTTP status service and the
//! command line.  They describe which server instances exist and what a
//! running server last reported about itself.

use serde::{Deserialize, Serialize};

/// One provisioned server instance as recorded in the fleet registry.
///
/// `instance_id` is assigned by the provisioning engine and never changes;
/// everything else is replaced wholesale whenever the same instance is
/// registered again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerRecord {
    pub instance_id: String,
    pub public_ip: String,
    pub public_dns: String,
    /// Operator-facing label, e.g. `surf_01`.
    #[serde(default, rename = "name", skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Hostname the game server advertises in its browser entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_hostname: Option<String>,
}

impl ServerRecord {
    pub fn new(
        instance_id: impl Into<String>,
        public_ip: impl Into<String>,
        public_dns: impl Into<String>,
    ) -> Self {
        Self {
            instance_id: instance_id.into(),
            public_ip: public_ip.into(),
            public_dns: public_dns.into(),
            display_name: None,
            server_hostname: None,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_server_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.server_hostname = Some(hostname.into());
        self
    }
}

/// Live status scraped from a remote-console `status` reply.
///
/// Every field is independently optional: a field the server did not
/// print (or printed in an unexpected shape) is simply `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub public_ip: Option<String>,
    pub map: Option<String>,
    #[serde(rename = "players", alias = "human_players")]
    pub human_players: Option<u32>,
    pub max_players: Option<u32>,
    pub hostname: Option<String>,
}

/// A mutation applied to the fleet registry.
///
/// Provisioning produces `Upsert`s as instances come up; destroying an
/// instance produces a `Remove`.  Re-applying the same update leaves the
/// registry unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistryUpdate {
    /// An instance was created or its addresses changed.
    Upsert(ServerRecord),
    /// An instance was destroyed.  Only the identifier is needed.
    Remove { instance_id: String },
}
