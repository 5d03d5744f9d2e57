use figment::{
    providers::{Env, Format, Json, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Remote-console connection settings.  Unset values fall back to the
/// game container's own environment at query time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct RconSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_dir: Option<String>,
}

/// One instance the provisioning engine creates.  Its outputs are named
/// `<output_prefix>_id`, `<output_prefix>_public_ip` and
/// `<output_prefix>_public_dns`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ServerTarget {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_prefix: Option<String>,
    /// Resource address used to destroy just this instance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_hostname: Option<String>,
}

impl ServerTarget {
    pub fn output_prefix(&self) -> &str {
        self.output_prefix.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub registry_path: PathBuf,
    pub inventory_path: PathBuf,
    pub terraform_dir: PathBuf,
    pub tfvars_path: PathBuf,
    pub playbook_path: PathBuf,
    pub remote_user: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssh_private_key_path: Option<PathBuf>,
    pub container_name: String,
    pub rcon: RconSettings,
    pub http_bind: SocketAddr,
    pub status_port: u16,
    pub query_timeout_secs: u64,
    pub settle_delay_secs: u64,
    pub servers: Vec<ServerTarget>,
    /// Base URL of the public site that receives `push`ed registry entries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cli_auth_key: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            registry_path: "current-servers.json".into(),
            inventory_path: "inventory.ini".into(),
            terraform_dir: ".".into(),
            tfvars_path: "fleet.tfvars".into(),
            playbook_path: "server_playbook.yml".into(),
            remote_user: "ec2-user".into(),
            ssh_private_key_path: None,
            container_name: "tf2-dedicated".into(),
            rcon: RconSettings::default(),
            http_bind: SocketAddr::from(([0, 0, 0, 0], 8000)),
            status_port: 8000,
            query_timeout_secs: 10,
            settle_delay_secs: 5,
            servers: Vec::new(),
            site_url: None,
            cli_auth_key: None,
        }
    }
}

impl Config {
    /// Load from `srvfleet.toml`, `srvfleet.json` and `SRVFLEET_*`
    /// variables, in increasing precedence.
    pub fn load() -> anyhow::Result<Self> {
        // Operators keep credentials in a .env next to the terraform files.
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                return Err(anyhow::anyhow!("Failed to read .env: {}", e));
            }
        }
        Self::from_figment(Self::figment())
    }

    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file("srvfleet.toml"))
            .merge(Json::file("srvfleet.json"))
            .merge(Env::prefixed("SRVFLEET_").split("__"))
    }

    pub fn from_figment(figment: Figment) -> anyhow::Result<Self> {
        let mut config: Config = figment
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

        // Support Docker-style secrets
        if let Ok(secret_file) = std::env::var("SRVFLEET_RCON_PASSWORD_FILE") {
            config.rcon.password = Some(std::fs::read_to_string(secret_file)?.trim().to_string());
        }
        if let Ok(secret_file) = std::env::var("SRVFLEET_CLI_AUTH_KEY_FILE") {
            config.cli_auth_key = Some(std::fs::read_to_string(secret_file)?.trim().to_string());
        }

        Ok(config)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.settle_delay_secs)
    }

    pub fn require_ssh_key(&self) -> Result<&Path> {
        self.ssh_private_key_path
            .as_deref()
            .ok_or_else(|| Error::Config("ssh_private_key_path is not set".into()))
    }

    pub fn require_rcon_password(&self) -> Result<&str> {
        self.rcon
            .password
            .as_deref()
            .ok_or_else(|| Error::Config("rcon.password is not set".into()))
    }

    pub fn require_servers(&self) -> Result<&[ServerTarget]> {
        if self.servers.is_empty() {
            return Err(Error::Config("no servers are configured".into()));
        }
        Ok(&self.servers)
    }

    pub fn require_site(&self) -> Result<(&str, &str)> {
        let url = self
            .site_url
            .as_deref()
            .ok_or_else(|| Error::Config("site_url is not set".into()))?;
        let key = self
            .cli_auth_key
            .as_deref()
            .ok_or_else(|| Error::Config("cli_auth_key is not set".into()))?;
        Ok((url, key))
    }

    /// Target whose name matches a registry record's display name.
    pub fn target_named(&self, name: &str) -> Option<&ServerTarget> {
        self.servers.iter().find(|t| t.name == name)
    }
}
