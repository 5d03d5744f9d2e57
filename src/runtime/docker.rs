use super::{QueryError, RemoteQueryRunner};
use crate::config::RconSettings;
use async_trait::async_trait;
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::Docker;
use futures_util::stream::StreamExt;
use log::{debug, info, warn};
use std::collections::HashMap;

/// Maximum bytes kept from the exec output.
const MAX_OUTPUT_BYTES: usize = 64 * 1024;

const DEFAULT_RCON_HOST: &str = "127.0.0.1";
const DEFAULT_RCON_PORT: u16 = 27015;

/// Queries a game server by exec'ing its bundled rcon client inside the
/// server's container.
pub struct DockerQueryRunner {
    container_name: String,
    rcon: RconSettings,
}

/// Fully resolved remote-console invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RconTarget {
    pub server_dir: String,
    pub host: String,
    pub port: u16,
    pub password: String,
}

impl RconTarget {
    /// Explicit settings win; anything unset is taken from the container's
    /// own environment (`SERVER_DIR`, `IP`, `PORT`, `RCON_PASSWORD`).
    pub(crate) fn resolve(
        settings: &RconSettings,
        env: &HashMap<String, String>,
    ) -> Result<Self, QueryError> {
        let server_dir = settings
            .server_dir
            .clone()
            .or_else(|| env.get("SERVER_DIR").cloned())
            .ok_or(QueryError::MissingSetting("server_dir"))?;
        let password = settings
            .password
            .clone()
            .or_else(|| env.get("RCON_PASSWORD").cloned())
            .ok_or(QueryError::MissingSetting("password"))?;
        let host = settings
            .host
            .clone()
            .or_else(|| env.get("IP").cloned())
            .unwrap_or_else(|| DEFAULT_RCON_HOST.to_string());
        let port = match settings.port {
            Some(p) => p,
            None => match env.get("PORT") {
                Some(p) => p.parse().map_err(|_| QueryError::MissingSetting("port"))?,
                None => DEFAULT_RCON_PORT,
            },
        };

        Ok(Self {
            server_dir,
            host,
            port,
            password,
        })
    }

    pub(crate) fn command(&self) -> Vec<String> {
        vec![
            format!("{}/rcon", self.server_dir.trim_end_matches('/')),
            "-H".into(),
            self.host.clone(),
            "-p".into(),
            self.port.to_string(),
            "-P".into(),
            self.password.clone(),
            "status".into(),
        ]
    }
}

impl DockerQueryRunner {
    pub fn new(container_name: impl Into<String>, rcon: RconSettings) -> Self {
        Self {
            container_name: container_name.into(),
            rcon,
        }
    }

    fn connect() -> Result<Docker, QueryError> {
        // Connect to the local Docker daemon using default settings.
        Docker::connect_with_local_defaults().map_err(Into::into)
    }

    async fn container_env(&self, docker: &Docker) -> Result<HashMap<String, String>, QueryError> {
        let detail = docker
            .inspect_container(&self.container_name, None)
            .await
            .map_err(|e| match e {
                bollard::errors::Error::DockerResponseServerError {
                    status_code: 404, ..
                } => QueryError::ContainerNotFound(self.container_name.clone()),
                other => other.into(),
            })?;

        Ok(detail
            .config
            .and_then(|c| c.env)
            .map(|env| parse_env(&env))
            .unwrap_or_default())
    }
}

#[async_trait]
impl RemoteQueryRunner for DockerQueryRunner {
    async fn query_status(&self) -> Result<String, QueryError> {
        let docker = Self::connect()?;
        let env = self.container_env(&docker).await?;
        let target = RconTarget::resolve(&self.rcon, &env)?;
        debug!(
            "Querying {} via rcon at {}:{}",
            self.container_name, target.host, target.port
        );

        let exec = docker
            .create_exec(
                &self.container_name,
                CreateExecOptions {
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    cmd: Some(target.command()),
                    ..Default::default()
                },
            )
            .await?
            .id;

        let mut buf: Vec<u8> = Vec::new();
        match docker.start_exec(&exec, None).await? {
            StartExecResults::Attached { mut output, .. } => {
                while let Some(msg) = output.next().await {
                    let chunk = msg?.into_bytes();
                    let room = MAX_OUTPUT_BYTES.saturating_sub(buf.len());
                    buf.extend_from_slice(&chunk[..chunk.len().min(room)]);
                }
            }
            StartExecResults::Detached => {
                warn!("Exec in {} started detached, no output captured", self.container_name);
            }
        }
        let output = String::from_utf8_lossy(&buf).into_owned();

        let inspect = docker.inspect_exec(&exec).await?;
        let result = exec_result(inspect.exit_code, output);
        if result.is_ok() {
            info!("Status query against {} succeeded", self.container_name);
        }
        result
    }
}

/// Only an exec that reported exit code 0 yields its output.
fn exec_result(exit_code: Option<i64>, output: String) -> Result<String, QueryError> {
    match exit_code {
        Some(0) => Ok(output),
        Some(code) => Err(QueryError::CommandFailed { code, output }),
        None => Err(QueryError::Docker("exec exit code unavailable".into())),
    }
}

/// Split `KEY=value` entries; entries without `=` are skipped.
fn parse_env(entries: &[String]) -> HashMap<String, String> {
    entries
        .iter()
        .filter_map(|item| item.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
