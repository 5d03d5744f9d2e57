use std::time::Duration;

use async_trait::async_trait;

pub mod docker;
pub use docker::DockerQueryRunner;

/// Failure to obtain a status reply.  Distinct from an extraction miss,
/// which is not an error at all.
#[derive(Debug, Clone, thiserror::Error)]
pub enum QueryError {
    #[error("container {0} not found")]
    ContainerNotFound(String),

    #[error("docker api error: {0}")]
    Docker(String),

    #[error("remote console setting `{0}` is not configured")]
    MissingSetting(&'static str),

    #[error("remote console command failed with exit code {code}: {output}")]
    CommandFailed { code: i64, output: String },

    #[error("status query timed out after {0:?}")]
    Timeout(Duration),

    #[error("status request failed: {0}")]
    Http(String),
}

impl From<bollard::errors::Error> for QueryError {
    fn from(e: bollard::errors::Error) -> Self {
        QueryError::Docker(e.to_string())
    }
}

impl From<reqwest::Error> for QueryError {
    fn from(e: reqwest::Error) -> Self {
        QueryError::Http(e.to_string())
    }
}

#[async_trait]
pub trait RemoteQueryRunner: Send + Sync {
    /// Issue one remote-console `status` command and return the raw reply.
    async fn query_status(&self) -> Result<String, QueryError>;
}
