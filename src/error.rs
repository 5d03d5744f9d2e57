use std::path::PathBuf;

use crate::runtime::QueryError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("{0} is not installed or not found in PATH")]
    MissingDependency(String),

    #[error("{step} failed with exit code {code}")]
    Provisioning { step: String, code: i32 },

    #[error("{step} produced unusable output: {detail}")]
    ProvisioningOutput { step: String, detail: String },

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error("registry file {} is corrupt: {source}", .path.display())]
    RegistryCorrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize registry: {0}")]
    RegistryEncode(#[source] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
