//! Game-server fleet tooling.
//!
//! Keeps a durable registry of provisioned server instances and turns a
//! running server's remote-console `status` reply into a structured
//! report.  Provisioning, configuration management and the remote console
//! itself are external tools driven from here.

pub mod config;
pub mod error;
pub mod http;
pub mod inventory;
pub mod poll;
pub mod provision;
pub mod push;
pub mod registry;
pub mod runtime;
pub mod status;
pub mod types;

pub use error::{Error, Result};
pub use registry::FleetRegistry;
pub use status::extract;
pub use types::{RegistryUpdate, ServerRecord, StatusReport};
