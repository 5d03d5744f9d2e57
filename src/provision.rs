//! Provisioning engine adapter.
//!
//! Infrastructure is created and destroyed by terraform; this module only
//! drives the CLI and reads back its declared outputs.  Each instance named
//! in the configuration is written to the registry as soon as its outputs
//! are read, so a failure part-way through leaves the instances that did
//! come up listable.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::{info, warn};
use tokio::process::Command;

use crate::config::ServerTarget;
use crate::error::{Error, Result};
use crate::registry::FleetRegistry;
use crate::types::ServerRecord;

/// Read access to the provisioning engine's named outputs.
#[async_trait]
pub trait ProvisioningOutputs: Send + Sync {
    async fn output(&self, name: &str) -> Result<String>;
}

/// Terraform CLI wrapper rooted at a working directory.
pub struct Terraform {
    dir: PathBuf,
    var_file: PathBuf,
}

impl Terraform {
    pub fn new(dir: impl Into<PathBuf>, var_file: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            var_file: var_file.into(),
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new("terraform");
        cmd.current_dir(&self.dir);
        cmd
    }

    pub async fn apply(&self) -> Result<()> {
        info!("Running terraform apply");
        let status = self
            .command()
            .arg("apply")
            .arg("-var-file")
            .arg(&self.var_file)
            .status()
            .await?;
        check_status("terraform apply", status)
    }

    /// Destroy everything, or just `target` when given.
    pub async fn destroy(&self, target: Option<&str>) -> Result<()> {
        let mut cmd = self.command();
        cmd.arg("destroy").arg("-var-file").arg(&self.var_file);
        if let Some(resource) = target {
            info!("Running terraform destroy for {}", resource);
            cmd.arg("-target").arg(resource);
        } else {
            info!("Running terraform destroy for the whole fleet");
        }
        let status = cmd.status().await?;
        check_status("terraform destroy", status)
    }
}

#[async_trait]
impl ProvisioningOutputs for Terraform {
    async fn output(&self, name: &str) -> Result<String> {
        let step = format!("terraform output {}", name);
        let out = self
            .command()
            .args(["output", "-raw", name])
            .output()
            .await?;
        if !out.status.success() {
            return Err(Error::Provisioning {
                step,
                code: out.status.code().unwrap_or(-1),
            });
        }
        let value = String::from_utf8(out.stdout).map_err(|e| Error::ProvisioningOutput {
            step: step.clone(),
            detail: e.to_string(),
        })?;
        let value = value.trim();
        if value.is_empty() {
            return Err(Error::ProvisioningOutput {
                step,
                detail: "empty value".into(),
            });
        }
        Ok(value.to_string())
    }
}

fn check_status(step: &str, status: std::process::ExitStatus) -> Result<()> {
    if status.success() {
        Ok(())
    } else {
        Err(Error::Provisioning {
            step: step.to_string(),
            code: status.code().unwrap_or(-1),
        })
    }
}

/// Build the registry record for one configured instance from its outputs.
pub async fn collect_instance(
    outputs: &dyn ProvisioningOutputs,
    target: &ServerTarget,
) -> Result<ServerRecord> {
    let prefix = target.output_prefix();
    let instance_id = outputs.output(&format!("{}_id", prefix)).await?;
    let public_ip = outputs.output(&format!("{}_public_ip", prefix)).await?;
    let public_dns = outputs.output(&format!("{}_public_dns", prefix)).await?;

    let mut record = ServerRecord::new(instance_id, public_ip, public_dns)
        .with_display_name(target.name.clone());
    record.server_hostname = target.server_hostname.clone();
    Ok(record)
}

/// Read every target's outputs and upsert it immediately.  Stops at the
/// first failure; earlier targets stay registered.
pub async fn register_instances(
    outputs: &dyn ProvisioningOutputs,
    targets: &[ServerTarget],
    registry: &FleetRegistry,
) -> Result<Vec<ServerRecord>> {
    let mut registered = Vec::with_capacity(targets.len());
    for target in targets {
        let record = match collect_instance(outputs, target).await {
            Ok(r) => r,
            Err(e) => {
                warn!(
                    "Failed to read outputs for {} after registering {} instance(s): {}",
                    target.name,
                    registered.len(),
                    e
                );
                return Err(e);
            }
        };
        registry.upsert(record.clone())?;
        registered.push(record);
    }
    Ok(registered)
}

/// Fail unless every program is on `PATH`.
pub fn check_dependencies(programs: &[&str]) -> Result<()> {
    for program in programs {
        if which::which(program).is_err() {
            return Err(Error::MissingDependency(program.to_string()));
        }
    }
    Ok(())
}

pub fn var_file_exists(dir: &Path, var_file: &Path) -> bool {
    dir.join(var_file).is_file()
}
