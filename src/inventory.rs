//! Ansible inventory generation and playbook invocation.

use std::path::{Path, PathBuf};

use log::info;
use tokio::process::Command;

use crate::error::{Error, Result};
use crate::registry::write_atomic;
use crate::types::ServerRecord;

const GROUP: &str = "game_server";

/// Group-wide variables written under `[game_server:vars]`.
#[derive(Debug, Clone)]
pub struct InventoryVars {
    pub remote_user: String,
    pub ssh_private_key_path: PathBuf,
    pub rcon_password: String,
}

/// Render one host line per server, addressed by its public DNS name.
pub fn render_inventory(records: &[ServerRecord], vars: &InventoryVars) -> String {
    let mut out = format!("[{}]\n", GROUP);
    for record in records {
        out.push_str(&record.public_dns);
        if let Some(hostname) = &record.server_hostname {
            out.push_str(&format!(" server_hostname={}", shell_quote(hostname)));
        }
        out.push('\n');
    }
    out.push_str(&format!("[{}:vars]\n", GROUP));
    out.push_str(&format!("ansible_user={}\n", vars.remote_user));
    out.push_str(&format!(
        "ansible_ssh_private_key_file={}\n",
        vars.ssh_private_key_path.display()
    ));
    out.push_str(&format!("rcon_password={}\n", vars.rcon_password));
    out
}

/// Quote for the POSIX shlex split ansible applies to host lines.
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r#"'"'"'"#))
}

pub fn write_inventory(path: &Path, records: &[ServerRecord], vars: &InventoryVars) -> Result<()> {
    write_atomic(path, render_inventory(records, vars).as_bytes())?;
    info!(
        "Wrote inventory with {} host(s) to {}",
        records.len(),
        path.display()
    );
    Ok(())
}

pub async fn run_playbook(playbook: &Path, inventory: &Path) -> Result<()> {
    info!("Running ansible playbook {}", playbook.display());
    let status = Command::new("ansible-playbook")
        .arg(playbook)
        .arg("-i")
        .arg(inventory)
        .arg("-e")
        .arg("ansible_ssh_common_args='-o StrictHostKeyChecking=no'")
        .status()
        .await?;
    if !status.success() {
        return Err(Error::Provisioning {
            step: "ansible-playbook".into(),
            code: status.code().unwrap_or(-1),
        });
    }
    Ok(())
}
