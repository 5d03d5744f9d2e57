//! Fleet registry.
//!
//! The registry is a JSON object on disk mapping instance identifiers to
//! connection and display metadata:
//!
//! ```json
//! {
//!     "i-0abc": {
//!         "public_ip": "203.0.113.5",
//!         "public_dns": "ec2-203-0-113-5.compute.amazonaws.com",
//!         "name": "jump_01",
//!         "server_hostname": "jump 24/7"
//!     }
//! }
//! ```
//!
//! It is the only record of which servers exist.  Every mutation rewrites
//! the whole file through a temporary sibling and a rename, so readers see
//! either the old snapshot or the new one.  A file that fails to parse is
//! reported, never treated as an empty fleet.

use std::collections::BTreeMap;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{RegistryUpdate, ServerRecord};

/// On-disk value stored under each instance id.
///
/// Optional fields are tolerated on read because older registry files
/// carried only the addresses.  Keys this crate does not know about are
/// kept in `extra` and written back untouched until the entry itself is
/// replaced.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredServer {
    public_ip: String,
    public_dns: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    server_hostname: Option<String>,
    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

impl StoredServer {
    fn into_record(self, instance_id: String) -> ServerRecord {
        ServerRecord {
            instance_id,
            public_ip: self.public_ip,
            public_dns: self.public_dns,
            display_name: self.name,
            server_hostname: self.server_hostname,
        }
    }
}

impl From<ServerRecord> for StoredServer {
    fn from(record: ServerRecord) -> Self {
        Self {
            public_ip: record.public_ip,
            public_dns: record.public_dns,
            name: record.display_name,
            server_hostname: record.server_hostname,
            extra: serde_json::Map::new(),
        }
    }
}

/// Handle to a registry file.  Holds no state beyond the path; every call
/// reads the current snapshot from disk.
#[derive(Debug, Clone)]
pub struct FleetRegistry {
    path: PathBuf,
}

impl FleetRegistry {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted snapshot.  A registry that was never written is
    /// empty.
    pub fn load(&self) -> Result<BTreeMap<String, ServerRecord>> {
        Ok(self
            .load_stored()?
            .into_iter()
            .map(|(id, server)| {
                let record = server.into_record(id.clone());
                (id, record)
            })
            .collect())
    }

    fn load_stored(&self) -> Result<BTreeMap<String, StoredServer>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Registry {} does not exist yet", self.path.display());
                return Ok(BTreeMap::new());
            }
            Err(e) => return Err(e.into()),
        };

        serde_json::from_str(&content).map_err(|source| Error::RegistryCorrupt {
            path: self.path.clone(),
            source,
        })
    }

    /// All known servers, ordered by instance id.
    pub fn list(&self) -> Result<Vec<ServerRecord>> {
        Ok(self.load()?.into_values().collect())
    }

    pub fn get(&self, instance_id: &str) -> Result<Option<ServerRecord>> {
        Ok(self.load()?.remove(instance_id))
    }

    /// First server whose display name matches `name` exactly.
    pub fn find_by_name(&self, name: &str) -> Result<Option<ServerRecord>> {
        Ok(self
            .load()?
            .into_values()
            .find(|r| r.display_name.as_deref() == Some(name)))
    }

    /// Insert or fully replace the entry for `record.instance_id`.
    pub fn upsert(&self, record: ServerRecord) -> Result<()> {
        self.apply(RegistryUpdate::Upsert(record))
    }

    /// Drop the entry for `instance_id`.  Absent ids are not an error.
    pub fn remove(&self, instance_id: &str) -> Result<()> {
        self.apply(RegistryUpdate::Remove {
            instance_id: instance_id.to_string(),
        })
    }

    /// Apply one update and persist the result.
    pub fn apply(&self, update: RegistryUpdate) -> Result<()> {
        let mut servers = self.load_stored()?;
        match update {
            RegistryUpdate::Upsert(record) => {
                info!(
                    "Registered {} -> {} ({})",
                    record.instance_id, record.public_ip, record.public_dns
                );
                servers.insert(record.instance_id.clone(), StoredServer::from(record));
            }
            RegistryUpdate::Remove { instance_id } => {
                if servers.remove(&instance_id).is_none() {
                    debug!("Remove of unknown instance {} ignored", instance_id);
                    return Ok(());
                }
                info!("Removed {} from registry", instance_id);
            }
        }
        self.save(servers)
    }

    fn save(&self, servers: BTreeMap<String, StoredServer>) -> Result<()> {
        let json = serde_json::to_string_pretty(&servers).map_err(Error::RegistryEncode)?;
        write_atomic(&self.path, json.as_bytes())
    }
}

/// Write `contents` to a temporary sibling of `path` and rename it into place.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    let written = std::fs::File::create(&tmp_path).and_then(|mut file| {
        file.write_all(contents)?;
        file.sync_all()
    });
    if let Err(e) = written {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(e.into());
    }
    if let Err(e) = std::fs::rename(&tmp_path, path) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(e.into());
    }
    Ok(())
}
