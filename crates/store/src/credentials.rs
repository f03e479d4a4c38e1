//! Gateway credential persistence.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use heimlink_protocol::Mac;

use crate::StoreError;

/// Credentials for one gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayCredentials {
    pub mac: Mac,
    pub secret: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_local_address: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl GatewayCredentials {
    /// Creates credentials with no cached address, stamped now.
    pub fn new(mac: Mac, secret: impl Into<String>) -> Self {
        Self {
            mac,
            secret: secret.into(),
            cached_local_address: None,
            updated_at: Utc::now(),
        }
    }

    /// Returns a copy with the cached local address replaced and the
    /// timestamp refreshed.
    pub fn with_cached_address(&self, host: impl Into<String>) -> Self {
        Self {
            mac: self.mac.clone(),
            secret: self.secret.clone(),
            cached_local_address: Some(host.into()),
            updated_at: Utc::now(),
        }
    }
}

/// Persistent credential store keyed by normalized hardware address.
///
/// Entries are cached in memory and written back to a JSON file on every
/// mutation, mirroring the token-store pattern used for paired devices.
pub struct CredentialStore {
    path: PathBuf,
    entries: RwLock<HashMap<String, GatewayCredentials>>,
}

impl CredentialStore {
    /// Creates a store, loading existing entries from disk.
    pub fn new(path: PathBuf) -> Result<Self, StoreError> {
        let entries = load_entries(&path)?;
        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    /// Returns the credentials for a gateway, if stored.
    pub fn get(&self, mac: &Mac) -> Option<GatewayCredentials> {
        self.entries.read().unwrap().get(mac.as_str()).cloned()
    }

    /// Saves credentials, replacing any previous entry for the same gateway.
    pub fn save(&self, credentials: GatewayCredentials) -> Result<(), StoreError> {
        {
            let mut map = self.entries.write().unwrap();
            map.insert(credentials.mac.as_str().to_string(), credentials);
        }
        self.persist()
    }

    /// Removes the entry for a gateway.
    pub fn remove(&self, mac: &Mac) -> Result<(), StoreError> {
        {
            let mut map = self.entries.write().unwrap();
            map.remove(mac.as_str());
        }
        self.persist()
    }

    /// Removes every entry.
    pub fn clear(&self) -> Result<(), StoreError> {
        self.entries.write().unwrap().clear();
        self.persist()
    }

    /// Returns all stored hardware addresses.
    pub fn macs(&self) -> Vec<String> {
        self.entries.read().unwrap().keys().cloned().collect()
    }

    fn persist(&self) -> Result<(), StoreError> {
        let map = self.entries.read().unwrap();
        let json = serde_json::to_string_pretty(&*map)?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, json)?;
        debug!("persisted {} credential(s) to {:?}", map.len(), self.path);
        Ok(())
    }
}

fn load_entries(path: &Path) -> Result<HashMap<String, GatewayCredentials>, StoreError> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let data = std::fs::read_to_string(path)?;
    let entries: HashMap<String, GatewayCredentials> = serde_json::from_str(&data)?;
    debug!("loaded {} credential(s) from {:?}", entries.len(), path);
    Ok(entries)
}
