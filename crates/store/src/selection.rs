//! Selected-gateway persistence.

use std::path::PathBuf;
use std::sync::RwLock;

use tracing::debug;

use heimlink_protocol::Mac;

use crate::StoreError;

/// Single-record store for the gateway the user last selected.
///
/// Lets later connection attempts skip the cloud site listing entirely.
pub struct SelectionStore {
    path: PathBuf,
    mac: RwLock<Option<Mac>>,
}

impl SelectionStore {
    /// Creates a store, loading any existing selection from disk.
    pub fn new(path: PathBuf) -> Result<Self, StoreError> {
        let mac = if path.exists() {
            let data = std::fs::read_to_string(&path)?;
            Some(serde_json::from_str(&data)?)
        } else {
            None
        };
        Ok(Self {
            path,
            mac: RwLock::new(mac),
        })
    }

    /// Returns the selected gateway, if any.
    pub fn get(&self) -> Option<Mac> {
        self.mac.read().unwrap().clone()
    }

    /// Saves the selection.
    pub fn save(&self, mac: &Mac) -> Result<(), StoreError> {
        *self.mac.write().unwrap() = Some(mac.clone());
        let json = serde_json::to_string(mac)?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, json)?;
        debug!(mac = %mac, "persisted gateway selection");
        Ok(())
    }

    /// Removes the selection.
    pub fn clear(&self) -> Result<(), StoreError> {
        *self.mac.write().unwrap() = None;
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}
