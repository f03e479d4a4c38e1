//! Cloud account persistence.

use std::path::PathBuf;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::StoreError;

/// Cloud account credentials used for the token exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudAccount {
    pub email: String,
    pub password: String,
}

/// Single-record store for the cloud account.
pub struct AccountStore {
    path: PathBuf,
    account: RwLock<Option<CloudAccount>>,
}

impl AccountStore {
    /// Creates a store, loading any existing record from disk.
    pub fn new(path: PathBuf) -> Result<Self, StoreError> {
        let account = if path.exists() {
            let data = std::fs::read_to_string(&path)?;
            Some(serde_json::from_str(&data)?)
        } else {
            None
        };
        Ok(Self {
            path,
            account: RwLock::new(account),
        })
    }

    /// Returns the stored account, if any.
    pub fn get(&self) -> Option<CloudAccount> {
        self.account.read().unwrap().clone()
    }

    /// Saves the account.
    pub fn save(&self, account: &CloudAccount) -> Result<(), StoreError> {
        *self.account.write().unwrap() = Some(account.clone());
        let json = serde_json::to_string_pretty(account)?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, json)?;
        debug!("persisted cloud account to {:?}", self.path);
        Ok(())
    }

    /// Removes the stored account.
    pub fn clear(&self) -> Result<(), StoreError> {
        *self.account.write().unwrap() = None;
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}
