//! Persistent local stores.
//!
//! Three small JSON-file-backed stores with in-memory caches: gateway
//! credentials keyed by hardware address, the cloud account, and the
//! selected gateway. Each store is the single owner of its file; all
//! mutation goes through it.

pub mod account;
pub mod credentials;
pub mod selection;

use std::path::PathBuf;

pub use account::{AccountStore, CloudAccount};
pub use credentials::{CredentialStore, GatewayCredentials};
pub use selection::SelectionStore;

/// Errors from store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// All three stores, rooted in one directory.
///
/// The connection layer wipes the lot on a terminal remote failure so the
/// next attempt restarts from a clean slate.
pub struct Vault {
    pub credentials: CredentialStore,
    pub account: AccountStore,
    pub selection: SelectionStore,
}

impl Vault {
    /// Opens (or creates) the stores under `dir`.
    pub fn open(dir: PathBuf) -> Result<Self, StoreError> {
        Ok(Self {
            credentials: CredentialStore::new(dir.join("credentials.json"))?,
            account: AccountStore::new(dir.join("account.json"))?,
            selection: SelectionStore::new(dir.join("selection.json"))?,
        })
    }

    /// Clears every store.
    pub fn clear_all(&self) -> Result<(), StoreError> {
        self.credentials.clear()?;
        self.account.clear()?;
        self.selection.clear()?;
        Ok(())
    }
}

/// Returns the default store directory.
pub fn default_store_dir() -> Option<PathBuf> {
    config_dir().map(|d| d.join("heimlink"))
}

/// Returns the platform-specific config directory.
fn config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| {
                std::env::var("HOME")
                    .ok()
                    .map(|h| PathBuf::from(h).join(".config"))
            })
    }

    #[cfg(target_os = "windows")]
    {
        std::env::var("APPDATA").ok().map(PathBuf::from)
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join(".config"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heimlink_protocol::Mac;

    #[test]
    fn vault_clear_all_empties_every_store() {
        let tmp = tempfile::tempdir().unwrap();
        let vault = Vault::open(tmp.path().to_path_buf()).unwrap();

        let mac = Mac::parse("00:1a:2b:3c:4d:5e").unwrap();
        vault
            .credentials
            .save(GatewayCredentials::new(mac.clone(), "secret"))
            .unwrap();
        vault
            .account
            .save(&CloudAccount {
                email: "user@example.com".into(),
                password: "pw".into(),
            })
            .unwrap();
        vault.selection.save(&mac).unwrap();

        vault.clear_all().unwrap();

        assert!(vault.credentials.get(&mac).is_none());
        assert!(vault.account.get().is_none());
        assert!(vault.selection.get().is_none());
    }
}
