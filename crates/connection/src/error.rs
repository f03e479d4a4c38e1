//! Connection-layer error taxonomy.

use heimlink_cloud::CloudError;
use heimlink_store::StoreError;

/// Errors surfaced by credential resolution and connection establishment.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    // Credentials
    #[error("no cloud account credentials available")]
    MissingCloudCredentials,

    #[error("no stored credentials for the gateway")]
    MissingGatewayCredentials,

    #[error("no gateway hardware address available")]
    MissingGatewayMac,

    // Site selection
    #[error("several sites available and none selected")]
    MissingSiteSelection,

    #[error("site index {index} out of range ({count} site(s))")]
    InvalidSiteIndex { index: usize, count: usize },

    #[error("selected site has no gateway")]
    MissingGateway,

    #[error("account has no sites")]
    NoSites,

    // Configuration
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    // Transport
    #[error("remote relay connection failed")]
    RemoteFailed,

    #[error("connection attempt timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    // Collaborators
    #[error(transparent)]
    Cloud(#[from] CloudError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
