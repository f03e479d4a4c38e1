//! High-level gateway client.
//!
//! Wires the whole stack together: resolve credentials (store or cloud),
//! pick a transport (cached address → local discovery → remote relay),
//! and hand back a [`Connection`] streaming decoded messages.

mod connection;
mod env;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::mpsc;
use url::Url;

use heimlink_cloud::CloudClient;
use heimlink_connection::{DEFAULT_CONNECT_TIMEOUT, Orchestrator, Resolver, WsConnector};
use heimlink_discovery::Scanner;
use heimlink_store::Vault;

pub use connection::Connection;
pub use heimlink_connection::{
    ConnectorConfig, Decision, DecisionReason, LinkAuthenticator, ResolveError, ResolveRequest,
    SiteSelector, StaticAuthenticator, TransportMode, TransportOverride,
};
pub use heimlink_discovery::DiscoveryConfig;
pub use heimlink_session::PollingConfig;

use crate::env::{LinkProbe, LiveEnvironment};

/// Everything a client needs to reach one vendor's gateways.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Cloud API root for login, sites and gateway secrets.
    pub cloud_base_url: Url,
    /// Directory for the persistent stores.
    pub store_dir: PathBuf,
    pub connector: ConnectorConfig,
    pub discovery: DiscoveryConfig,
    pub polling: PollingConfig,
    /// Overall deadline for one connect call.
    pub connect_timeout: Duration,
}

impl ClientConfig {
    pub fn new(cloud_base_url: Url, store_dir: PathBuf) -> Self {
        Self {
            cloud_base_url,
            store_dir,
            connector: ConnectorConfig::default(),
            discovery: DiscoveryConfig::default(),
            polling: PollingConfig::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

/// One connect call's worth of input.
#[derive(Debug, Clone, Default)]
pub struct ConnectRequest {
    pub resolve: ResolveRequest,
    pub override_mode: TransportOverride,
}

/// The facade the UI layer talks to.
pub struct GatewayClient {
    config: ClientConfig,
    vault: Arc<Vault>,
    cloud: CloudClient,
    connector: Arc<WsConnector>,
    decisions_tx: mpsc::Sender<Decision>,
    decisions_rx: Mutex<Option<mpsc::Receiver<Decision>>>,
}

impl GatewayClient {
    /// Creates a client. The authenticator computes the vendor's digest
    /// authorization for the secure upgrade.
    pub fn new(
        config: ClientConfig,
        authenticator: Arc<dyn LinkAuthenticator>,
    ) -> Result<Self, ResolveError> {
        let vault = Arc::new(Vault::open(config.store_dir.clone())?);
        let cloud = CloudClient::new(config.cloud_base_url.clone());
        let connector = Arc::new(WsConnector::new(config.connector.clone(), authenticator));
        let (decisions_tx, decisions_rx) = mpsc::channel(64);
        Ok(Self {
            config,
            vault,
            cloud,
            connector,
            decisions_tx,
            decisions_rx: Mutex::new(Some(decisions_rx)),
        })
    }

    /// Takes the transport-decision stream. Can only be taken once; useful
    /// for a "negotiating access" indicator that reacts before connects
    /// resolve.
    pub fn take_decisions(&self) -> Option<mpsc::Receiver<Decision>> {
        self.decisions_rx.lock().unwrap().take()
    }

    /// Resolves, discovers and connects; returns the live connection.
    pub async fn connect(
        &self,
        request: ConnectRequest,
        selector: Option<SiteSelector>,
    ) -> Result<Connection, ResolveError> {
        let resolver = Resolver::new(&self.vault, &self.cloud);
        let credentials = resolver.resolve(&request.resolve, selector.as_ref()).await?;

        let scanner = Scanner::new(self.config.discovery.clone()).with_gateway_probe(Arc::new(
            LinkProbe {
                connector: self.connector.clone(),
            },
        ));

        let env = LiveEnvironment {
            credentials: Some(credentials),
            vault: self.vault.clone(),
            scanner: Arc::new(scanner),
            connector: self.connector.clone(),
            decisions_tx: self.decisions_tx.clone(),
        };

        let resolved = Orchestrator::new(env)
            .with_timeout(self.config.connect_timeout)
            .run(request.override_mode)
            .await?;

        Connection::new(resolved.link, resolved.mode, self.config.polling.clone())
            .await
            .map_err(|e| ResolveError::ConnectionFailed(e.to_string()))
    }

    /// Wipes every persisted store: gateway credentials, cloud account and
    /// gateway selection.
    pub fn clear_stored_data(&self) -> Result<(), ResolveError> {
        self.vault.clear_all()?;
        Ok(())
    }
}
