//! Live environment: the orchestrator's actions bound to real stores,
//! scanner and connector.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use heimlink_connection::{Decision, Environment, GatewayLink, WsConnector};
use heimlink_discovery::{GatewayProbe, LocalGatewayCandidate, Scanner};
use heimlink_store::{GatewayCredentials, Vault};

/// Handshake probe backed by a real connect-then-close upgrade attempt.
pub(crate) struct LinkProbe {
    pub(crate) connector: Arc<WsConnector>,
}

impl GatewayProbe for LinkProbe {
    fn verify<'a>(
        &'a self,
        host: &'a str,
        credentials: &'a GatewayCredentials,
    ) -> BoxFuture<'a, bool> {
        Box::pin(async move {
            match self.connector.connect_local(host, credentials).await {
                Ok(link) => {
                    link.close().await;
                    true
                }
                Err(e) => {
                    debug!(host = %host, error = %e, "handshake probe failed");
                    false
                }
            }
        })
    }
}

/// Environment wiring for one resolve run.
pub(crate) struct LiveEnvironment {
    pub(crate) credentials: Option<GatewayCredentials>,
    pub(crate) vault: Arc<Vault>,
    pub(crate) scanner: Arc<Scanner>,
    pub(crate) connector: Arc<WsConnector>,
    pub(crate) decisions_tx: mpsc::Sender<Decision>,
}

impl Environment for LiveEnvironment {
    type Link = GatewayLink;

    async fn load_credentials(&mut self) -> Option<GatewayCredentials> {
        // The resolver already did the store/cloud work; the machine just
        // consumes its result.
        self.credentials.clone()
    }

    async fn save_credentials(&mut self, credentials: &GatewayCredentials) {
        if let Err(e) = self.vault.credentials.save(credentials.clone()) {
            warn!("failed to persist credentials: {e}");
        }
    }

    async fn discover(&mut self, credentials: &GatewayCredentials) -> Vec<LocalGatewayCandidate> {
        self.scanner.discover(credentials).await
    }

    async fn connect_local(
        &mut self,
        host: &str,
        credentials: &GatewayCredentials,
    ) -> Option<GatewayLink> {
        match self.connector.connect_local(host, credentials).await {
            Ok(link) => Some(link),
            Err(e) => {
                debug!(host = %host, error = %e, "local connect failed");
                None
            }
        }
    }

    async fn connect_remote(&mut self, credentials: &GatewayCredentials) -> Option<GatewayLink> {
        match self.connector.connect_remote(credentials).await {
            Ok(link) => Some(link),
            Err(e) => {
                debug!(error = %e, "remote connect failed");
                None
            }
        }
    }

    async fn emit_decision(&mut self, decision: &Decision) {
        info!(mode = ?decision.mode, reason = ?decision.reason, "transport decision");
        if self.decisions_tx.try_send(decision.clone()).is_err() {
            debug!("decision observer not keeping up, dropping");
        }
    }

    async fn clear_stored_data(&mut self) {
        if let Err(e) = self.vault.clear_all() {
            warn!("failed to clear stored data: {e}");
        }
    }
}
