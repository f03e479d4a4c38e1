//! The live gateway link and its connector.
//!
//! A [`GatewayLink`] is the single-owner handle for one established
//! connection: commands go out through it, raw inbound bytes come back as
//! a stream the message pipeline consumes. The socket itself is driven by
//! three pump tasks (read, write, protocol ping) that die together through
//! a shared cancellation token.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::{Sink, Stream, StreamExt};
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use heimlink_protocol::Command;
use heimlink_store::GatewayCredentials;

use crate::pumps;

/// Errors from the transport link.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("socket error: {0}")]
    Ws(#[from] tungstenite::Error),

    #[error("connection closed")]
    Closed,

    #[error("invalid authorization header")]
    InvalidHeader,
}

/// Produces the `Authorization` header for the secure upgrade.
///
/// The vendor's digest arithmetic lives behind this boundary; the
/// connector only carries whatever header value the implementation
/// computes from (host, credentials).
pub trait LinkAuthenticator: Send + Sync {
    fn authorization<'a>(
        &'a self,
        url: &'a str,
        credentials: &'a GatewayCredentials,
    ) -> BoxFuture<'a, Option<String>>;
}

/// Authenticator with a fixed header value (or none at all).
pub struct StaticAuthenticator(pub Option<String>);

impl LinkAuthenticator for StaticAuthenticator {
    fn authorization<'a>(
        &'a self,
        _url: &'a str,
        _credentials: &'a GatewayCredentials,
    ) -> BoxFuture<'a, Option<String>> {
        Box::pin(async move { self.0.clone() })
    }
}

/// A live connection to the gateway.
pub struct GatewayLink {
    write_tx: mpsc::Sender<tungstenite::Message>,
    inbound_rx: Mutex<Option<mpsc::Receiver<Vec<u8>>>>,
    cancel: CancellationToken,
    _read_handle: tokio::task::JoinHandle<()>,
    _write_handle: tokio::task::JoinHandle<()>,
    _ping_handle: tokio::task::JoinHandle<()>,
}

impl GatewayLink {
    /// Spawns the pump tasks over an established socket.
    pub fn start<S>(stream: S, ping_period: Duration) -> Self
    where
        S: Stream<Item = Result<tungstenite::Message, tungstenite::Error>>
            + Sink<tungstenite::Message, Error = tungstenite::Error>
            + Send
            + Unpin
            + 'static,
    {
        let (write, read) = stream.split();
        let (write_tx, write_rx) = mpsc::channel::<tungstenite::Message>(256);
        let (inbound_tx, inbound_rx) = mpsc::channel::<Vec<u8>>(256);
        let cancel = CancellationToken::new();

        let write_handle = tokio::spawn(pumps::write::write_pump(
            write,
            write_rx,
            cancel.clone(),
        ));
        let read_handle = tokio::spawn(pumps::read::read_pump(
            read,
            inbound_tx,
            write_tx.clone(),
            cancel.clone(),
        ));
        let ping_handle = tokio::spawn(pumps::ping::ping_pump(
            write_tx.clone(),
            ping_period,
            cancel.clone(),
        ));

        Self {
            write_tx,
            inbound_rx: Mutex::new(Some(inbound_rx)),
            cancel,
            _read_handle: read_handle,
            _write_handle: write_handle,
            _ping_handle: ping_handle,
        }
    }

    /// Builds a link over pre-wired channels instead of a socket.
    ///
    /// The caller owns both ends: outbound messages appear on the paired
    /// receiver of `write_tx`, inbound bytes are whatever is fed into the
    /// paired sender of `inbound_rx`. No pump tasks are spawned.
    pub fn from_parts(
        write_tx: mpsc::Sender<tungstenite::Message>,
        inbound_rx: mpsc::Receiver<Vec<u8>>,
    ) -> Self {
        Self {
            write_tx,
            inbound_rx: Mutex::new(Some(inbound_rx)),
            cancel: CancellationToken::new(),
            _read_handle: tokio::spawn(async {}),
            _write_handle: tokio::spawn(async {}),
            _ping_handle: tokio::spawn(async {}),
        }
    }

    /// Sends a command frame to the gateway.
    pub async fn send(&self, command: &Command) -> Result<(), LinkError> {
        let text = String::from_utf8_lossy(&command.to_bytes()).into_owned();
        self.write_tx
            .send(tungstenite::Message::Text(text.into()))
            .await
            .map_err(|_| LinkError::Closed)
    }

    /// Takes the inbound byte stream. Can only be taken once; the message
    /// pipeline becomes its sole consumer.
    pub async fn take_inbound(&self) -> Option<mpsc::Receiver<Vec<u8>>> {
        self.inbound_rx.lock().await.take()
    }

    /// Gracefully closes the connection.
    pub async fn close(&self) {
        self.cancel.cancel();
        let _ = self.write_tx.send(tungstenite::Message::Close(None)).await;
    }
}

impl Drop for GatewayLink {
    fn drop(&mut self) {
        self.cancel.cancel();
        self._read_handle.abort();
        self._write_handle.abort();
        self._ping_handle.abort();
    }
}

/// Connector configuration.
#[derive(Debug, Clone)]
pub struct ConnectorConfig {
    /// Port for direct local connections.
    pub local_port: u16,
    /// Relay host for remote connections.
    pub remote_host: String,
    /// Upgrade endpoint path on both transports.
    pub endpoint_path: String,
    /// Protocol keepalive period.
    pub ping_period: Duration,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            local_port: 443,
            remote_host: "mediation.example.com".into(),
            endpoint_path: "/mediation/client".into(),
            ping_period: Duration::from_secs(30),
        }
    }
}

/// Establishes gateway links over a secure socket upgrade.
pub struct WsConnector {
    config: ConnectorConfig,
    authenticator: Arc<dyn LinkAuthenticator>,
}

impl WsConnector {
    pub fn new(config: ConnectorConfig, authenticator: Arc<dyn LinkAuthenticator>) -> Self {
        Self {
            config,
            authenticator,
        }
    }

    /// Connects directly to a local host.
    pub async fn connect_local(
        &self,
        host: &str,
        credentials: &GatewayCredentials,
    ) -> Result<GatewayLink, LinkError> {
        let url = format!(
            "wss://{host}:{}{}?mac={}",
            self.config.local_port, self.config.endpoint_path, credentials.mac
        );
        debug!(host = %host, "dialing local gateway");
        self.dial(&url, credentials).await
    }

    /// Connects through the cloud relay.
    pub async fn connect_remote(
        &self,
        credentials: &GatewayCredentials,
    ) -> Result<GatewayLink, LinkError> {
        let url = format!(
            "wss://{}{}?mac={}",
            self.config.remote_host, self.config.endpoint_path, credentials.mac
        );
        debug!(relay = %self.config.remote_host, "dialing remote relay");
        self.dial(&url, credentials).await
    }

    async fn dial(
        &self,
        url: &str,
        credentials: &GatewayCredentials,
    ) -> Result<GatewayLink, LinkError> {
        use tokio_tungstenite::tungstenite::client::IntoClientRequest;

        let mut request = url.into_client_request()?;
        if let Some(value) = self.authenticator.authorization(url, credentials).await {
            let header = value.parse().map_err(|_| LinkError::InvalidHeader)?;
            request
                .headers_mut()
                .insert(tungstenite::http::header::AUTHORIZATION, header);
        }

        let (stream, _) = tokio_tungstenite::connect_async(request).await?;
        info!(mac = %credentials.mac, "gateway socket established");
        Ok(GatewayLink::start(stream, self.config.ping_period))
    }
}
