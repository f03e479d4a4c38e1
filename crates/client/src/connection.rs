//! The connected-gateway handle exposed to the UI layer.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use heimlink_connection::{LinkError, TransportMode};
use heimlink_protocol::Command;
use heimlink_protocol::message::DecodedMessage;
use heimlink_session::{DeviceCache, PollingConfig, Session};

/// A live, message-producing gateway connection.
pub struct Connection {
    session: Session,
    mode: TransportMode,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl Connection {
    pub(crate) async fn new(
        link: heimlink_connection::GatewayLink,
        mode: TransportMode,
        polling: PollingConfig,
    ) -> Result<Self, heimlink_session::SessionError> {
        let session = Session::start(link, polling).await?;
        Ok(Self { session, mode })
    }

    /// The transport this connection ended up on.
    pub fn mode(&self) -> &TransportMode {
        &self.mode
    }

    /// Sends a command to the gateway.
    pub async fn send(&self, command: &Command) -> Result<(), LinkError> {
        self.session.send(command).await
    }

    /// Takes the decoded message stream. Can only be taken once.
    pub fn decoded_messages(&self) -> Option<mpsc::Receiver<DecodedMessage>> {
        self.session.take_messages()
    }

    /// The hydrated device/scenario cache.
    pub fn cache(&self) -> Arc<DeviceCache> {
        self.session.cache()
    }

    /// Marks the application active or backgrounded.
    pub fn set_active(&self, active: bool) {
        self.session.set_active(active);
    }

    /// Liveness probe over the live link.
    pub async fn ping(&self, timeout: Duration) -> bool {
        self.session.ping(timeout).await
    }

    /// Closes the connection and stops its background tasks.
    pub async fn disconnect(&self) {
        self.session.close().await;
    }
}
