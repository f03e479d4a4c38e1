//! Ping pump — periodic protocol-level keepalive.
//!
//! The gateway's liveness signal is a `GET /ping` command frame answered by
//! a pong frame, not a WebSocket control ping. The session layer matches
//! the replies; this pump only keeps them coming.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;

use heimlink_protocol::Command;

/// Sends a protocol ping every `period` until cancelled.
pub(crate) async fn ping_pump(
    write_tx: mpsc::Sender<tungstenite::Message>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(period);
    interval.tick().await; // Skip immediate first tick.

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                let bytes = Command::ping().to_bytes();
                let text = String::from_utf8_lossy(&bytes).into_owned();
                if write_tx.send(tungstenite::Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
        }
    }
}
