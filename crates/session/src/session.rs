//! A running gateway session: pipeline, scheduler and command plumbing
//! wired over one live link.

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use heimlink_connection::{GatewayLink, LinkError};
use heimlink_protocol::Command;
use heimlink_protocol::message::DecodedMessage;

use crate::SessionError;
use crate::cache::DeviceCache;
use crate::pipeline::run_pipeline;
use crate::poller::{PollScheduler, PollingConfig};
use crate::waiters::{PongStore, ReplyStore};

/// Owns the background tasks of one connected gateway.
///
/// The link is single-owner: the session holds it, hands its inbound
/// stream to the pipeline, and everything it spawns dies with the shared
/// cancellation token.
pub struct Session {
    link: Arc<GatewayLink>,
    cache: Arc<DeviceCache>,
    pongs: Arc<PongStore>,
    replies: Arc<ReplyStore>,
    scheduler: Arc<PollScheduler>,
    decoded_rx: Mutex<Option<mpsc::Receiver<DecodedMessage>>>,
    cancel: CancellationToken,
}

impl Session {
    /// Starts the session tasks over an established link.
    pub async fn start(link: GatewayLink, polling: PollingConfig) -> Result<Self, SessionError> {
        let link = Arc::new(link);
        let inbound = link
            .take_inbound()
            .await
            .ok_or(SessionError::StreamTaken)?;

        let cache = Arc::new(DeviceCache::new());
        let pongs = Arc::new(PongStore::new());
        let replies = Arc::new(ReplyStore::new());
        let (commands_tx, mut commands_rx) = mpsc::channel::<Command>(32);
        let scheduler = Arc::new(PollScheduler::new(polling, commands_tx));
        let (decoded_tx, decoded_rx) = mpsc::channel(256);
        let cancel = CancellationToken::new();

        tokio::spawn(run_pipeline(
            inbound,
            cache.clone(),
            pongs.clone(),
            replies.clone(),
            scheduler.clone(),
            decoded_tx,
            cancel.clone(),
        ));

        {
            let scheduler = scheduler.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { scheduler.run(cancel).await });
        }

        // Scheduler commands go out through the same link as user commands.
        {
            let link = link.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        cmd = commands_rx.recv() => match cmd {
                            Some(cmd) => {
                                if link.send(&cmd).await.is_err() {
                                    break;
                                }
                            }
                            None => break,
                        }
                    }
                }
            });
        }

        info!("gateway session started");
        Ok(Self {
            link,
            cache,
            pongs,
            replies,
            scheduler,
            decoded_rx: Mutex::new(Some(decoded_rx)),
            cancel,
        })
    }

    /// Sends a command to the gateway.
    pub async fn send(&self, command: &Command) -> Result<(), LinkError> {
        self.link.send(command).await
    }

    /// Takes the decoded message stream. Can only be taken once.
    pub fn take_messages(&self) -> Option<mpsc::Receiver<DecodedMessage>> {
        self.decoded_rx.lock().unwrap().take()
    }

    /// The hydrated device/scenario cache.
    pub fn cache(&self) -> Arc<DeviceCache> {
        self.cache.clone()
    }

    /// Marks the application active or backgrounded (gates polling).
    pub fn set_active(&self, active: bool) {
        self.scheduler.set_active(active);
    }

    /// Replaces the polling schedule.
    pub fn schedule_polling(&self, urls: Vec<String>) {
        self.scheduler.schedule(urls);
    }

    /// Re-fetches everything currently scheduled, immediately.
    pub async fn poll_now(&self) {
        self.scheduler.poll_once().await;
    }

    /// Consumes the accumulated reply for a transaction, if complete.
    pub fn take_reply(&self, transaction_id: &str) -> Option<Vec<u8>> {
        self.replies.take(transaction_id)
    }

    /// Liveness probe: sends a protocol ping and waits for its pong.
    pub async fn ping(&self, timeout: Duration) -> bool {
        let command = Command::ping();
        let pong = self.pongs.expect(&command.transaction_id);
        if self.link.send(&command).await.is_err() {
            return false;
        }
        matches!(tokio::time::timeout(timeout, pong).await, Ok(Ok(())))
    }

    /// Stops every session task and closes the link.
    pub async fn close(&self) {
        self.cancel.cancel();
        self.pongs.clear();
        self.link.close().await;
        info!("gateway session closed");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
