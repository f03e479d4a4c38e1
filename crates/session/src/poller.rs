//! Poll scheduler: periodic re-fetch of URLs named by partial updates.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use heimlink_protocol::Command;

/// Polling behavior.
#[derive(Debug, Clone)]
pub struct PollingConfig {
    pub enabled: bool,
    /// Poll only while the application is in the foreground.
    pub only_when_active: bool,
    pub interval: Duration,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            only_when_active: true,
            interval: Duration::from_secs(30),
        }
    }
}

/// Re-sends a `GET` for each scheduled URL on a fixed interval.
///
/// The URL set is replaced wholesale by [`schedule`](Self::schedule) and
/// emptied by [`cancel_polling`](Self::cancel_polling); the interval loop
/// in [`run`](Self::run) skips ticks while polling is disabled or the
/// application is inactive.
pub struct PollScheduler {
    config: PollingConfig,
    urls: Mutex<Vec<String>>,
    active: AtomicBool,
    commands_tx: mpsc::Sender<Command>,
}

impl PollScheduler {
    pub fn new(config: PollingConfig, commands_tx: mpsc::Sender<Command>) -> Self {
        Self {
            config,
            urls: Mutex::new(Vec::new()),
            active: AtomicBool::new(true),
            commands_tx,
        }
    }

    /// Replaces the scheduled URL set.
    pub fn schedule(&self, urls: Vec<String>) {
        let mut deduped = urls;
        deduped.sort();
        deduped.dedup();
        debug!(count = deduped.len(), "polling schedule replaced");
        *self.urls.lock().unwrap() = deduped;
    }

    /// Stops polling until the next schedule.
    pub fn cancel_polling(&self) {
        self.urls.lock().unwrap().clear();
    }

    /// Marks the application active or backgrounded.
    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Relaxed);
    }

    /// The currently scheduled URLs.
    pub fn scheduled(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }

    /// Sends one `GET` per scheduled URL immediately.
    pub async fn poll_once(&self) {
        let urls = self.scheduled();
        for url in urls {
            trace!(url = %url, "polling");
            if self.commands_tx.send(Command::get_url(url)).await.is_err() {
                break;
            }
        }
    }

    fn should_poll(&self) -> bool {
        self.config.enabled && (!self.config.only_when_active || self.active.load(Ordering::Relaxed))
    }

    /// Interval loop; lives until cancelled.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.interval);
        interval.tick().await; // Skip immediate first tick.

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    if self.should_poll() {
                        self.poll_once().await;
                    }
                }
            }
        }
    }
}
