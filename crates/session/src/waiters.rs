//! Pong and reply bookkeeping.
//!
//! Small stores keyed by transaction id. A caller that expects a reply
//! registers first, the pipeline completes the expectation when the frame
//! arrives, whoever waited consumes it.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::oneshot;
use tracing::trace;

/// Waiters for protocol pong frames.
#[derive(Debug, Default)]
pub struct PongStore {
    waiters: Mutex<HashMap<String, oneshot::Sender<()>>>,
}

impl PongStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers interest in the pong for a transaction id.
    ///
    /// A second expectation for the same id replaces the first; the old
    /// waiter resolves as cancelled.
    pub fn expect(&self, transaction_id: &str) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        self.waiters
            .lock()
            .unwrap()
            .insert(transaction_id.to_string(), tx);
        rx
    }

    /// Records an arrived pong. Returns whether anyone was waiting.
    pub fn record(&self, transaction_id: &str) -> bool {
        match self.waiters.lock().unwrap().remove(transaction_id) {
            Some(tx) => {
                trace!(transaction_id, "pong delivered to waiter");
                tx.send(()).is_ok()
            }
            None => false,
        }
    }

    /// Drops all outstanding expectations.
    pub fn clear(&self) {
        self.waiters.lock().unwrap().clear();
    }
}

/// Accumulates chunked reply bodies per transaction id.
#[derive(Debug, Default)]
pub struct ReplyStore {
    chunks: Mutex<HashMap<String, Vec<u8>>>,
}

impl ReplyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a fragment to the reply for a transaction.
    pub fn append(&self, transaction_id: &str, chunk: &[u8]) {
        self.chunks
            .lock()
            .unwrap()
            .entry(transaction_id.to_string())
            .or_default()
            .extend_from_slice(chunk);
    }

    /// Consumes the accumulated reply for a transaction.
    pub fn take(&self, transaction_id: &str) -> Option<Vec<u8>> {
        self.chunks.lock().unwrap().remove(transaction_id)
    }

    /// Number of transactions with buffered data.
    pub fn pending(&self) -> usize {
        self.chunks.lock().unwrap().len()
    }

    /// Drops all buffered replies.
    pub fn clear(&self) {
        self.chunks.lock().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pong_completes_matching_waiter() {
        let store = PongStore::new();
        let rx = store.expect("42");
        assert!(store.record("42"));
        rx.await.expect("waiter should resolve");
    }

    #[test]
    fn pong_without_waiter_is_recorded_as_unclaimed() {
        let store = PongStore::new();
        assert!(!store.record("99"));
    }

    #[tokio::test]
    async fn pong_waiter_is_consumed_once() {
        let store = PongStore::new();
        let _rx = store.expect("42");
        assert!(store.record("42"));
        assert!(!store.record("42"));
    }

    #[test]
    fn reply_chunks_accumulate_in_order() {
        let store = ReplyStore::new();
        store.append("7", b"hello ");
        store.append("7", b"world");
        assert_eq!(store.take("7").unwrap(), b"hello world");
        assert!(store.take("7").is_none(), "take consumes");
    }

    #[test]
    fn replies_are_isolated_per_transaction() {
        let store = ReplyStore::new();
        store.append("1", b"a");
        store.append("2", b"b");
        assert_eq!(store.pending(), 2);
        assert_eq!(store.take("1").unwrap(), b"a");
        assert_eq!(store.take("2").unwrap(), b"b");
    }
}
