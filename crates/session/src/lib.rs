//! Gateway session layer.
//!
//! Consumes a live link's byte stream, decodes protocol frames into typed
//! messages, hydrates the device/scenario cache, and executes the side
//! effects those messages imply (polling, pong bookkeeping, chunked reply
//! reassembly).

pub mod cache;
pub mod pipeline;
pub mod poller;
pub mod session;
pub mod waiters;

pub use cache::{DeviceCache, DeviceCacheEntry, entry_key};
pub use pipeline::{Effect, FrameProcessor};
pub use poller::{PollScheduler, PollingConfig};
pub use session::Session;
pub use waiters::{PongStore, ReplyStore};

/// Errors from session setup.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The link's inbound stream was already taken by another consumer.
    #[error("link inbound stream already taken")]
    StreamTaken,
}
