//! Wire protocol for gateway communication.
//!
//! Frames are text-based, CRLF-delimited and HTTP-shaped: commands sent to
//! the gateway look like HTTP requests, replies look like HTTP responses.
//! Every exchange carries a `Transac-Id` correlation header.

pub mod command;
pub mod frame;
pub mod mac;
pub mod message;
pub mod model;

pub use command::Command;
pub use frame::{Frame, FrameAssembler};
pub use mac::Mac;
pub use message::{DecodedMessage, decode};

/// Errors for protocol parsing and encoding.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("invalid hardware address: {0}")]
    InvalidMac(String),

    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
