//! Cloud REST boundary.
//!
//! Three endpoints matter to the connection core: the password-grant token
//! exchange, the account's site listing, and the per-gateway secret lookup.
//! Everything else the vendor cloud offers is out of scope.

pub mod client;
pub mod models;

pub use client::CloudClient;
pub use models::{AccessToken, SiteGateway, SiteInfo};

/// Errors from cloud API calls.
#[derive(Debug, thiserror::Error)]
pub enum CloudError {
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("authentication rejected (HTTP {status})")]
    AuthRejected { status: u16 },

    #[error("cloud API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    #[error("unexpected response shape: {0}")]
    Parse(String),
}
