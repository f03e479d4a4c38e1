//! Local gateway discovery.
//!
//! Produces an ordered candidate list for one gateway: the cached address
//! first (optionally short-circuiting the whole scan when it validates),
//! then every subnet host that accepts a TCP connection on the configured
//! ports. Probing is bounded-concurrency and handshake validation races to
//! the first success, cancelling the rest.

pub mod scanner;
pub mod subnet;
pub mod types;

pub use scanner::{Scanner, TcpPortProbe};
pub use types::{
    CandidateMethod, DiscoveryConfig, GatewayProbe, LocalGatewayCandidate, PortProbe,
};
