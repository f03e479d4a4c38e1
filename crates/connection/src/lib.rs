//! Gateway connection resolution.
//!
//! The pure state machine picks a transport (cached address, discovered
//! local candidate, remote relay), the orchestrator executes its actions
//! against live I/O, and the resolver supplies the credentials both need.

pub mod error;
pub mod link;
pub mod machine;
pub mod orchestrator;
pub(crate) mod pumps;
pub mod resolver;

pub use error::ResolveError;
pub use link::{ConnectorConfig, GatewayLink, LinkAuthenticator, LinkError, StaticAuthenticator, WsConnector};
pub use machine::{
    Action, Decision, DecisionReason, Event, MachineState, Phase, TransportMode,
    TransportOverride, reduce,
};
pub use orchestrator::{DEFAULT_CONNECT_TIMEOUT, Environment, Orchestrator, Resolved};
pub use resolver::{CloudApi, ResolveRequest, Resolver, SiteSelector};
