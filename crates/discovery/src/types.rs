//! Discovery types and capability traits.

use std::time::Duration;

use futures_util::future::BoxFuture;

use heimlink_protocol::Mac;
use heimlink_store::GatewayCredentials;

/// How a candidate was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CandidateMethod {
    /// The last address that successfully reached this gateway.
    CachedAddress,
    /// Found by the subnet TCP probe.
    SubnetProbe,
}

/// A possibly-reachable local address for the target gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalGatewayCandidate {
    pub mac: Mac,
    pub host: String,
    pub method: CandidateMethod,
}

/// Discovery tuning knobs.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Overall deadline for the subnet scan.
    pub discovery_timeout: Duration,
    /// Per-host TCP connect timeout.
    pub probe_timeout: Duration,
    /// Maximum simultaneous TCP probes.
    pub probe_concurrency: usize,
    /// Ports to probe on each host.
    pub probe_ports: Vec<u16>,
    /// Per-candidate handshake validation timeout.
    pub info_timeout: Duration,
    /// Maximum simultaneous handshake validations.
    pub info_concurrency: usize,
    /// Accept the gateway's self-signed certificate.
    pub allow_insecure_tls: bool,
    /// Validate candidates with an application-level handshake.
    pub validate_with_info: bool,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            discovery_timeout: Duration::from_secs(10),
            probe_timeout: Duration::from_millis(400),
            probe_concurrency: 64,
            probe_ports: vec![443],
            info_timeout: Duration::from_secs(3),
            info_concurrency: 4,
            allow_insecure_tls: true,
            validate_with_info: true,
        }
    }
}

/// Application-level handshake check for a candidate host.
///
/// Implementations attempt the authenticated upgrade against the host and
/// answer whether it is genuinely the target gateway. Failures of any kind
/// degrade to `false`; nothing propagates past this boundary.
pub trait GatewayProbe: Send + Sync {
    fn verify<'a>(
        &'a self,
        host: &'a str,
        credentials: &'a GatewayCredentials,
    ) -> BoxFuture<'a, bool>;
}

/// Plain TCP accept check for one host/port.
///
/// Abstracted so the scanner's concurrency behavior is testable without a
/// network.
pub trait PortProbe: Send + Sync {
    fn reachable<'a>(&'a self, host: &'a str, port: u16, timeout: Duration) -> BoxFuture<'a, bool>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = DiscoveryConfig::default();
        assert_eq!(config.probe_ports, vec![443]);
        assert_eq!(config.probe_concurrency, 64);
        assert!(config.validate_with_info);
        assert!(config.probe_timeout < config.discovery_timeout);
    }

    #[test]
    fn candidate_equality_covers_method() {
        let mac = Mac::parse("aa:bb:cc:dd:ee:ff").unwrap();
        let cached = LocalGatewayCandidate {
            mac: mac.clone(),
            host: "192.168.1.10".into(),
            method: CandidateMethod::CachedAddress,
        };
        let probed = LocalGatewayCandidate {
            host: cached.host.clone(),
            method: CandidateMethod::SubnetProbe,
            mac,
        };
        assert_ne!(cached, probed);
    }
}
