//! The discovery scanner.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use futures_util::future::BoxFuture;
use futures_util::stream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use heimlink_store::GatewayCredentials;

use crate::subnet;
use crate::types::{
    CandidateMethod, DiscoveryConfig, GatewayProbe, LocalGatewayCandidate, PortProbe,
};

/// Plain TCP connect probe.
pub struct TcpPortProbe;

impl PortProbe for TcpPortProbe {
    fn reachable<'a>(&'a self, host: &'a str, port: u16, timeout: Duration) -> BoxFuture<'a, bool> {
        Box::pin(async move {
            matches!(
                tokio::time::timeout(timeout, tokio::net::TcpStream::connect((host, port))).await,
                Ok(Ok(_))
            )
        })
    }
}

/// Discovers local candidates for one gateway.
///
/// All probe failures degrade to "unreachable"; discovery itself never
/// fails, it only returns fewer candidates.
pub struct Scanner {
    config: DiscoveryConfig,
    port_probe: Arc<dyn PortProbe>,
    gateway_probe: Option<Arc<dyn GatewayProbe>>,
}

impl Scanner {
    /// Creates a scanner probing real TCP sockets, without handshake
    /// validation.
    pub fn new(config: DiscoveryConfig) -> Self {
        Self {
            config,
            port_probe: Arc::new(TcpPortProbe),
            gateway_probe: None,
        }
    }

    /// Attaches the application-level handshake probe used when
    /// `validate_with_info` is set.
    pub fn with_gateway_probe(mut self, probe: Arc<dyn GatewayProbe>) -> Self {
        self.gateway_probe = Some(probe);
        self
    }

    /// Replaces the TCP probe (tests).
    pub fn with_port_probe(mut self, probe: Arc<dyn PortProbe>) -> Self {
        self.port_probe = probe;
        self
    }

    /// Runs discovery against the machine's own subnets.
    pub async fn discover(&self, credentials: &GatewayCredentials) -> Vec<LocalGatewayCandidate> {
        let hosts: Vec<String> = subnet::local_subnet_hosts()
            .into_iter()
            .map(|ip| ip.to_string())
            .collect();
        self.discover_among(credentials, hosts).await
    }

    /// Runs discovery against an explicit host list.
    ///
    /// Candidate order: cached address first, then subnet-probe hosts in
    /// completion order. Duplicate (host, method) pairs are removed.
    pub async fn discover_among(
        &self,
        credentials: &GatewayCredentials,
        hosts: Vec<String>,
    ) -> Vec<LocalGatewayCandidate> {
        let mut candidates = Vec::new();

        if let Some(cached) = &credentials.cached_local_address {
            let candidate = LocalGatewayCandidate {
                mac: credentials.mac.clone(),
                host: cached.clone(),
                method: CandidateMethod::CachedAddress,
            };
            if self.config.validate_with_info
                && let Some(probe) = &self.gateway_probe
            {
                let valid = tokio::time::timeout(
                    self.config.info_timeout,
                    probe.verify(cached, credentials),
                )
                .await
                .unwrap_or(false);
                if valid {
                    info!(host = %cached, "cached address validated, skipping scan");
                    return vec![candidate];
                }
                debug!(host = %cached, "cached address did not validate");
            }
            candidates.push(candidate);
        }

        for host in self.probe_hosts(hosts).await {
            candidates.push(LocalGatewayCandidate {
                mac: credentials.mac.clone(),
                host,
                method: CandidateMethod::SubnetProbe,
            });
        }

        let mut seen = HashSet::new();
        candidates.retain(|c| seen.insert((c.host.clone(), c.method)));

        if self.config.validate_with_info
            && self.gateway_probe.is_some()
            && !candidates.is_empty()
        {
            if let Some(winner) = self.validate_race(&candidates, credentials).await {
                info!(host = %winner.host, "handshake validation winner");
                return vec![winner];
            }
            // None validated: hand the unvalidated list to the caller so it
            // can still walk the candidates in turn.
            debug!(count = candidates.len(), "no candidate validated, returning all");
        }

        candidates
    }

    /// Probes every host's configured ports, at most `probe_concurrency`
    /// hosts in flight, under the overall discovery deadline. Hosts whose
    /// deadline expires mid-probe are simply absent from the result.
    async fn probe_hosts(&self, hosts: Vec<String>) -> Vec<String> {
        let total = hosts.len();
        let mut accepted = Vec::new();

        let mut probes = stream::iter(hosts)
            .map(|host| {
                let ports = self.config.probe_ports.clone();
                let timeout = self.config.probe_timeout;
                let probe = self.port_probe.clone();
                async move {
                    for port in ports {
                        if probe.reachable(&host, port, timeout).await {
                            return Some(host);
                        }
                    }
                    None
                }
            })
            .buffer_unordered(self.config.probe_concurrency.max(1));

        let deadline = tokio::time::sleep(self.config.discovery_timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = &mut deadline => {
                    debug!(probed = total, accepted = accepted.len(), "discovery deadline, keeping partial results");
                    break;
                }
                result = probes.next() => match result {
                    Some(Some(host)) => accepted.push(host),
                    Some(None) => {}
                    None => break,
                }
            }
        }

        debug!(total, accepted = accepted.len(), "subnet probe finished");
        accepted
    }

    /// Races handshake validation across candidates, at most
    /// `info_concurrency` in flight. The first success cancels every other
    /// in-flight probe.
    async fn validate_race(
        &self,
        candidates: &[LocalGatewayCandidate],
        credentials: &GatewayCredentials,
    ) -> Option<LocalGatewayCandidate> {
        let probe = self.gateway_probe.clone()?;
        let cancel = CancellationToken::new();

        let mut validations = stream::iter(candidates.to_vec())
            .map(|candidate| {
                let probe = probe.clone();
                let cancel = cancel.clone();
                let credentials = credentials.clone();
                let timeout = self.config.info_timeout;
                async move {
                    tokio::select! {
                        _ = cancel.cancelled() => None,
                        valid = tokio::time::timeout(
                            timeout,
                            probe.verify(&candidate.host, &credentials),
                        ) => valid.unwrap_or(false).then_some(candidate),
                    }
                }
            })
            .buffer_unordered(self.config.info_concurrency.max(1));

        while let Some(result) = validations.next().await {
            if let Some(winner) = result {
                cancel.cancel();
                return Some(winner);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use heimlink_protocol::Mac;

    fn credentials(cached: Option<&str>) -> GatewayCredentials {
        let mut creds =
            GatewayCredentials::new(Mac::parse("00:1A:2B:3C:4D:5E").unwrap(), "secret");
        creds.cached_local_address = cached.map(str::to_string);
        creds
    }

    fn config() -> DiscoveryConfig {
        DiscoveryConfig {
            discovery_timeout: Duration::from_secs(30),
            probe_timeout: Duration::from_millis(100),
            probe_concurrency: 4,
            probe_ports: vec![443],
            info_timeout: Duration::from_secs(1),
            info_concurrency: 2,
            allow_insecure_tls: true,
            validate_with_info: false,
        }
    }

    /// Port probe answering from a fixed set, tracking peak concurrency.
    struct FakePortProbe {
        open: Vec<String>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
    }

    impl FakePortProbe {
        fn new(open: &[&str]) -> Self {
            Self {
                open: open.iter().map(|s| s.to_string()).collect(),
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl PortProbe for FakePortProbe {
        fn reachable<'a>(
            &'a self,
            host: &'a str,
            _port: u16,
            _timeout: Duration,
        ) -> BoxFuture<'a, bool> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                self.open.iter().any(|h| h == host)
            })
        }
    }

    /// Handshake probe that validates a fixed host, optionally slowly.
    struct FakeGatewayProbe {
        valid_host: Option<String>,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl FakeGatewayProbe {
        fn validating(host: &str) -> Self {
            Self {
                valid_host: Some(host.into()),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            }
        }

        fn rejecting() -> Self {
            Self {
                valid_host: None,
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl GatewayProbe for FakeGatewayProbe {
        fn verify<'a>(
            &'a self,
            host: &'a str,
            _credentials: &'a GatewayCredentials,
        ) -> BoxFuture<'a, bool> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                if !self.delay.is_zero() {
                    tokio::time::sleep(self.delay).await;
                }
                self.valid_host.as_deref() == Some(host)
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn validated_cached_address_skips_subnet_scan() {
        let mut cfg = config();
        cfg.validate_with_info = true;
        let port_probe = Arc::new(FakePortProbe::new(&["192.168.1.30"]));
        let scanner = Scanner::new(cfg)
            .with_port_probe(port_probe.clone())
            .with_gateway_probe(Arc::new(FakeGatewayProbe::validating("192.168.1.20")));

        let result = scanner
            .discover_among(
                &credentials(Some("192.168.1.20")),
                vec!["192.168.1.30".into()],
            )
            .await;

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].host, "192.168.1.20");
        assert_eq!(result[0].method, CandidateMethod::CachedAddress);
        assert_eq!(port_probe.calls.load(Ordering::SeqCst), 0, "no scan expected");
    }

    #[tokio::test(start_paused = true)]
    async fn cached_address_stays_first_when_not_validating() {
        let port_probe = Arc::new(FakePortProbe::new(&["192.168.1.30", "192.168.1.40"]));
        let scanner = Scanner::new(config()).with_port_probe(port_probe);

        let hosts: Vec<String> = (30..45).map(|n| format!("192.168.1.{n}")).collect();
        let result = scanner
            .discover_among(&credentials(Some("192.168.1.20")), hosts)
            .await;

        assert_eq!(result[0].method, CandidateMethod::CachedAddress);
        assert_eq!(result[0].host, "192.168.1.20");
        let probed: Vec<_> = result[1..].iter().map(|c| c.host.as_str()).collect();
        assert_eq!(probed.len(), 2);
        assert!(probed.contains(&"192.168.1.30"));
        assert!(probed.contains(&"192.168.1.40"));
    }

    #[tokio::test(start_paused = true)]
    async fn probe_concurrency_is_bounded() {
        let port_probe = Arc::new(FakePortProbe::new(&[]));
        let scanner = Scanner::new(config()).with_port_probe(port_probe.clone());

        let hosts: Vec<String> = (1..=40).map(|n| format!("10.0.0.{n}")).collect();
        scanner.discover_among(&credentials(None), hosts).await;

        assert_eq!(port_probe.calls.load(Ordering::SeqCst), 40);
        assert!(
            port_probe.peak.load(Ordering::SeqCst) <= 4,
            "peak {} exceeded probe_concurrency",
            port_probe.peak.load(Ordering::SeqCst)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn validation_race_returns_only_winner() {
        let mut cfg = config();
        cfg.validate_with_info = true;
        let port_probe = Arc::new(FakePortProbe::new(&["10.0.0.1", "10.0.0.2", "10.0.0.3"]));
        let mut gateway_probe = FakeGatewayProbe::validating("10.0.0.2");
        gateway_probe.delay = Duration::from_millis(5);
        let scanner = Scanner::new(cfg)
            .with_port_probe(port_probe)
            .with_gateway_probe(Arc::new(gateway_probe));

        let hosts: Vec<String> = (1..=3).map(|n| format!("10.0.0.{n}")).collect();
        let result = scanner.discover_among(&credentials(None), hosts).await;

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].host, "10.0.0.2");
        assert_eq!(result[0].method, CandidateMethod::SubnetProbe);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_validation_falls_back_to_full_list() {
        let mut cfg = config();
        cfg.validate_with_info = true;
        let port_probe = Arc::new(FakePortProbe::new(&["10.0.0.1", "10.0.0.2"]));
        let scanner = Scanner::new(cfg)
            .with_port_probe(port_probe)
            .with_gateway_probe(Arc::new(FakeGatewayProbe::rejecting()));

        let hosts: Vec<String> = (1..=2).map(|n| format!("10.0.0.{n}")).collect();
        let result = scanner
            .discover_among(&credentials(Some("192.168.1.20")), hosts)
            .await;

        // Cached candidate plus the two accepting hosts, unvalidated.
        assert_eq!(result.len(), 3);
        assert_eq!(result[0].method, CandidateMethod::CachedAddress);
    }

    #[tokio::test(start_paused = true)]
    async fn dedup_keeps_distinct_methods_for_same_host() {
        let port_probe = Arc::new(FakePortProbe::new(&["192.168.1.20"]));
        let scanner = Scanner::new(config()).with_port_probe(port_probe);

        let result = scanner
            .discover_among(
                &credentials(Some("192.168.1.20")),
                vec!["192.168.1.20".into(), "192.168.1.20".into()],
            )
            .await;

        // Same host via cache and via probe: two entries, not three.
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].method, CandidateMethod::CachedAddress);
        assert_eq!(result[1].method, CandidateMethod::SubnetProbe);
    }

    #[tokio::test(start_paused = true)]
    async fn no_candidates_is_an_empty_list() {
        let port_probe = Arc::new(FakePortProbe::new(&[]));
        let scanner = Scanner::new(config()).with_port_probe(port_probe);
        let result = scanner
            .discover_among(&credentials(None), vec!["10.0.0.1".into()])
            .await;
        assert!(result.is_empty());
    }
}
