//! The orchestrator: executes the state machine's actions against live I/O.

use std::collections::VecDeque;
use std::time::Duration;

use tracing::{debug, info, warn};

use heimlink_discovery::LocalGatewayCandidate;
use heimlink_store::GatewayCredentials;

use crate::error::ResolveError;
use crate::machine::{
    Action, Decision, DecisionReason, Event, MachineState, Phase, TransportMode,
    TransportOverride, reduce,
};

/// Overall deadline for one resolve run.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(60);

/// The side effects a resolve run can perform.
///
/// Connect attempts return `Some(link)` on success and `None` on failure —
/// individual transport errors never propagate past the environment, they
/// only steer the state machine.
#[allow(async_fn_in_trait)]
pub trait Environment {
    /// The live connection handle produced by a successful connect.
    type Link;

    async fn load_credentials(&mut self) -> Option<GatewayCredentials>;
    async fn save_credentials(&mut self, credentials: &GatewayCredentials);
    async fn discover(&mut self, credentials: &GatewayCredentials) -> Vec<LocalGatewayCandidate>;
    async fn connect_local(
        &mut self,
        host: &str,
        credentials: &GatewayCredentials,
    ) -> Option<Self::Link>;
    async fn connect_remote(&mut self, credentials: &GatewayCredentials) -> Option<Self::Link>;
    async fn emit_decision(&mut self, decision: &Decision);
    async fn clear_stored_data(&mut self);
}

/// Outcome of a successful resolve run.
#[derive(Debug)]
pub struct Resolved<L> {
    pub link: L,
    pub mode: TransportMode,
    pub credentials: GatewayCredentials,
}

/// Drives [`reduce`] to a terminal phase against an [`Environment`].
///
/// One orchestrator run per resolve call; events are processed strictly in
/// the order their actions were emitted.
pub struct Orchestrator<E: Environment> {
    env: E,
    timeout: Duration,
}

impl<E: Environment> Orchestrator<E> {
    pub fn new(env: E) -> Self {
        Self {
            env,
            timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Runs the machine to completion.
    ///
    /// The whole run races the configured deadline; on expiry every
    /// in-flight child operation is dropped and a timeout error surfaces.
    pub async fn run(
        mut self,
        override_mode: TransportOverride,
    ) -> Result<Resolved<E::Link>, ResolveError> {
        let timeout = self.timeout;
        match tokio::time::timeout(timeout, self.run_inner(override_mode)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(timeout_secs = timeout.as_secs(), "connect run timed out");
                Err(ResolveError::Timeout {
                    timeout_secs: timeout.as_secs(),
                })
            }
        }
    }

    async fn run_inner(
        &mut self,
        override_mode: TransportOverride,
    ) -> Result<Resolved<E::Link>, ResolveError> {
        let mut state = MachineState::new(override_mode);
        let mut queue = VecDeque::from([Event::Start]);
        let mut link = None;

        while let Some(event) = queue.pop_front() {
            let (next, actions) = reduce(state, event);
            state = next;

            for action in actions {
                let credentials = state.credentials.clone();
                if let Some(event) = self.execute(action, credentials, &mut link).await {
                    queue.push_back(event);
                }
            }
        }

        match state.phase {
            Phase::Connected => {
                let mode = state
                    .last_decision
                    .map(|d| d.mode)
                    .unwrap_or(TransportMode::Remote);
                let credentials = state.credentials.ok_or_else(|| {
                    ResolveError::InvalidConfiguration("connected without credentials".into())
                })?;
                let link = link.ok_or_else(|| {
                    ResolveError::InvalidConfiguration("connected without a live link".into())
                })?;
                info!(mode = ?mode, "gateway connected");
                Ok(Resolved {
                    link,
                    mode,
                    credentials,
                })
            }
            Phase::Failed => Err(failure_error(&state)),
            other => Err(ResolveError::InvalidConfiguration(format!(
                "machine stalled in phase {other:?}"
            ))),
        }
    }

    /// Executes one action, returning the event it produces, if any.
    ///
    /// Actions that need credentials cannot fire before the machine has
    /// loaded them; if that invariant is ever broken a `Failure` event is
    /// produced instead of panicking.
    async fn execute(
        &mut self,
        action: Action,
        credentials: Option<GatewayCredentials>,
        link: &mut Option<E::Link>,
    ) -> Option<Event> {
        let need_credentials = |credentials: Option<GatewayCredentials>| {
            credentials.ok_or_else(|| Event::Failure("action executed without credentials".into()))
        };

        match action {
            Action::LoadCredentials => {
                Some(Event::CredentialsLoaded(self.env.load_credentials().await))
            }
            Action::SaveCredentials(credentials) => {
                self.env.save_credentials(&credentials).await;
                Some(Event::CredentialsSaved(credentials))
            }
            Action::DiscoverLocal => {
                let credentials = match need_credentials(credentials) {
                    Ok(c) => c,
                    Err(failure) => return Some(failure),
                };
                let candidates = self.env.discover(&credentials).await;
                debug!(count = candidates.len(), "local discovery finished");
                Some(Event::LocalDiscoveryFound(candidates))
            }
            Action::TryCachedAddress(host) => {
                let credentials = match need_credentials(credentials) {
                    Ok(c) => c,
                    Err(failure) => return Some(failure),
                };
                match self.env.connect_local(&host, &credentials).await {
                    Some(l) => {
                        *link = Some(l);
                        Some(Event::LocalConnectResult {
                            success: true,
                            host: Some(host),
                        })
                    }
                    None => {
                        debug!(host = %host, "cached address unreachable");
                        Some(Event::CachedAddressFailed)
                    }
                }
            }
            Action::ConnectLocal(host) => {
                let credentials = match need_credentials(credentials) {
                    Ok(c) => c,
                    Err(failure) => return Some(failure),
                };
                let result = self.env.connect_local(&host, &credentials).await;
                let success = result.is_some();
                if let Some(l) = result {
                    *link = Some(l);
                } else {
                    debug!(host = %host, "local connect failed");
                }
                Some(Event::LocalConnectResult {
                    success,
                    host: Some(host),
                })
            }
            Action::ConnectRemote => {
                let credentials = match need_credentials(credentials) {
                    Ok(c) => c,
                    Err(failure) => return Some(failure),
                };
                let result = self.env.connect_remote(&credentials).await;
                let success = result.is_some();
                if let Some(l) = result {
                    *link = Some(l);
                }
                Some(Event::RemoteConnectResult { success })
            }
            Action::EmitDecision(decision) => {
                self.env.emit_decision(&decision).await;
                None
            }
            Action::ClearStoredData => {
                self.env.clear_stored_data().await;
                None
            }
        }
    }
}

fn failure_error(state: &MachineState) -> ResolveError {
    match state.last_decision.as_ref().map(|d| d.reason) {
        Some(DecisionReason::MissingCredentials) => ResolveError::MissingGatewayCredentials,
        Some(DecisionReason::RemoteFailed) => ResolveError::RemoteFailed,
        _ => ResolveError::ConnectionFailed(
            state
                .last_error
                .clone()
                .unwrap_or_else(|| "connection failed".into()),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::Mutex;

    use heimlink_discovery::CandidateMethod;
    use heimlink_protocol::Mac;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Load,
        Save(Option<String>),
        Discover,
        ConnectLocal(String),
        ConnectRemote,
        Decision(Decision),
        Clear,
    }

    /// Scripted environment: fixed answers, recorded calls.
    struct FakeEnv {
        credentials: Option<GatewayCredentials>,
        candidates: Vec<LocalGatewayCandidate>,
        local_ok: Vec<String>,
        remote_ok: bool,
        calls: Arc<Mutex<Vec<Call>>>,
    }

    impl FakeEnv {
        fn new(credentials: Option<GatewayCredentials>) -> Self {
            Self {
                credentials,
                candidates: Vec::new(),
                local_ok: Vec::new(),
                remote_ok: false,
                calls: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn record(&self, call: Call) {
            self.calls.lock().unwrap().push(call);
        }
    }

    impl Environment for FakeEnv {
        type Link = String;

        async fn load_credentials(&mut self) -> Option<GatewayCredentials> {
            self.record(Call::Load);
            self.credentials.clone()
        }

        async fn save_credentials(&mut self, credentials: &GatewayCredentials) {
            self.record(Call::Save(credentials.cached_local_address.clone()));
        }

        async fn discover(
            &mut self,
            _credentials: &GatewayCredentials,
        ) -> Vec<LocalGatewayCandidate> {
            self.record(Call::Discover);
            self.candidates.clone()
        }

        async fn connect_local(
            &mut self,
            host: &str,
            _credentials: &GatewayCredentials,
        ) -> Option<String> {
            self.record(Call::ConnectLocal(host.into()));
            self.local_ok
                .iter()
                .any(|h| h == host)
                .then(|| format!("link:{host}"))
        }

        async fn connect_remote(&mut self, _credentials: &GatewayCredentials) -> Option<String> {
            self.record(Call::ConnectRemote);
            self.remote_ok.then(|| "link:remote".to_string())
        }

        async fn emit_decision(&mut self, decision: &Decision) {
            self.record(Call::Decision(decision.clone()));
        }

        async fn clear_stored_data(&mut self) {
            self.record(Call::Clear);
        }
    }

    fn mac() -> Mac {
        Mac::parse("00:1A:2B:3C:4D:5E").unwrap()
    }

    fn credentials(cached: Option<&str>) -> GatewayCredentials {
        let mut creds = GatewayCredentials::new(mac(), "secret");
        creds.cached_local_address = cached.map(str::to_string);
        creds
    }

    fn candidate(host: &str) -> LocalGatewayCandidate {
        LocalGatewayCandidate {
            mac: mac(),
            host: host.into(),
            method: CandidateMethod::SubnetProbe,
        }
    }

    #[tokio::test]
    async fn cached_address_success_returns_local_link() {
        let mut env = FakeEnv::new(Some(credentials(Some("192.168.1.10"))));
        env.local_ok = vec!["192.168.1.10".into()];
        let calls = env.calls.clone();

        let resolved = Orchestrator::new(env)
            .run(TransportOverride::None)
            .await
            .unwrap();

        assert_eq!(resolved.link, "link:192.168.1.10");
        assert_eq!(resolved.mode, TransportMode::Local("192.168.1.10".into()));

        let calls = calls.lock().unwrap();
        // Decision precedes the connect attempt.
        let decision_pos = calls
            .iter()
            .position(|c| matches!(c, Call::Decision(_)))
            .unwrap();
        let connect_pos = calls
            .iter()
            .position(|c| matches!(c, Call::ConnectLocal(_)))
            .unwrap();
        assert!(decision_pos < connect_pos);
        // Cached address unchanged: no save.
        assert!(!calls.iter().any(|c| matches!(c, Call::Save(_))));
    }

    #[tokio::test]
    async fn candidate_walk_persists_winning_host() {
        let mut env = FakeEnv::new(Some(credentials(None)));
        env.candidates = vec![candidate("10.0.0.1"), candidate("10.0.0.2")];
        env.local_ok = vec!["10.0.0.2".into()];
        let calls = env.calls.clone();

        let resolved = Orchestrator::new(env)
            .run(TransportOverride::None)
            .await
            .unwrap();

        assert_eq!(resolved.mode, TransportMode::Local("10.0.0.2".into()));
        assert_eq!(
            resolved.credentials.cached_local_address.as_deref(),
            Some("10.0.0.2")
        );

        let calls = calls.lock().unwrap();
        let attempts: Vec<_> = calls
            .iter()
            .filter_map(|c| match c {
                Call::ConnectLocal(h) => Some(h.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(attempts, vec!["10.0.0.1", "10.0.0.2"]);
        assert!(calls.contains(&Call::Save(Some("10.0.0.2".into()))));
    }

    #[tokio::test]
    async fn cached_failure_discovers_then_falls_back_to_remote() {
        let mut env = FakeEnv::new(Some(credentials(Some("192.168.1.10"))));
        env.remote_ok = true;
        let calls = env.calls.clone();

        let resolved = Orchestrator::new(env)
            .run(TransportOverride::None)
            .await
            .unwrap();

        assert_eq!(resolved.mode, TransportMode::Remote);
        let calls = calls.lock().unwrap();
        // Cached attempt, then discovery, then remote — never remote directly.
        let discover_pos = calls.iter().position(|c| *c == Call::Discover).unwrap();
        let remote_pos = calls.iter().position(|c| *c == Call::ConnectRemote).unwrap();
        assert!(discover_pos < remote_pos);
    }

    #[tokio::test]
    async fn missing_credentials_is_typed_error() {
        let env = FakeEnv::new(None);
        let err = Orchestrator::new(env)
            .run(TransportOverride::None)
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::MissingGatewayCredentials));
    }

    #[tokio::test]
    async fn remote_failure_clears_stores_and_errors() {
        let env = FakeEnv::new(Some(credentials(None)));
        let calls = env.calls.clone();

        let err = Orchestrator::new(env)
            .run(TransportOverride::None)
            .await
            .unwrap_err();

        assert!(matches!(err, ResolveError::RemoteFailed));
        assert!(calls.lock().unwrap().contains(&Call::Clear));
    }

    #[tokio::test]
    async fn force_remote_skips_discovery() {
        let mut env = FakeEnv::new(Some(credentials(Some("192.168.1.10"))));
        env.remote_ok = true;
        let calls = env.calls.clone();

        let resolved = Orchestrator::new(env)
            .run(TransportOverride::ForceRemote)
            .await
            .unwrap();

        assert_eq!(resolved.mode, TransportMode::Remote);
        let calls = calls.lock().unwrap();
        assert!(!calls.contains(&Call::Discover));
        assert!(!calls.iter().any(|c| matches!(c, Call::ConnectLocal(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn overall_timeout_surfaces_typed_error() {
        struct StallingEnv;
        impl Environment for StallingEnv {
            type Link = ();
            async fn load_credentials(&mut self) -> Option<GatewayCredentials> {
                // Hangs past the deadline.
                tokio::time::sleep(Duration::from_secs(3600)).await;
                None
            }
            async fn save_credentials(&mut self, _c: &GatewayCredentials) {}
            async fn discover(&mut self, _c: &GatewayCredentials) -> Vec<LocalGatewayCandidate> {
                Vec::new()
            }
            async fn connect_local(&mut self, _h: &str, _c: &GatewayCredentials) -> Option<()> {
                None
            }
            async fn connect_remote(&mut self, _c: &GatewayCredentials) -> Option<()> {
                None
            }
            async fn emit_decision(&mut self, _d: &Decision) {}
            async fn clear_stored_data(&mut self) {}
        }

        let err = Orchestrator::new(StallingEnv)
            .with_timeout(Duration::from_secs(5))
            .run(TransportOverride::None)
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::Timeout { timeout_secs: 5 }));
    }
}
