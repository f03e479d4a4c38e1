//! The connection state machine.
//!
//! A pure reducer: `reduce(state, event)` returns the next state plus the
//! actions the orchestrator must execute. No I/O happens here, which keeps
//! the whole transport-selection policy unit-testable.
//!
//! Mode policy, in order: cached address, discovered local candidates,
//! remote relay. A manual override pins the machine to one side. Every mode
//! attempt is announced with exactly one [`Decision`], emitted before the
//! corresponding connect action so observers can react before the network
//! call resolves.

use heimlink_discovery::LocalGatewayCandidate;
use heimlink_store::GatewayCredentials;

/// Manual transport override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportOverride {
    #[default]
    None,
    ForceLocal,
    ForceRemote,
}

/// Where the machine currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    LoadingCredentials,
    TryingCachedAddress,
    DiscoveringLocal,
    ConnectingLocal,
    ConnectingRemote,
    Connected,
    Failed,
}

/// The transport a decision selects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportMode {
    /// Direct connection to a local address. Empty when the address is not
    /// known yet (local override before discovery).
    Local(String),
    Remote,
}

/// Why a mode was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionReason {
    MissingCredentials,
    OverrideLocal,
    OverrideRemote,
    CachedAddressFailed,
    LocalDiscoveryFailed,
    LocalConnected,
    RemoteConnected,
    LocalFailed,
    RemoteFailed,
}

/// A transport mode decision.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub mode: TransportMode,
    pub reason: DecisionReason,
}

impl Decision {
    fn local(host: impl Into<String>, reason: DecisionReason) -> Self {
        Self {
            mode: TransportMode::Local(host.into()),
            reason,
        }
    }

    fn remote(reason: DecisionReason) -> Self {
        Self {
            mode: TransportMode::Remote,
            reason,
        }
    }
}

/// Events fed into the reducer.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Start,
    OverrideLocal,
    OverrideRemote,
    ClearOverride,
    CredentialsLoaded(Option<GatewayCredentials>),
    CredentialsSaved(GatewayCredentials),
    CachedAddressFailed,
    LocalDiscoveryFound(Vec<LocalGatewayCandidate>),
    LocalConnectResult { success: bool, host: Option<String> },
    RemoteConnectResult { success: bool },
    Failure(String),
}

/// Effects the orchestrator must execute.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    LoadCredentials,
    SaveCredentials(GatewayCredentials),
    DiscoverLocal,
    TryCachedAddress(String),
    ConnectLocal(String),
    ConnectRemote,
    EmitDecision(Decision),
    ClearStoredData,
}

/// Reducer state. Created fresh for every resolve attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct MachineState {
    pub phase: Phase,
    pub override_mode: TransportOverride,
    pub credentials: Option<GatewayCredentials>,
    /// Candidates not yet attempted; only populated while discovering or
    /// connecting locally.
    pub pending_candidates: Vec<LocalGatewayCandidate>,
    /// Host of the in-flight local attempt.
    pub current_host: Option<String>,
    pub last_decision: Option<Decision>,
    pub last_error: Option<String>,
}

impl MachineState {
    pub fn new(override_mode: TransportOverride) -> Self {
        Self {
            phase: Phase::Idle,
            override_mode,
            credentials: None,
            pending_candidates: Vec::new(),
            current_host: None,
            last_decision: None,
            last_error: None,
        }
    }
}

/// Advances the machine by one event.
pub fn reduce(state: MachineState, event: Event) -> (MachineState, Vec<Action>) {
    let mut state = state;
    match event {
        Event::Start if state.phase == Phase::Idle => {
            state.phase = Phase::LoadingCredentials;
            (state, vec![Action::LoadCredentials])
        }

        Event::OverrideLocal => {
            state.override_mode = TransportOverride::ForceLocal;
            (state, Vec::new())
        }
        Event::OverrideRemote => {
            state.override_mode = TransportOverride::ForceRemote;
            (state, Vec::new())
        }
        Event::ClearOverride => {
            state.override_mode = TransportOverride::None;
            (state, Vec::new())
        }

        Event::CredentialsLoaded(None) if state.phase == Phase::LoadingCredentials => {
            state.phase = Phase::Failed;
            state.last_error = Some("no gateway credentials available".into());
            let decision = Decision::remote(DecisionReason::MissingCredentials);
            state.last_decision = Some(decision.clone());
            (state, vec![Action::EmitDecision(decision)])
        }

        Event::CredentialsLoaded(Some(credentials))
            if state.phase == Phase::LoadingCredentials =>
        {
            let cached = credentials.cached_local_address.clone();
            state.credentials = Some(credentials);
            match (state.override_mode, cached) {
                (TransportOverride::ForceRemote, _) => {
                    enter_remote(state, DecisionReason::OverrideRemote)
                }
                (TransportOverride::ForceLocal, Some(host)) => {
                    state.phase = Phase::TryingCachedAddress;
                    state.current_host = Some(host.clone());
                    let decision = Decision::local(&host, DecisionReason::OverrideLocal);
                    state.last_decision = Some(decision.clone());
                    (
                        state,
                        vec![
                            Action::EmitDecision(decision),
                            Action::TryCachedAddress(host),
                        ],
                    )
                }
                (TransportOverride::ForceLocal, None) => {
                    state.phase = Phase::DiscoveringLocal;
                    let decision = Decision::local("", DecisionReason::OverrideLocal);
                    state.last_decision = Some(decision.clone());
                    (
                        state,
                        vec![Action::EmitDecision(decision), Action::DiscoverLocal],
                    )
                }
                (TransportOverride::None, Some(host)) => {
                    state.phase = Phase::TryingCachedAddress;
                    state.current_host = Some(host.clone());
                    let decision = Decision::local(&host, DecisionReason::LocalConnected);
                    state.last_decision = Some(decision.clone());
                    (
                        state,
                        vec![
                            Action::EmitDecision(decision),
                            Action::TryCachedAddress(host),
                        ],
                    )
                }
                (TransportOverride::None, None) => {
                    // No decision yet: it waits for a concrete candidate.
                    state.phase = Phase::DiscoveringLocal;
                    (state, vec![Action::DiscoverLocal])
                }
            }
        }

        Event::CachedAddressFailed if state.phase == Phase::TryingCachedAddress => {
            state.phase = Phase::DiscoveringLocal;
            state.current_host = None;
            (state, vec![Action::DiscoverLocal])
        }

        Event::LocalDiscoveryFound(candidates) if state.phase == Phase::DiscoveringLocal => {
            if candidates.is_empty() {
                return enter_remote(state, DecisionReason::LocalDiscoveryFailed);
            }
            let mut rest = candidates;
            let first = rest.remove(0);
            state.phase = Phase::ConnectingLocal;
            state.current_host = Some(first.host.clone());
            state.pending_candidates = rest;
            let decision = Decision::local(&first.host, DecisionReason::LocalConnected);
            state.last_decision = Some(decision.clone());
            (
                state,
                vec![
                    Action::EmitDecision(decision),
                    Action::ConnectLocal(first.host),
                ],
            )
        }

        Event::LocalConnectResult { success: true, host }
            if matches!(
                state.phase,
                Phase::TryingCachedAddress | Phase::ConnectingLocal
            ) =>
        {
            let winner = host.or_else(|| state.current_host.clone()).unwrap_or_default();
            state.phase = Phase::Connected;
            state.pending_candidates.clear();

            // Persist the winning host as the new cached address, but only
            // when it actually changes the stored credentials.
            let mut actions = Vec::new();
            if let Some(credentials) = &state.credentials
                && credentials.cached_local_address.as_deref() != Some(winner.as_str())
            {
                let updated = credentials.with_cached_address(&winner);
                state.credentials = Some(updated.clone());
                actions.push(Action::SaveCredentials(updated));
            }
            (state, actions)
        }

        Event::LocalConnectResult { success: false, .. }
            if state.phase == Phase::TryingCachedAddress =>
        {
            state.phase = Phase::DiscoveringLocal;
            state.current_host = None;
            (state, vec![Action::DiscoverLocal])
        }

        Event::LocalConnectResult { success: false, .. }
            if state.phase == Phase::ConnectingLocal =>
        {
            if state.pending_candidates.is_empty() {
                return enter_remote(state, DecisionReason::LocalFailed);
            }
            let next = state.pending_candidates.remove(0);
            state.current_host = Some(next.host.clone());
            let decision = Decision::local(&next.host, DecisionReason::LocalConnected);
            state.last_decision = Some(decision.clone());
            (
                state,
                vec![
                    Action::EmitDecision(decision),
                    Action::ConnectLocal(next.host),
                ],
            )
        }

        Event::RemoteConnectResult { success: true } if state.phase == Phase::ConnectingRemote => {
            state.phase = Phase::Connected;
            (state, Vec::new())
        }

        Event::RemoteConnectResult { success: false }
            if state.phase == Phase::ConnectingRemote =>
        {
            state.phase = Phase::Failed;
            state.last_error = Some("remote relay connection failed".into());
            let decision = Decision::remote(DecisionReason::RemoteFailed);
            state.last_decision = Some(decision.clone());
            // Remote was the last resort: wipe persisted state so the next
            // attempt restarts from a clean slate.
            (
                state,
                vec![Action::EmitDecision(decision), Action::ClearStoredData],
            )
        }

        Event::CredentialsSaved(credentials) => {
            state.credentials = Some(credentials);
            (state, Vec::new())
        }

        Event::Failure(message) => {
            state.phase = Phase::Failed;
            state.last_error = Some(message);
            (state, Vec::new())
        }

        // Anything else is out of order for the current phase; ignore it.
        _ => (state, Vec::new()),
    }
}

fn enter_remote(
    mut state: MachineState,
    reason: DecisionReason,
) -> (MachineState, Vec<Action>) {
    state.phase = Phase::ConnectingRemote;
    state.current_host = None;
    state.pending_candidates.clear();
    let decision = Decision::remote(reason);
    state.last_decision = Some(decision.clone());
    (
        state,
        vec![Action::EmitDecision(decision), Action::ConnectRemote],
    )
}
