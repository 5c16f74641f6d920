use crate::application::path_negotiator::ProxyNegotiator;
use crate::application::profile_registry::ConnectionRegistry;
use crate::domain::{
    AccelerationSettings, ConnectionProfile, Event, EventBus, PathDecision, SessionHandle,
    SessionSettings, SessionState, TransportHandle, TransportPort,
};
use crate::errors::{CoreError, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

/// Per-profile session bookkeeping. The transport handle lives here and
/// nowhere else; everything outside the manager works with borrowed clones.
struct SessionRecord {
    state: SessionState,
    handle: Option<TransportHandle>,
}

/// SessionManager drives the per-profile session state machine.
///
/// At most one live session exists per profile id. Connect, reconnect and
/// disconnect for the same profile are serialized through a per-profile
/// guard; different profiles proceed independently. Unexpected transport
/// closes trigger a bounded exponential-backoff reconnect before the session
/// falls to `Error`.
pub struct SessionManager {
    registry: Arc<ConnectionRegistry>,
    negotiator: Arc<ProxyNegotiator>,
    transport: Arc<dyn TransportPort>,
    event_bus: Arc<EventBus>,
    settings: SessionSettings,
    acceleration: AccelerationSettings,
    sessions: Mutex<HashMap<String, SessionRecord>>,
    guards: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl SessionManager {
    /// Create the manager and start the background watcher that turns
    /// unexpected transport closes into reconnect attempts.
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        negotiator: Arc<ProxyNegotiator>,
        transport: Arc<dyn TransportPort>,
        event_bus: Arc<EventBus>,
        settings: SessionSettings,
        acceleration: AccelerationSettings,
    ) -> Arc<Self> {
        let close_rx = transport.close_notifications();
        let manager = Arc::new(Self {
            registry,
            negotiator,
            transport,
            event_bus,
            settings,
            acceleration,
            sessions: Mutex::new(HashMap::new()),
            guards: Mutex::new(HashMap::new()),
        });

        Self::spawn_close_watcher(&manager, close_rx);
        manager
    }

    fn spawn_close_watcher(manager: &Arc<Self>, mut rx: broadcast::Receiver<String>) {
        let weak = Arc::downgrade(manager);
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(handle_id) => {
                        let Some(manager) = weak.upgrade() else { break };
                        if let Some(profile_id) = manager.profile_for_handle(&handle_id) {
                            tracing::info!(profile_id, handle_id, "transport closed unexpectedly");
                            tokio::spawn(manager.run_reconnect(profile_id));
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "close notifications lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    /// Open (or return) the session for a profile.
    ///
    /// Idempotent while connected: a second connect returns the existing
    /// handle instead of racing a second session. A connect racing an
    /// in-flight disconnect or automatic reconnect fails with `Conflict`.
    pub async fn connect(&self, profile_id: &str) -> Result<SessionHandle> {
        let guard = self.guard_for(profile_id);
        let _serialized = guard.lock().await;

        match self.snapshot(profile_id) {
            Some((SessionState::Connected, Some(handle))) => {
                return Ok(SessionHandle {
                    profile_id: profile_id.to_string(),
                    transport: handle,
                });
            }
            Some((SessionState::Reconnecting { .. }, _)) => {
                return Err(CoreError::Conflict(format!(
                    "automatic reconnect in progress for {}",
                    profile_id
                )));
            }
            Some((SessionState::Disconnecting, _)) => {
                return Err(CoreError::Conflict(format!(
                    "disconnect in progress for {}",
                    profile_id
                )));
            }
            _ => {}
        }

        let profile = self
            .registry
            .get(profile_id)
            .ok_or_else(|| CoreError::NotFound(format!("Profile not found: {}", profile_id)))?;

        self.open_session(&profile).await
    }

    /// Explicit retry after a failure, or a forced re-dial of a live session.
    /// Rejected from `Idle`/`Closed`.
    pub async fn reconnect(&self, profile_id: &str) -> Result<SessionHandle> {
        let guard = self.guard_for(profile_id);
        let _serialized = guard.lock().await;

        match self.snapshot(profile_id) {
            Some((SessionState::Connected, Some(handle))) => {
                // drop the current transport before re-dialling
                if let Err(e) = self.transport.close(&handle).await {
                    tracing::debug!(profile_id, error = %e, "close before reconnect failed");
                }
            }
            Some((SessionState::Error { .. }, _)) => {}
            _ => {
                return Err(CoreError::Conflict(format!(
                    "reconnect is only valid from a connected or failed session: {}",
                    profile_id
                )));
            }
        }

        let profile = self
            .registry
            .get(profile_id)
            .ok_or_else(|| CoreError::NotFound(format!("Profile not found: {}", profile_id)))?;

        self.open_session(&profile).await
    }

    /// Close the session for a profile. Idempotent: closing an idle or
    /// already-closed session is a no-op.
    pub async fn disconnect(&self, profile_id: &str) -> Result<()> {
        let guard = self.guard_for(profile_id);
        let _serialized = guard.lock().await;

        let handle = {
            let mut sessions = self.lock_sessions();
            match sessions.get_mut(profile_id) {
                None => return Ok(()),
                Some(record) if record.state.is_terminal() => return Ok(()),
                Some(record) if matches!(record.state, SessionState::Idle) => return Ok(()),
                Some(record) => {
                    record.state = SessionState::Disconnecting;
                    record.handle.take()
                }
            }
        };
        self.publish_state(profile_id, SessionState::Disconnecting);

        if let Some(handle) = handle {
            if let Err(e) = self.transport.close(&handle).await {
                tracing::warn!(profile_id, error = %e, "transport close failed");
            }
        }

        self.set_state(profile_id, SessionState::Closed, None);
        self.registry.mark_connected(profile_id, false);
        self.publish_state(profile_id, SessionState::Closed);
        Ok(())
    }

    /// Current state; `Idle` for profiles that never connected.
    pub fn state(&self, profile_id: &str) -> SessionState {
        self.lock_sessions()
            .get(profile_id)
            .map(|r| r.state.clone())
            .unwrap_or(SessionState::Idle)
    }

    /// All tracked sessions and their states.
    pub fn states(&self) -> HashMap<String, SessionState> {
        self.lock_sessions()
            .iter()
            .map(|(id, r)| (id.clone(), r.state.clone()))
            .collect()
    }

    /// Borrowed handle for a connected session, or `NoActiveSession`.
    pub fn connected_handle(&self, profile_id: &str) -> Result<SessionHandle> {
        let sessions = self.lock_sessions();
        match sessions.get(profile_id) {
            Some(SessionRecord {
                state: SessionState::Connected,
                handle: Some(handle),
            }) => Ok(SessionHandle {
                profile_id: profile_id.to_string(),
                transport: handle.clone(),
            }),
            _ => Err(CoreError::NoActiveSession(profile_id.to_string())),
        }
    }

    // Shared connect path. Caller holds the per-profile guard.
    async fn open_session(&self, profile: &ConnectionProfile) -> Result<SessionHandle> {
        let profile_id = profile.id.clone();

        self.set_state(&profile_id, SessionState::Connecting, None);
        self.publish_state(&profile_id, SessionState::Connecting);

        let decision = self
            .negotiator
            .select_path(profile, &self.acceleration)
            .await;

        match self.open_transport(profile, &decision).await {
            Ok(handle) => {
                self.set_state(&profile_id, SessionState::Connected, Some(handle.clone()));
                self.registry.mark_connected(&profile_id, true);
                self.publish_state(&profile_id, SessionState::Connected);
                tracing::info!(profile_id, path = ?decision.kind, "session connected");
                Ok(SessionHandle {
                    profile_id,
                    transport: handle,
                })
            }
            Err(e) => {
                let state = SessionState::Error { cause: e.cause() };
                self.set_state(&profile_id, state.clone(), None);
                self.registry.mark_connected(&profile_id, false);
                self.publish_state(&profile_id, state);
                tracing::warn!(profile_id, error = %e, "connect failed");
                Err(e)
            }
        }
    }

    async fn open_transport(
        &self,
        profile: &ConnectionProfile,
        decision: &PathDecision,
    ) -> Result<TransportHandle> {
        match tokio::time::timeout(
            self.settings.connect_timeout(),
            self.transport.open(profile, decision),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(CoreError::Network(format!(
                "connect to {} timed out after {}s",
                profile.endpoint(),
                self.settings.connect_timeout_secs
            ))),
        }
    }

    // Bounded-backoff recovery after an unexpected transport close.
    async fn run_reconnect(self: Arc<Self>, profile_id: String) {
        let policy = self.settings.reconnect.clone();
        let guard = self.guard_for(&profile_id);

        {
            let _serialized = guard.lock().await;
            let mut sessions = self.lock_sessions();
            match sessions.get_mut(&profile_id) {
                Some(record) if matches!(record.state, SessionState::Connected) => {
                    record.handle = None;
                    record.state = SessionState::Reconnecting { attempt: 1 };
                }
                _ => return,
            }
        }
        self.registry.mark_connected(&profile_id, false);
        self.publish_state(&profile_id, SessionState::Reconnecting { attempt: 1 });

        let mut last_cause = "connection lost".to_string();
        for attempt in 1..=policy.max_attempts {
            if attempt > 1 {
                let _serialized = guard.lock().await;
                if !self.advance_reconnect(&profile_id, attempt) {
                    return;
                }
                self.publish_state(&profile_id, SessionState::Reconnecting { attempt });
            }

            // guard released during the backoff so an explicit disconnect
            // can cancel the loop
            tokio::time::sleep(policy.delay(attempt)).await;

            let _serialized = guard.lock().await;
            if !matches!(self.state(&profile_id), SessionState::Reconnecting { attempt: a } if a == attempt)
            {
                return;
            }

            let Some(profile) = self.registry.get(&profile_id) else {
                return;
            };
            let decision = self
                .negotiator
                .select_path(&profile, &self.acceleration)
                .await;
            match self.open_transport(&profile, &decision).await {
                Ok(handle) => {
                    self.set_state(&profile_id, SessionState::Connected, Some(handle));
                    self.registry.mark_connected(&profile_id, true);
                    self.publish_state(&profile_id, SessionState::Connected);
                    tracing::info!(profile_id, attempt, "reconnected");
                    return;
                }
                Err(e) => {
                    tracing::warn!(profile_id, attempt, error = %e, "reconnect attempt failed");
                    last_cause = e.cause();
                }
            }
        }

        let _serialized = guard.lock().await;
        if matches!(self.state(&profile_id), SessionState::Reconnecting { .. }) {
            let state = SessionState::Error { cause: last_cause };
            self.set_state(&profile_id, state.clone(), None);
            self.publish_state(&profile_id, state);
        }
    }

    // Move Reconnecting{n-1} to Reconnecting{n}; false when the state moved
    // on (disconnect or competing transition) and the loop must stop.
    fn advance_reconnect(&self, profile_id: &str, attempt: u32) -> bool {
        let mut sessions = self.lock_sessions();
        match sessions.get_mut(profile_id) {
            Some(record)
                if matches!(record.state, SessionState::Reconnecting { attempt: a } if a + 1 == attempt) =>
            {
                record.state = SessionState::Reconnecting { attempt };
                true
            }
            _ => false,
        }
    }

    fn profile_for_handle(&self, handle_id: &str) -> Option<String> {
        let sessions = self.lock_sessions();
        sessions.iter().find_map(|(profile_id, record)| {
            match (&record.state, &record.handle) {
                (SessionState::Connected, Some(h)) if h.id == handle_id => {
                    Some(profile_id.clone())
                }
                _ => None,
            }
        })
    }

    fn guard_for(&self, profile_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut guards = self.guards.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(
            guards
                .entry(profile_id.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
        )
    }

    fn snapshot(&self, profile_id: &str) -> Option<(SessionState, Option<TransportHandle>)> {
        self.lock_sessions()
            .get(profile_id)
            .map(|r| (r.state.clone(), r.handle.clone()))
    }

    fn set_state(&self, profile_id: &str, state: SessionState, handle: Option<TransportHandle>) {
        let mut sessions = self.lock_sessions();
        let record = sessions
            .entry(profile_id.to_string())
            .or_insert(SessionRecord {
                state: SessionState::Idle,
                handle: None,
            });
        record.state = state;
        record.handle = handle;
    }

    fn publish_state(&self, profile_id: &str, state: SessionState) {
        let cause = match &state {
            SessionState::Error { cause } => Some(cause.clone()),
            _ => None,
        };
        self.event_bus.publish(Event::SessionStateChanged {
            profile_id: profile_id.to_string(),
            state,
            cause,
        });
    }

    fn lock_sessions(&self) -> std::sync::MutexGuard<'_, HashMap<String, SessionRecord>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }
}
