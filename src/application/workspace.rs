use crate::application::command_history::CommandHistoryIndex;
use crate::application::path_negotiator::ProxyNegotiator;
use crate::application::profile_registry::ConnectionRegistry;
use crate::application::session_manager::SessionManager;
use crate::application::transfer_engine::TransferEngine;
use crate::domain::{
    AdvancedSettings, EventBus, LatencyProbe, SnapshotStore, TransportPort, WorkspaceSnapshot,
};
use crate::errors::Result;
use std::sync::Arc;

/// Workspace wires the core components together behind one entry point.
///
/// Callers provide the transport and probe implementations plus settings;
/// the workspace owns the event bus, registry, session manager, transfer
/// engine and command history, and keeps cross-component rules (such as
/// closing a session before its profile is deleted) in one place.
pub struct Workspace {
    event_bus: Arc<EventBus>,
    registry: Arc<ConnectionRegistry>,
    sessions: Arc<SessionManager>,
    transfers: Arc<TransferEngine>,
    history: Arc<CommandHistoryIndex>,
    store: Option<Arc<dyn SnapshotStore>>,
    settings: AdvancedSettings,
}

impl Workspace {
    pub fn new(
        transport: Arc<dyn TransportPort>,
        probe: Arc<dyn LatencyProbe>,
        settings: AdvancedSettings,
    ) -> Self {
        Self::build(transport, probe, settings, None)
    }

    /// Workspace with a persistence collaborator for `save` and `restore`.
    pub fn with_store(
        transport: Arc<dyn TransportPort>,
        probe: Arc<dyn LatencyProbe>,
        settings: AdvancedSettings,
        store: Arc<dyn SnapshotStore>,
    ) -> Self {
        Self::build(transport, probe, settings, Some(store))
    }

    /// Build a workspace from a persisted snapshot: settings come from the
    /// store when a snapshot exists, and saved profiles are seeded into the
    /// registry.
    pub async fn load(
        transport: Arc<dyn TransportPort>,
        probe: Arc<dyn LatencyProbe>,
        store: Arc<dyn SnapshotStore>,
    ) -> Result<Self> {
        let snapshot = store.load().await?.unwrap_or_default();
        let workspace = Self::build(transport, probe, snapshot.settings, Some(store));
        workspace
            .registry
            .replace_all(snapshot.profiles.into_values().collect());
        Ok(workspace)
    }

    fn build(
        transport: Arc<dyn TransportPort>,
        probe: Arc<dyn LatencyProbe>,
        settings: AdvancedSettings,
        store: Option<Arc<dyn SnapshotStore>>,
    ) -> Self {
        let event_bus = Arc::new(EventBus::new());
        let registry = Arc::new(ConnectionRegistry::new(event_bus.clone()));
        let negotiator = Arc::new(ProxyNegotiator::new(probe, &settings.session));
        let sessions = SessionManager::new(
            registry.clone(),
            negotiator,
            transport.clone(),
            event_bus.clone(),
            settings.session.clone(),
            settings.acceleration.clone(),
        );
        let transfers = TransferEngine::new(
            sessions.clone(),
            transport,
            event_bus.clone(),
            settings.transfer.clone(),
        );
        let history = Arc::new(CommandHistoryIndex::new(event_bus.clone()));

        Self {
            event_bus,
            registry,
            sessions,
            transfers,
            history,
            store,
            settings,
        }
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub fn profiles(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    pub fn transfers(&self) -> &Arc<TransferEngine> {
        &self.transfers
    }

    pub fn history(&self) -> &Arc<CommandHistoryIndex> {
        &self.history
    }

    pub fn settings(&self) -> &AdvancedSettings {
        &self.settings
    }

    /// Remove a profile, closing any live session for it first so no
    /// transport handle outlives its profile.
    pub async fn delete_profile(&self, profile_id: &str) -> Result<()> {
        self.sessions.disconnect(profile_id).await?;
        self.registry.delete(profile_id)
    }

    /// Current persistable view of the workspace.
    pub fn snapshot(&self) -> WorkspaceSnapshot {
        WorkspaceSnapshot {
            profiles: self
                .registry
                .list()
                .into_iter()
                .map(|p| (p.id.clone(), p))
                .collect(),
            settings: self.settings.clone(),
        }
    }

    /// Replace the profile catalog from a snapshot. Runtime connection
    /// flags never survive a restore; settings are applied at construction
    /// (see `load`), not here.
    pub fn restore(&self, snapshot: WorkspaceSnapshot) {
        self.registry
            .replace_all(snapshot.profiles.into_values().collect());
    }

    /// Persist the current snapshot through the configured store.
    pub async fn save(&self) -> Result<()> {
        match &self.store {
            Some(store) => store.save(&self.snapshot()).await,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        ConnectionProfile, Credential, Endpoint, PathDecision, ProfileDraft, ProtocolKind,
        SessionState, TransportHandle,
    };
    use crate::errors::CoreError;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::broadcast;

    struct NoProbe;

    #[async_trait]
    impl LatencyProbe for NoProbe {
        async fn probe(&self, endpoint: &Endpoint, _timeout: Duration) -> Result<Duration> {
            Err(CoreError::Network(format!("unreachable: {}", endpoint)))
        }
    }

    struct NullTransport {
        close_tx: broadcast::Sender<String>,
    }

    impl NullTransport {
        fn new() -> Arc<Self> {
            let (close_tx, _) = broadcast::channel(16);
            Arc::new(Self { close_tx })
        }
    }

    #[async_trait]
    impl TransportPort for NullTransport {
        async fn open(
            &self,
            profile: &ConnectionProfile,
            _path: &PathDecision,
        ) -> Result<TransportHandle> {
            Ok(TransportHandle::new(&profile.id))
        }

        async fn write(&self, _handle: &TransportHandle, chunk: &[u8]) -> Result<usize> {
            Ok(chunk.len())
        }

        async fn read(&self, _handle: &TransportHandle) -> Result<Option<Vec<u8>>> {
            Ok(None)
        }

        async fn close(&self, _handle: &TransportHandle) -> Result<()> {
            Ok(())
        }

        fn close_notifications(&self) -> broadcast::Receiver<String> {
            self.close_tx.subscribe()
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        snapshot: Mutex<Option<WorkspaceSnapshot>>,
    }

    #[async_trait]
    impl SnapshotStore for MemoryStore {
        async fn load(&self) -> Result<Option<WorkspaceSnapshot>> {
            Ok(self.snapshot.lock().unwrap().clone())
        }

        async fn save(&self, snapshot: &WorkspaceSnapshot) -> Result<()> {
            *self.snapshot.lock().unwrap() = Some(snapshot.clone());
            Ok(())
        }
    }

    fn draft(name: &str) -> ProfileDraft {
        ProfileDraft::new(
            name,
            ProtocolKind::Ssh,
            "host.example.com",
            22,
            "ops",
            Credential::Password {
                password: "pw".to_string(),
            },
        )
    }

    #[tokio::test]
    async fn delete_profile_closes_the_session_first() {
        let workspace = Workspace::new(
            NullTransport::new(),
            Arc::new(NoProbe),
            AdvancedSettings::default(),
        );
        let profile = workspace.profiles().create(draft("box")).unwrap();
        workspace.sessions().connect(&profile.id).await.unwrap();

        workspace.delete_profile(&profile.id).await.unwrap();
        assert!(workspace.profiles().get(&profile.id).is_none());
        assert!(matches!(
            workspace.sessions().state(&profile.id),
            SessionState::Closed
        ));
    }

    #[tokio::test]
    async fn delete_profile_without_session_still_deletes() {
        let workspace = Workspace::new(
            NullTransport::new(),
            Arc::new(NoProbe),
            AdvancedSettings::default(),
        );
        let profile = workspace.profiles().create(draft("idle")).unwrap();
        workspace.delete_profile(&profile.id).await.unwrap();
        assert!(workspace.profiles().list().is_empty());
    }

    #[tokio::test]
    async fn save_and_load_round_trip_profiles() {
        let store = Arc::new(MemoryStore::default());
        let workspace = Workspace::with_store(
            NullTransport::new(),
            Arc::new(NoProbe),
            AdvancedSettings::default(),
            store.clone(),
        );
        let profile = workspace.profiles().create(draft("saved")).unwrap();
        workspace.sessions().connect(&profile.id).await.unwrap();
        workspace.save().await.unwrap();

        let restored =
            Workspace::load(NullTransport::new(), Arc::new(NoProbe), store).await.unwrap();
        let loaded = restored.profiles().get(&profile.id).unwrap();
        assert_eq!(loaded.name, "saved");
        // live flags never survive a restart
        assert!(!loaded.is_connected);
        assert!(matches!(
            restored.sessions().state(&profile.id),
            SessionState::Idle
        ));
    }

    #[tokio::test]
    async fn load_without_a_snapshot_starts_empty() {
        let restored = Workspace::load(
            NullTransport::new(),
            Arc::new(NoProbe),
            Arc::new(MemoryStore::default()),
        )
        .await
        .unwrap();
        assert!(restored.profiles().list().is_empty());
    }
}
