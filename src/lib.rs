pub mod application;
pub mod domain;
pub mod errors;
pub mod infrastructure;

/// Re-export common types
pub use domain::{
    ConnectionProfile, ProfileDraft, ProfilePatch, ProtocolKind, Credential,
    ProxyConfig, ProxyKind, DisplayPrefs, Endpoint, PathDecision, PathKind,
    SessionState, SessionHandle, TransportHandle,
    TransferDirection, TransferJob, TransferRequest, TransferStatus,
    Event, EventBus, EventKind, EventListener, SubscriptionId,
    LatencyProbe, SnapshotStore, TransportPort,
    AccelerationSettings, AdvancedSettings, ReconnectPolicy, SessionSettings,
    TransferSettings, WorkspaceSnapshot,
};

pub use application::{
    CommandHistoryIndex, CommandSpec, ConnectionRegistry, HistoryEntry,
    ProxyNegotiator, SessionManager, TransferEngine, Workspace, COMMAND_CATALOG,
};

pub use infrastructure::TcpLatencyProbe;

pub use errors::{CoreError, Result};
