pub mod models;
pub mod transfer;
pub mod events;
pub mod ports;
pub mod settings;

// Re-export common types
pub use models::{
    ConnectionProfile, ProfileDraft, ProfilePatch, ProtocolKind, Credential,
    ProxyConfig, ProxyKind, DisplayPrefs, Endpoint, PathDecision, PathKind,
    SessionState, SessionHandle, TransportHandle,
};
pub use transfer::{TransferDirection, TransferJob, TransferRequest, TransferStatus};
pub use events::{Event, EventBus, EventKind, EventListener, SubscriptionId};
pub use ports::{LatencyProbe, SnapshotStore, TransportPort};
pub use settings::{
    AccelerationSettings, AdvancedSettings, ReconnectPolicy, SessionSettings,
    TransferSettings, WorkspaceSnapshot,
};
