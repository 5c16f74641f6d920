use crate::domain::models::{ConnectionProfile, Endpoint, PathDecision, TransportHandle};
use crate::domain::settings::WorkspaceSnapshot;
use crate::errors::Result;
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::broadcast;

/// TransportPort is the abstract protocol client consumed by the session
/// manager and the transfer engine.
///
/// Implementations own the actual SSH/RDP/SFTP plumbing and resolve
/// `TransportHandle` ids internally. `open` may fail with `Auth`, `Network`
/// or `HostKey`; chunk I/O reports `Network`/`Io`.
#[async_trait]
pub trait TransportPort: Send + Sync {
    /// Establish a connection for the profile over the negotiated path.
    async fn open(
        &self,
        profile: &ConnectionProfile,
        path: &PathDecision,
    ) -> Result<TransportHandle>;

    /// Write one chunk, returning the number of bytes accepted.
    async fn write(&self, handle: &TransportHandle, chunk: &[u8]) -> Result<usize>;

    /// Read the next chunk; `None` signals end of stream.
    async fn read(&self, handle: &TransportHandle) -> Result<Option<Vec<u8>>>;

    /// Release the handle and tear down the connection.
    async fn close(&self, handle: &TransportHandle) -> Result<()>;

    /// Handle ids dropped by the remote side without a local `close`.
    /// The session manager listens here to drive automatic reconnects.
    fn close_notifications(&self) -> broadcast::Receiver<String>;
}

/// Bounded-time reachability and latency check against an endpoint.
#[async_trait]
pub trait LatencyProbe: Send + Sync {
    /// Round-trip estimate for the endpoint, or an error when it is
    /// unreachable within `timeout`.
    async fn probe(&self, endpoint: &Endpoint, timeout: Duration) -> Result<Duration>;
}

/// Persistence collaborator for profiles and advanced-feature settings.
///
/// This crate defines the JSON-serializable schema (`WorkspaceSnapshot`);
/// the storage engine behind it is external.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn load(&self) -> Result<Option<WorkspaceSnapshot>>;

    async fn save(&self, snapshot: &WorkspaceSnapshot) -> Result<()>;
}
