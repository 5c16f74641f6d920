use thiserror::Error;
use std::io;

/// Unified error type for tether-core
///
/// Connection-level failures (`Auth`, `Network`, `HostKey`) additionally
/// surface through `session-state-changed` events with an `Error` state;
/// transfer-level failures (`Stall`, `Io`, `Cancelled`) become terminal job
/// statuses and never cross job boundaries.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("Invalid profile: {0}")]
    Validation(String),

    #[error("Conflicting session operation: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Host key verification failed: {0}")]
    HostKey(String),

    #[error("No active session for profile: {0}")]
    NoActiveSession(String),

    #[error("Transfer stalled: {0}")]
    Stall(String),

    #[error("Transfer cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl From<io::Error> for CoreError {
    fn from(error: io::Error) -> Self {
        CoreError::Io(error.to_string())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(error: serde_json::Error) -> Self {
        CoreError::Config(format!("JSON error: {}", error))
    }
}

/// Result type alias for tether-core
pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    /// Human-readable cause string suitable for direct display in a
    /// session-state or transfer event.
    pub fn cause(&self) -> String {
        self.to_string()
    }

    /// True for failures raised by the transport while connecting.
    pub fn is_connection_failure(&self) -> bool {
        matches!(
            self,
            CoreError::Auth(_) | CoreError::Network(_) | CoreError::HostKey(_)
        )
    }
}
