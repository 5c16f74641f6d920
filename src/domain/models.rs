use serde::{Deserialize, Serialize};

/// Remote protocol spoken by a connection profile.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolKind {
    Ssh,
    Rdp,
}

/// Credential attached to a profile.
///
/// A tagged choice rather than a pair of optional fields, so "at least one
/// credential present" holds by construction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Credential {
    Password { password: String },
    PrivateKey {
        key: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        passphrase: Option<String>,
    },
}

/// Proxy protocol for user-configured proxies.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProxyKind {
    Http,
    Socks5,
}

/// User-configured proxy attached to a profile.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProxyConfig {
    pub kind: ProxyKind,
    pub host: String,
    pub port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl ProxyConfig {
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(&self.host, self.port)
    }
}

/// Display preferences, per protocol.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DisplayPrefs {
    Terminal {
        rows: u16,
        cols: u16,
        font_size: u16,
        font_family: String,
    },
    Rdp {
        width: u32,
        height: u32,
        color_depth: u8,
        full_screen: bool,
    },
}

impl DisplayPrefs {
    /// Default terminal geometry.
    pub fn terminal() -> Self {
        DisplayPrefs::Terminal {
            rows: 24,
            cols: 80,
            font_size: 14,
            font_family: "monospace".to_string(),
        }
    }

    /// Default remote-desktop geometry.
    pub fn rdp() -> Self {
        DisplayPrefs::Rdp {
            width: 1024,
            height: 768,
            color_depth: 24,
            full_screen: false,
        }
    }

    pub fn default_for(protocol: ProtocolKind) -> Self {
        match protocol {
            ProtocolKind::Ssh => Self::terminal(),
            ProtocolKind::Rdp => Self::rdp(),
        }
    }
}

/// Saved remote-host connection definition.
///
/// `id` is assigned by the registry and immutable afterwards. `is_connected`
/// and `last_connected` are runtime fields maintained by the session manager;
/// they are derived state, never authoritative.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionProfile {
    /// Unique opaque identifier
    pub id: String,
    /// Display name
    pub name: String,
    pub protocol: ProtocolKind,
    /// Hostname or IP address
    pub host: String,
    pub port: u16,
    pub username: String,
    pub credential: Credential,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy: Option<ProxyConfig>,
    pub display: DisplayPrefs,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_connected: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    pub is_connected: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl ConnectionProfile {
    /// Get the connection string in the format username@host
    pub fn connection_string(&self) -> String {
        format!("{}@{}", self.username, self.host)
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(&self.host, self.port)
    }

    /// Record a successful connection on the runtime fields.
    pub fn mark_connected(&mut self, connected: bool) {
        self.is_connected = connected;
        if connected {
            self.last_connected = Some(chrono::Utc::now());
        }
    }
}

/// Fields accepted when creating a profile; the registry assigns the id and
/// stamps the runtime fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileDraft {
    pub name: String,
    pub protocol: ProtocolKind,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub credential: Credential,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy: Option<ProxyConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<DisplayPrefs>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl ProfileDraft {
    pub fn new(
        name: impl Into<String>,
        protocol: ProtocolKind,
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        credential: Credential,
    ) -> Self {
        Self {
            name: name.into(),
            protocol,
            host: host.into(),
            port,
            username: username.into(),
            credential,
            proxy: None,
            display: None,
            group: None,
            tags: Vec::new(),
            color: None,
        }
    }
}

/// Partial update applied to an existing profile; `None` fields are left
/// untouched. The id is immutable and therefore absent here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfilePatch {
    pub name: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub credential: Option<Credential>,
    /// `Some(None)` clears the proxy, `Some(Some(_))` replaces it.
    pub proxy: Option<Option<ProxyConfig>>,
    pub display: Option<DisplayPrefs>,
    pub group: Option<Option<String>>,
    pub tags: Option<Vec<String>>,
    pub color: Option<Option<String>>,
}

/// A host:port pair used for probing and path decisions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Which network path a connection should take.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PathKind {
    Direct,
    Proxy,
    Acceleration,
}

/// Outcome of path negotiation for one connect attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PathDecision {
    pub kind: PathKind,
    /// Proxy or relay endpoint; absent for direct connections.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<Endpoint>,
    /// Set when a configured proxy was unreachable and the decision fell
    /// back to direct instead of failing the connect.
    #[serde(default)]
    pub degraded: bool,
}

impl PathDecision {
    pub fn direct() -> Self {
        Self {
            kind: PathKind::Direct,
            endpoint: None,
            degraded: false,
        }
    }

    pub fn direct_degraded() -> Self {
        Self {
            kind: PathKind::Direct,
            endpoint: None,
            degraded: true,
        }
    }

    pub fn proxy(endpoint: Endpoint) -> Self {
        Self {
            kind: PathKind::Proxy,
            endpoint: Some(endpoint),
            degraded: false,
        }
    }

    pub fn acceleration(endpoint: Endpoint) -> Self {
        Self {
            kind: PathKind::Acceleration,
            endpoint: Some(endpoint),
            degraded: false,
        }
    }
}

/// Lifecycle state of a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
    Disconnecting,
    Closed,
    Error { cause: String },
}

impl SessionState {
    /// A session in a terminal state holds no transport handle.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Error { .. })
    }

    /// States under which a second connect returns the existing session.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SessionState::Connecting | SessionState::Connected | SessionState::Reconnecting { .. }
        )
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Connecting => write!(f, "connecting"),
            SessionState::Connected => write!(f, "connected"),
            SessionState::Reconnecting { attempt } => write!(f, "reconnecting (attempt {})", attempt),
            SessionState::Disconnecting => write!(f, "disconnecting"),
            SessionState::Closed => write!(f, "closed"),
            SessionState::Error { cause } => write!(f, "error: {}", cause),
        }
    }
}

/// Opaque reference to a transport-owned resource.
///
/// An arena-style id, never a raw pointer; the transport resolves it
/// internally. The session manager is the only owner, everything else holds
/// borrowed clones.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct TransportHandle {
    pub id: String,
    pub profile_id: String,
}

impl TransportHandle {
    pub fn new(profile_id: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            profile_id: profile_id.into(),
        }
    }
}

/// Borrowed reference to an open session, handed to the transfer engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    pub profile_id: String,
    pub transport: TransportHandle,
}
