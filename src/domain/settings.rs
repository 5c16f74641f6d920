use crate::domain::models::{ConnectionProfile, Endpoint};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Acceleration relay configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccelerationSettings {
    pub enabled: bool,
    /// Candidate relays, probed concurrently; list order breaks latency ties.
    pub relays: Vec<Endpoint>,
}

impl Default for AccelerationSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            relays: Vec::new(),
        }
    }
}

/// Transfer engine tuning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransferSettings {
    /// Fixed chunk size in bytes for the streaming loop.
    pub chunk_size: usize,
    /// Global concurrency limit for running jobs.
    pub max_concurrent: usize,
    /// No progress for this long transitions a job to error.
    pub stall_timeout_secs: u64,
    /// Minimum interval between progress events per job, in milliseconds.
    pub progress_interval_ms: u64,
    /// EMA smoothing factor for the speed estimate.
    pub speed_smoothing: f64,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            chunk_size: 8192,
            max_concurrent: 4,
            stall_timeout_secs: 60,
            progress_interval_ms: 100,
            speed_smoothing: 0.3,
        }
    }
}

impl TransferSettings {
    pub fn stall_timeout(&self) -> Duration {
        Duration::from_secs(self.stall_timeout_secs)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }
}

/// Bounded exponential backoff policy for automatic reconnects.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_secs: u64,
    pub factor: u32,
    pub cap_secs: u64,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_secs: 1,
            factor: 2,
            cap_secs: 30,
            max_attempts: 5,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before the given 1-based attempt, capped.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(32);
        let raw = self
            .base_secs
            .saturating_mul(u64::from(self.factor).saturating_pow(exp));
        Duration::from_secs(raw.min(self.cap_secs))
    }
}

/// Session manager timeouts and reconnect policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionSettings {
    pub connect_timeout_secs: u64,
    pub probe_timeout_secs: u64,
    pub reconnect: ReconnectPolicy,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 30,
            probe_timeout_secs: 2,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl SessionSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

/// Compression preference persisted alongside profiles; applied by the
/// transport, not by this crate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompressionSettings {
    pub algorithm: CompressionAlgorithm,
    pub level: u8,
    /// Payloads smaller than this are not worth compressing.
    pub threshold_bytes: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CompressionAlgorithm {
    Gzip,
    Deflate,
    Brotli,
    Lz4,
}

impl Default for CompressionSettings {
    fn default() -> Self {
        Self {
            algorithm: CompressionAlgorithm::Gzip,
            level: 6,
            threshold_bytes: 1024 * 1024,
        }
    }
}

impl CompressionSettings {
    pub fn should_compress(&self, size: u64) -> bool {
        size > self.threshold_bytes
    }
}

/// Keep-alive preference persisted for the transport.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeepAliveSettings {
    pub enabled: bool,
    pub interval_secs: u64,
    pub tcp_no_delay: bool,
}

impl Default for KeepAliveSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 30,
            tcp_no_delay: true,
        }
    }
}

/// Advanced-feature configuration, one record per workspace.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AdvancedSettings {
    #[serde(default)]
    pub acceleration: AccelerationSettings,
    #[serde(default)]
    pub transfer: TransferSettings,
    #[serde(default)]
    pub session: SessionSettings,
    #[serde(default)]
    pub compression: CompressionSettings,
    #[serde(default)]
    pub keep_alive: KeepAliveSettings,
}

/// JSON-serializable record exchanged with the persistence collaborator:
/// saved profiles keyed by id, plus the advanced-feature settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkspaceSnapshot {
    pub profiles: HashMap<String, ConnectionProfile>,
    #[serde(default)]
    pub settings: AdvancedSettings,
}
