use serde::{Deserialize, Serialize};

/// Direction of a transfer job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransferDirection {
    Upload,
    Download,
}

/// Status of a transfer job.
///
/// Transitions are monotonic: once a job is in a terminal status it never
/// leaves it; a retry is a new job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    Pending,
    Running,
    Completed,
    Error,
    Cancelled,
}

impl TransferStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransferStatus::Completed | TransferStatus::Error | TransferStatus::Cancelled
        )
    }
}

/// Parameters for enqueueing a transfer.
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub direction: TransferDirection,
    /// Path on the local filesystem (source for uploads, destination for
    /// downloads).
    pub local_path: std::path::PathBuf,
    /// Path on the remote side, as understood by the transport.
    pub remote_path: String,
    /// Total size when the caller knows it ahead of time. Downloads without
    /// it report no ETA until completion.
    pub expected_size: Option<u64>,
}

/// One file upload or download operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferJob {
    pub id: String,
    pub direction: TransferDirection,
    pub file_name: String,
    pub local_path: std::path::PathBuf,
    pub remote_path: String,
    /// Total bytes; may be unknown until fixed, never changes afterwards.
    pub size: Option<u64>,
    /// Bytes moved so far; non-decreasing until a terminal status.
    pub transferred: u64,
    pub status: TransferStatus,
    /// Smoothed throughput in bytes per second.
    pub speed: f64,
    /// Estimated seconds remaining; absent while speed or size is unknown.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta: Option<f64>,
    pub started_at: chrono::DateTime<chrono::Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TransferJob {
    pub fn new(request: &TransferRequest) -> Self {
        let file_name = match request.direction {
            TransferDirection::Upload => request
                .local_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned()),
            TransferDirection::Download => request
                .remote_path
                .rsplit('/')
                .next()
                .filter(|n| !n.is_empty())
                .map(str::to_string),
        }
        .unwrap_or_else(|| "unknown".to_string());

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            direction: request.direction,
            file_name,
            local_path: request.local_path.clone(),
            remote_path: request.remote_path.clone(),
            size: request.expected_size,
            transferred: 0,
            status: TransferStatus::Pending,
            speed: 0.0,
            eta: None,
            started_at: chrono::Utc::now(),
            ended_at: None,
            error: None,
        }
    }

    /// Percentage in [0, 100]; 0 while the total size is unknown.
    pub fn progress(&self) -> f64 {
        match self.size {
            Some(size) if size > 0 => {
                ((self.transferred as f64 / size as f64) * 100.0).clamp(0.0, 100.0)
            }
            Some(_) => 100.0,
            None => 0.0,
        }
    }
}
