use crate::application::session_manager::SessionManager;
use crate::domain::{
    Event, EventBus, SessionHandle, TransferDirection, TransferJob, TransferRequest,
    TransferSettings, TransferStatus, TransportPort,
};
use crate::errors::{CoreError, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Instant;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Semaphore;
use tokio::time::timeout;

struct JobSlot {
    job: TransferJob,
    cancel: Arc<AtomicBool>,
}

/// TransferEngine runs upload and download jobs as independent cancellable
/// units under a global concurrency limit.
///
/// Jobs beyond the limit queue in FIFO order (the semaphore is fair). Each
/// running job streams fixed-size chunks through the transport, updating
/// transferred bytes, an EMA-smoothed speed and an ETA; progress events are
/// throttled per job, terminal events always fire. A failure or cancellation
/// of one job never affects another, and the engine never closes the session
/// it borrows.
pub struct TransferEngine {
    sessions: Arc<SessionManager>,
    transport: Arc<dyn TransportPort>,
    event_bus: Arc<EventBus>,
    settings: TransferSettings,
    jobs: Mutex<HashMap<String, JobSlot>>,
    permits: Arc<Semaphore>,
    // handed to spawned job tasks
    self_ref: Weak<Self>,
}

impl TransferEngine {
    pub fn new(
        sessions: Arc<SessionManager>,
        transport: Arc<dyn TransportPort>,
        event_bus: Arc<EventBus>,
        settings: TransferSettings,
    ) -> Arc<Self> {
        let permits = Arc::new(Semaphore::new(settings.max_concurrent.max(1)));
        Arc::new_cyclic(|self_ref| Self {
            sessions,
            transport,
            event_bus,
            settings,
            jobs: Mutex::new(HashMap::new()),
            permits,
            self_ref: self_ref.clone(),
        })
    }

    /// Schedule a transfer against the session of `profile_id`.
    ///
    /// Fails with `NoActiveSession` (and creates no job) unless the session
    /// is currently connected.
    pub fn enqueue(&self, profile_id: &str, request: TransferRequest) -> Result<TransferJob> {
        let handle = self.sessions.connected_handle(profile_id)?;
        let engine = self
            .self_ref
            .upgrade()
            .ok_or_else(|| CoreError::Io("transfer engine shut down".to_string()))?;

        let job = TransferJob::new(&request);
        let cancel = Arc::new(AtomicBool::new(false));
        {
            let mut jobs = self.lock_jobs();
            jobs.insert(
                job.id.clone(),
                JobSlot {
                    job: job.clone(),
                    cancel: Arc::clone(&cancel),
                },
            );
        }

        tracing::info!(job_id = %job.id, file = %job.file_name, direction = ?job.direction, "transfer queued");
        tokio::spawn(engine.run_job(job.id.clone(), handle, request));
        Ok(job)
    }

    /// Request cancellation. `Pending` and `Running` jobs move to `Cancelled`
    /// immediately; the chunk loop observes the flag at the next boundary.
    /// Cancelling a terminal or unknown job is a no-op.
    pub fn cancel(&self, job_id: &str) {
        let transitioned = {
            let mut jobs = self.lock_jobs();
            match jobs.get_mut(job_id) {
                Some(slot) if !slot.job.status.is_terminal() => {
                    slot.cancel.store(true, Ordering::SeqCst);
                    slot.job.status = TransferStatus::Cancelled;
                    slot.job.ended_at = Some(chrono::Utc::now());
                    slot.job.error = Some("transfer cancelled".to_string());
                    true
                }
                _ => false,
            }
        };

        if transitioned {
            tracing::info!(job_id, "transfer cancelled");
            self.event_bus.publish(Event::TransferCancelled {
                job_id: job_id.to_string(),
            });
        }
    }

    pub fn job(&self, job_id: &str) -> Option<TransferJob> {
        self.lock_jobs().get(job_id).map(|s| s.job.clone())
    }

    /// All jobs in the active set, newest first.
    pub fn jobs(&self) -> Vec<TransferJob> {
        let mut jobs: Vec<TransferJob> = self.lock_jobs().values().map(|s| s.job.clone()).collect();
        jobs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        jobs
    }

    /// Drop all terminal jobs from the active set, returning how many were
    /// removed. Transfer history is not retained here.
    pub fn clear_completed(&self) -> usize {
        let mut jobs = self.lock_jobs();
        let before = jobs.len();
        jobs.retain(|_, slot| !slot.job.status.is_terminal());
        before - jobs.len()
    }

    async fn run_job(self: Arc<Self>, job_id: String, handle: SessionHandle, request: TransferRequest) {
        let permit = match Arc::clone(&self.permits).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return,
        };

        // cancelled while queued
        if self.is_terminal(&job_id) {
            drop(permit);
            return;
        }
        self.mark_running(&job_id);

        let mut tracker = ProgressTracker::new(&self.settings);
        let result = match request.direction {
            TransferDirection::Upload => {
                self.run_upload(&job_id, &handle, &request, &mut tracker).await
            }
            TransferDirection::Download => {
                self.run_download(&job_id, &handle, &request, &mut tracker).await
            }
        };
        drop(permit);

        match result {
            Ok(()) => self.finish_completed(&job_id),
            Err(CoreError::Cancelled) => self.finish_cancelled(&job_id),
            Err(e) if self.cancel_requested(&job_id) => {
                // cancellation wins over a failing in-flight chunk
                tracing::debug!(job_id, error = %e, "chunk failed during cancellation");
                self.finish_cancelled(&job_id)
            }
            Err(e) => self.finish_error(&job_id, e),
        }
    }

    async fn run_upload(
        &self,
        job_id: &str,
        handle: &SessionHandle,
        request: &TransferRequest,
        tracker: &mut ProgressTracker,
    ) -> Result<()> {
        let mut file = tokio::fs::File::open(&request.local_path).await?;
        let total = file.metadata().await?.len();
        self.fix_size(job_id, total);

        let stall = self.settings.stall_timeout();
        let mut buf = vec![0u8; self.settings.chunk_size.max(1)];
        loop {
            if self.cancel_requested(job_id) {
                return Err(CoreError::Cancelled);
            }
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }

            let mut offset = 0;
            while offset < n {
                let written = timeout(stall, self.transport.write(&handle.transport, &buf[offset..n]))
                    .await
                    .map_err(|_| stall_error(&self.settings))??;
                if written == 0 {
                    return Err(CoreError::Io("transport accepted no bytes".to_string()));
                }
                offset += written;
                self.record_progress(job_id, written as u64, tracker);
            }
        }

        self.check_complete_size(job_id)
    }

    async fn run_download(
        &self,
        job_id: &str,
        handle: &SessionHandle,
        request: &TransferRequest,
        tracker: &mut ProgressTracker,
    ) -> Result<()> {
        let mut file = tokio::fs::File::create(&request.local_path).await?;
        let stall = self.settings.stall_timeout();

        loop {
            if self.cancel_requested(job_id) {
                return Err(CoreError::Cancelled);
            }
            let chunk = timeout(stall, self.transport.read(&handle.transport))
                .await
                .map_err(|_| stall_error(&self.settings))??;
            match chunk {
                Some(bytes) if !bytes.is_empty() => {
                    file.write_all(&bytes).await?;
                    self.record_progress(job_id, bytes.len() as u64, tracker);
                }
                // zero-length chunks are transport keep-alives
                Some(_) => continue,
                None => break,
            }
        }
        file.flush().await?;

        self.check_complete_size(job_id)
    }

    // EOF reached: fix an unknown size, or verify the stream delivered
    // exactly the expected byte count.
    fn check_complete_size(&self, job_id: &str) -> Result<()> {
        let mut jobs = self.lock_jobs();
        let Some(slot) = jobs.get_mut(job_id) else {
            return Ok(());
        };
        match slot.job.size {
            None => {
                slot.job.size = Some(slot.job.transferred);
                Ok(())
            }
            Some(size) if slot.job.transferred == size => Ok(()),
            Some(size) => Err(CoreError::Io(format!(
                "stream ended at {} of {} expected bytes",
                slot.job.transferred, size
            ))),
        }
    }

    fn record_progress(&self, job_id: &str, bytes: u64, tracker: &mut ProgressTracker) {
        let update = {
            let mut jobs = self.lock_jobs();
            let Some(slot) = jobs.get_mut(job_id) else {
                return;
            };
            if slot.job.status.is_terminal() {
                return;
            }

            slot.job.transferred += bytes;
            let (speed, eta) = tracker.sample(slot.job.transferred, slot.job.size);
            slot.job.speed = speed;
            slot.job.eta = eta;

            tracker.due().then(|| Event::TransferProgress {
                job_id: job_id.to_string(),
                transferred: slot.job.transferred,
                progress: slot.job.progress(),
                speed,
                eta,
            })
        };

        if let Some(event) = update {
            tracker.mark_emitted();
            self.event_bus.publish(event);
        }
    }

    fn mark_running(&self, job_id: &str) {
        let mut jobs = self.lock_jobs();
        if let Some(slot) = jobs.get_mut(job_id) {
            if slot.job.status == TransferStatus::Pending {
                slot.job.status = TransferStatus::Running;
            }
        }
    }

    fn finish_completed(&self, job_id: &str) {
        let event = {
            let mut jobs = self.lock_jobs();
            let Some(slot) = jobs.get_mut(job_id) else {
                return;
            };
            if slot.job.status.is_terminal() {
                return;
            }
            slot.job.status = TransferStatus::Completed;
            slot.job.ended_at = Some(chrono::Utc::now());
            if slot.job.size.is_none() {
                slot.job.size = Some(slot.job.transferred);
            }
            Event::TransferProgress {
                job_id: job_id.to_string(),
                transferred: slot.job.transferred,
                progress: slot.job.progress(),
                speed: slot.job.speed,
                eta: Some(0.0),
            }
        };

        // final progress update, then the terminal event
        self.event_bus.publish(event);
        self.event_bus.publish(Event::TransferCompleted {
            job_id: job_id.to_string(),
        });
        tracing::info!(job_id, "transfer completed");
    }

    fn finish_error(&self, job_id: &str, error: CoreError) {
        let cause = error.cause();
        let transitioned = {
            let mut jobs = self.lock_jobs();
            match jobs.get_mut(job_id) {
                Some(slot) if !slot.job.status.is_terminal() => {
                    slot.job.status = TransferStatus::Error;
                    slot.job.ended_at = Some(chrono::Utc::now());
                    slot.job.error = Some(cause.clone());
                    true
                }
                _ => false,
            }
        };

        if transitioned {
            tracing::warn!(job_id, %cause, "transfer failed");
            self.event_bus.publish(Event::TransferError {
                job_id: job_id.to_string(),
                cause,
            });
        }
    }

    fn finish_cancelled(&self, job_id: &str) {
        let transitioned = {
            let mut jobs = self.lock_jobs();
            match jobs.get_mut(job_id) {
                Some(slot) if !slot.job.status.is_terminal() => {
                    slot.job.status = TransferStatus::Cancelled;
                    slot.job.ended_at = Some(chrono::Utc::now());
                    slot.job.error = Some("transfer cancelled".to_string());
                    true
                }
                _ => false,
            }
        };

        // `cancel` usually already published the terminal event
        if transitioned {
            self.event_bus.publish(Event::TransferCancelled {
                job_id: job_id.to_string(),
            });
        }
    }

    fn fix_size(&self, job_id: &str, total: u64) {
        let mut jobs = self.lock_jobs();
        if let Some(slot) = jobs.get_mut(job_id) {
            if slot.job.size.is_none() {
                slot.job.size = Some(total);
            }
        }
    }

    fn cancel_requested(&self, job_id: &str) -> bool {
        self.lock_jobs()
            .get(job_id)
            .map(|s| s.cancel.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    fn is_terminal(&self, job_id: &str) -> bool {
        self.lock_jobs()
            .get(job_id)
            .map(|s| s.job.status.is_terminal())
            .unwrap_or(true)
    }

    fn lock_jobs(&self) -> std::sync::MutexGuard<'_, HashMap<String, JobSlot>> {
        self.jobs.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn stall_error(settings: &TransferSettings) -> CoreError {
    CoreError::Stall(format!(
        "no progress for {}s",
        settings.stall_timeout_secs
    ))
}

/// Per-job speed/ETA bookkeeping and progress-event throttling.
struct ProgressTracker {
    start: Instant,
    smoothing: f64,
    interval: std::time::Duration,
    speed: f64,
    last_emit: Option<Instant>,
}

impl ProgressTracker {
    fn new(settings: &TransferSettings) -> Self {
        Self {
            start: Instant::now(),
            smoothing: settings.speed_smoothing,
            interval: settings.progress_interval(),
            speed: 0.0,
            last_emit: None,
        }
    }

    /// Fold the current totals into the smoothed speed and derive the ETA.
    fn sample(&mut self, transferred: u64, size: Option<u64>) -> (f64, Option<f64>) {
        let elapsed = self.start.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            let average = transferred as f64 / elapsed;
            self.speed = if self.speed == 0.0 {
                average
            } else {
                self.smoothing * average + (1.0 - self.smoothing) * self.speed
            };
        }

        let eta = match size {
            Some(size) if self.speed > 0.0 && size >= transferred => {
                Some((size - transferred) as f64 / self.speed)
            }
            _ => None,
        };
        (self.speed, eta)
    }

    fn due(&self) -> bool {
        match self.last_emit {
            None => true,
            Some(at) => at.elapsed() >= self.interval,
        }
    }

    fn mark_emitted(&mut self) {
        self.last_emit = Some(Instant::now());
    }
}
