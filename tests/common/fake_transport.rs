//! Deterministic in-process stand-ins for the transport and probe ports.
//!
//! `FakeTransport` lets integration tests exercise the real async machinery
//! (session state machine, reconnect watcher, transfer chunk loops) without
//! a network:
//!
//! * script connect failures with `fail_next_opens`,
//! * simulate a dropped connection with `drop_connection`,
//! * feed download data with `push_download_chunks`, optionally gating each
//!   chunk behind `allow_reads` for step-by-step control,
//! * hold uploads at the first write with `hold_writes`/`release_writes`,
//! * freeze all chunk I/O with `stall` to trigger stall detection.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::collections::VecDeque;
use tether_core::domain::{
    ConnectionProfile, Endpoint, LatencyProbe, PathDecision, TransportHandle, TransportPort,
};
use tether_core::errors::{CoreError, Result};
use tokio::sync::{broadcast, Semaphore};

pub struct FakeTransport {
    opens: AtomicUsize,
    fail_opens_remaining: AtomicUsize,
    close_tx: broadcast::Sender<String>,

    /// Chunks served to `read`, in order; `None` EOF follows the last one.
    download_chunks: Mutex<VecDeque<Vec<u8>>>,
    /// When gating is on, each `read` consumes one permit first.
    read_gate: Semaphore,
    gate_reads: AtomicBool,

    /// Every chunk written through the transport, for assertions.
    pub written: Mutex<Vec<Vec<u8>>>,
    writes_held: AtomicBool,

    /// When set, chunk I/O pends forever so stall detection fires.
    stalled: AtomicBool,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        let (close_tx, _) = broadcast::channel(64);
        Arc::new(Self {
            opens: AtomicUsize::new(0),
            fail_opens_remaining: AtomicUsize::new(0),
            close_tx,
            download_chunks: Mutex::new(VecDeque::new()),
            read_gate: Semaphore::new(0),
            gate_reads: AtomicBool::new(false),
            written: Mutex::new(Vec::new()),
            writes_held: AtomicBool::new(false),
            stalled: AtomicBool::new(false),
        })
    }

    /// Make the next `n` opens fail with a network error.
    pub fn fail_next_opens(&self, n: usize) {
        self.fail_opens_remaining.store(n, Ordering::SeqCst);
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Simulate the remote side dropping the connection.
    pub fn drop_connection(&self, handle_id: &str) {
        let _ = self.close_tx.send(handle_id.to_string());
    }

    /// Queue `total` bytes of download data, split into `chunk` byte reads.
    pub fn push_download(&self, total: usize, chunk: usize) {
        let mut chunks = self.download_chunks.lock().unwrap();
        let mut remaining = total;
        while remaining > 0 {
            let size = remaining.min(chunk);
            chunks.push_back(vec![0xAB; size]);
            remaining -= size;
        }
    }

    /// Require a permit per read; `allow_reads` grants them.
    pub fn gate_reads(&self) {
        self.gate_reads.store(true, Ordering::SeqCst);
    }

    pub fn allow_reads(&self, n: usize) {
        self.read_gate.add_permits(n);
    }

    pub fn hold_writes(&self) {
        self.writes_held.store(true, Ordering::SeqCst);
    }

    pub fn release_writes(&self) {
        self.writes_held.store(false, Ordering::SeqCst);
    }

    /// Freeze chunk I/O so no transfer makes progress.
    pub fn stall(&self) {
        self.stalled.store(true, Ordering::SeqCst);
    }

    pub fn written_bytes(&self) -> usize {
        self.written.lock().unwrap().iter().map(Vec::len).sum()
    }
}

#[async_trait]
impl TransportPort for FakeTransport {
    async fn open(
        &self,
        profile: &ConnectionProfile,
        _path: &PathDecision,
    ) -> Result<TransportHandle> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let should_fail = self
            .fail_opens_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(CoreError::Network(format!(
                "connection refused: {}",
                profile.endpoint()
            )));
        }
        Ok(TransportHandle::new(&profile.id))
    }

    async fn write(&self, _handle: &TransportHandle, chunk: &[u8]) -> Result<usize> {
        if self.stalled.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        while self.writes_held.load(Ordering::SeqCst) {
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }
        self.written.lock().unwrap().push(chunk.to_vec());
        Ok(chunk.len())
    }

    async fn read(&self, _handle: &TransportHandle) -> Result<Option<Vec<u8>>> {
        if self.stalled.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.gate_reads.load(Ordering::SeqCst) {
            let permit = self
                .read_gate
                .acquire()
                .await
                .map_err(|_| CoreError::Network("transport shut down".to_string()))?;
            permit.forget();
        }
        Ok(self.download_chunks.lock().unwrap().pop_front())
    }

    async fn close(&self, _handle: &TransportHandle) -> Result<()> {
        Ok(())
    }

    fn close_notifications(&self) -> broadcast::Receiver<String> {
        self.close_tx.subscribe()
    }
}

/// Probe that always fails, forcing direct path decisions.
pub struct OfflineProbe;

#[async_trait]
impl LatencyProbe for OfflineProbe {
    async fn probe(&self, endpoint: &Endpoint, _timeout: std::time::Duration) -> Result<std::time::Duration> {
        Err(CoreError::Network(format!("unreachable: {}", endpoint)))
    }
}
