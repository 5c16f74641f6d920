mod common;

use common::fake_transport::{FakeTransport, OfflineProbe};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tether_core::{
    AdvancedSettings, Credential, Event, EventListener, ProfileDraft, ProtocolKind,
    TransferDirection, TransferRequest, TransferStatus, Workspace,
};

/// Collects transfer events in delivery order.
struct TransferRecorder {
    events: Mutex<Vec<Event>>,
}

impl TransferRecorder {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
        })
    }

    fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }
}

impl EventListener for TransferRecorder {
    fn on_event(&self, event: &Event) {
        match event {
            Event::TransferProgress { .. }
            | Event::TransferCompleted { .. }
            | Event::TransferError { .. }
            | Event::TransferCancelled { .. } => {
                self.events.lock().unwrap().push(event.clone());
            }
            _ => {}
        }
    }
}

struct Harness {
    workspace: Workspace,
    transport: Arc<FakeTransport>,
    recorder: Arc<TransferRecorder>,
    profile_id: String,
    dir: tempfile::TempDir,
}

async fn harness(settings: AdvancedSettings) -> Harness {
    common::init_tracing();
    let transport = FakeTransport::new();
    let workspace = Workspace::new(transport.clone(), Arc::new(OfflineProbe), settings);
    let recorder = TransferRecorder::new();
    workspace.events().subscribe_all(recorder.clone());

    let profile = workspace
        .profiles()
        .create(ProfileDraft::new(
            "storage",
            ProtocolKind::Ssh,
            "storage.example.com",
            22,
            "ops",
            Credential::Password {
                password: "pw".to_string(),
            },
        ))
        .unwrap();
    workspace.sessions().connect(&profile.id).await.unwrap();

    Harness {
        workspace,
        transport,
        recorder,
        profile_id: profile.id,
        dir: tempfile::tempdir().unwrap(),
    }
}

impl Harness {
    async fn local_file(&self, name: &str, size: usize) -> std::path::PathBuf {
        let path = self.dir.path().join(name);
        tokio::fs::write(&path, vec![0x5A; size]).await.unwrap();
        path
    }

    fn upload(&self, path: &std::path::Path) -> TransferRequest {
        TransferRequest {
            direction: TransferDirection::Upload,
            local_path: path.to_path_buf(),
            remote_path: format!("/srv/{}", path.file_name().unwrap().to_string_lossy()),
            expected_size: None,
        }
    }

    fn download(&self, name: &str, expected_size: Option<u64>) -> TransferRequest {
        TransferRequest {
            direction: TransferDirection::Download,
            local_path: self.dir.path().join(name),
            remote_path: format!("/srv/{}", name),
            expected_size,
        }
    }

    async fn wait_for(&self, job_id: &str, status: TransferStatus) {
        for _ in 0..2_000 {
            if self.workspace.transfers().job(job_id).map(|j| j.status) == Some(status) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("job {} never reached {:?}", job_id, status);
    }

    fn count(&self, status: TransferStatus) -> usize {
        self.workspace
            .transfers()
            .jobs()
            .iter()
            .filter(|j| j.status == status)
            .count()
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrency_limit_holds_four_then_promotes_fifo() {
    let h = harness(AdvancedSettings::default()).await;
    h.transport.hold_writes();

    let mut job_ids = Vec::new();
    for i in 0..5 {
        let path = h.local_file(&format!("part-{}.bin", i), 16 * 1024).await;
        let job = h
            .workspace
            .transfers()
            .enqueue(&h.profile_id, h.upload(&path))
            .unwrap();
        job_ids.push(job.id);
    }

    // four jobs take permits and block on the first write; one queues
    for _ in 0..2_000 {
        if h.count(TransferStatus::Running) == 4 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(h.count(TransferStatus::Running), 4);
    assert_eq!(h.count(TransferStatus::Pending), 1);

    h.transport.release_writes();
    for id in &job_ids {
        h.wait_for(id, TransferStatus::Completed).await;
    }
    assert_eq!(h.transport.written_bytes(), 5 * 16 * 1024);
}

#[tokio::test(flavor = "multi_thread")]
async fn large_download_completes_with_a_single_terminal_event() {
    let h = harness(AdvancedSettings::default()).await;
    let total: usize = 10 * 1024 * 1024;
    h.transport.push_download(total, 8192);

    let job = h
        .workspace
        .transfers()
        .enqueue(&h.profile_id, h.download("image.iso", Some(total as u64)))
        .unwrap();
    h.wait_for(&job.id, TransferStatus::Completed).await;

    let done = h.workspace.transfers().job(&job.id).unwrap();
    assert_eq!(done.transferred, total as u64);
    assert_eq!(done.size, Some(total as u64));

    let written = tokio::fs::metadata(h.dir.path().join("image.iso")).await.unwrap();
    assert_eq!(written.len(), total as u64);

    // exactly one terminal event, no progress events after it
    let events = h.recorder.events();
    let completed_at = events
        .iter()
        .position(|e| matches!(e, Event::TransferCompleted { .. }))
        .unwrap();
    assert!(!events[completed_at + 1..]
        .iter()
        .any(|e| matches!(e, Event::TransferProgress { .. })));
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, Event::TransferCompleted { .. }))
            .count(),
        1
    );

    // the progress event right before completion carries the full total
    let final_progress = events[..completed_at]
        .iter()
        .rev()
        .find_map(|e| match e {
            Event::TransferProgress { transferred, progress, .. } => {
                Some((*transferred, *progress))
            }
            _ => None,
        })
        .unwrap();
    assert_eq!(final_progress, (total as u64, 100.0));
}

#[tokio::test(flavor = "multi_thread")]
async fn download_without_expected_size_fixes_size_at_eof() {
    let h = harness(AdvancedSettings::default()).await;
    h.transport.push_download(100_000, 8192);

    let job = h
        .workspace
        .transfers()
        .enqueue(&h.profile_id, h.download("dump.sql", None))
        .unwrap();
    h.wait_for(&job.id, TransferStatus::Completed).await;

    let done = h.workspace.transfers().job(&job.id).unwrap();
    assert_eq!(done.size, Some(100_000));
    assert_eq!(done.transferred, 100_000);
}

#[tokio::test(flavor = "multi_thread")]
async fn stalled_transfer_transitions_to_error() {
    let mut settings = AdvancedSettings::default();
    settings.transfer.stall_timeout_secs = 1;
    let h = harness(settings).await;
    h.transport.stall();

    let job = h
        .workspace
        .transfers()
        .enqueue(&h.profile_id, h.download("frozen.bin", Some(1024)))
        .unwrap();
    h.wait_for(&job.id, TransferStatus::Error).await;

    let failed = h.workspace.transfers().job(&job.id).unwrap();
    assert!(failed.error.unwrap().contains("no progress"));
    assert!(h
        .recorder
        .events()
        .iter()
        .any(|e| matches!(e, Event::TransferError { .. })));
}

#[tokio::test(flavor = "multi_thread")]
async fn cancel_mid_stream_reaches_cancelled() {
    let h = harness(AdvancedSettings::default()).await;
    h.transport.gate_reads();
    h.transport.push_download(1024 * 1024, 8192);

    let job = h
        .workspace
        .transfers()
        .enqueue(&h.profile_id, h.download("partial.bin", Some(1024 * 1024)))
        .unwrap();

    // let a few chunks through, then cancel at a chunk boundary
    h.transport.allow_reads(3);
    h.wait_for(&job.id, TransferStatus::Running).await;
    for _ in 0..200 {
        if h.workspace.transfers().job(&job.id).unwrap().transferred >= 3 * 8192 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    h.workspace.transfers().cancel(&job.id);
    h.transport.allow_reads(1000);
    h.wait_for(&job.id, TransferStatus::Cancelled).await;

    let cancelled = h.workspace.transfers().job(&job.id).unwrap();
    assert!(cancelled.transferred < 1024 * 1024);
    assert!(h
        .recorder
        .events()
        .iter()
        .any(|e| matches!(e, Event::TransferCancelled { .. })));

    // the session the job borrowed is untouched
    assert!(h
        .workspace
        .sessions()
        .connected_handle(&h.profile_id)
        .is_ok());
}
