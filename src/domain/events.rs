use crate::domain::models::{ConnectionProfile, SessionState};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// Domain events relayed from the core components to the presentation layer.
#[derive(Debug, Clone)]
pub enum Event {
    /// A session transitioned; `cause` is set for `Error` entries.
    SessionStateChanged {
        profile_id: String,
        state: SessionState,
        cause: Option<String>,
    },
    /// Throttled progress update for a running transfer.
    TransferProgress {
        job_id: String,
        transferred: u64,
        progress: f64,
        speed: f64,
        eta: Option<f64>,
    },
    TransferCompleted { job_id: String },
    TransferError { job_id: String, cause: String },
    TransferCancelled { job_id: String },
    /// Command history changed; `profile_id` is absent for global clears.
    HistoryUpdated { profile_id: Option<String> },
    ProfileCreated(ConnectionProfile),
    ProfileUpdated(ConnectionProfile),
    ProfileRemoved(String),
}

/// Event categories for filtered subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    SessionStateChanged,
    TransferProgress,
    TransferCompleted,
    TransferError,
    TransferCancelled,
    HistoryUpdated,
    ProfileCreated,
    ProfileUpdated,
    ProfileRemoved,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::SessionStateChanged { .. } => EventKind::SessionStateChanged,
            Event::TransferProgress { .. } => EventKind::TransferProgress,
            Event::TransferCompleted { .. } => EventKind::TransferCompleted,
            Event::TransferError { .. } => EventKind::TransferError,
            Event::TransferCancelled { .. } => EventKind::TransferCancelled,
            Event::HistoryUpdated { .. } => EventKind::HistoryUpdated,
            Event::ProfileCreated(_) => EventKind::ProfileCreated,
            Event::ProfileUpdated(_) => EventKind::ProfileUpdated,
            Event::ProfileRemoved(_) => EventKind::ProfileRemoved,
        }
    }
}

/// Event listener trait for components that need to react to events
pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &Event);
}

/// Token returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    /// `None` subscribes to every event.
    filter: Option<EventKind>,
    listener: Arc<dyn EventListener>,
}

/// Multi-subscriber event bus.
///
/// Delivery is synchronous, in subscription order. A panicking listener is
/// isolated: the panic is caught, logged, and delivery continues with the
/// remaining subscribers.
#[derive(Default)]
pub struct EventBus {
    subscriptions: RwLock<Vec<Subscription>>,
    next_id: AtomicU64,
}

impl EventBus {
    /// Create a new empty event bus
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for one event kind.
    pub fn subscribe(&self, kind: EventKind, listener: Arc<dyn EventListener>) -> SubscriptionId {
        self.push(Some(kind), listener)
    }

    /// Register a listener for every event.
    pub fn subscribe_all(&self, listener: Arc<dyn EventListener>) -> SubscriptionId {
        self.push(None, listener)
    }

    fn push(&self, filter: Option<EventKind>, listener: Arc<dyn EventListener>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut subs = self.subscriptions.write().unwrap_or_else(|e| e.into_inner());
        subs.push(Subscription { id, filter, listener });
        id
    }

    /// Remove a subscription; unknown tokens are a no-op.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        let mut subs = self.subscriptions.write().unwrap_or_else(|e| e.into_inner());
        subs.retain(|s| s.id != id);
    }

    /// Deliver an event to all matching subscribers in subscription order.
    pub fn publish(&self, event: Event) {
        let listeners: Vec<Arc<dyn EventListener>> = {
            let subs = self.subscriptions.read().unwrap_or_else(|e| e.into_inner());
            subs.iter()
                .filter(|s| s.filter.is_none() || s.filter == Some(event.kind()))
                .map(|s| Arc::clone(&s.listener))
                .collect()
        };

        for listener in listeners {
            let result = catch_unwind(AssertUnwindSafe(|| listener.on_event(&event)));
            if result.is_err() {
                tracing::warn!(kind = ?event.kind(), "event listener panicked, continuing delivery");
            }
        }
    }
}
