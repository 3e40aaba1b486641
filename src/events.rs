//! Lifecycle notifications for the hosting service
//!
//! Uses `tokio::sync::broadcast`: every subscriber sees every event published
//! after it subscribed. Publishing with no subscribers is not an error.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;

use crate::connection::ConnectionState;

/// Default broadcast capacity
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Something the hosting service may want to react to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    StateChanged {
        from: ConnectionState,
        to: ConnectionState,
    },
    /// Post-connect transport fault; the fabric handles recovery
    TransportError { message: String },
    /// The transport gave up. The host decides whether to exit.
    ConnectionLost { reason: String },
    TopicRegistered {
        topic: String,
        queue_group: Option<String>,
    },
    TopicDeregistered { topic: String },
    HandlerFailed { topic: String, error: String },
}

impl LifecycleEvent {
    /// Process exit code the host should use, for terminal events
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::StateChanged { to, .. } => to.exit_code(),
            Self::ConnectionLost { .. } => Some(1),
            _ => None,
        }
    }
}

/// Broadcast bus for lifecycle events
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<LifecycleEvent>,
    published: Arc<AtomicU64>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            published: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.sender.subscribe()
    }

    /// Publish an event, returning how many subscribers received it
    pub fn publish(&self, event: LifecycleEvent) -> usize {
        self.published.fetch_add(1, Ordering::Relaxed);
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn events_published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .field("published", &self.events_published())
            .finish()
    }
}
