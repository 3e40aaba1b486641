//! In-process fabric
//!
//! Routes messages between `MemoryTransport`s the way a NATS server would:
//! subject wildcards (`*`, `>`), one delivery per queue group, and
//! request/reply through private inboxes. Used by the test suite and for
//! running services without a server.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream;
use rand::Rng;
use tokio::sync::mpsc;

use super::transport::{ConnectRequest, Connector, InboundMessage, MessageStream, Transport, TransportEvent};
use crate::auth::Credential;
use crate::types::TransportError;

/// Shared in-memory fabric. Clones refer to the same fabric.
#[derive(Clone, Default)]
pub struct MemoryFabric {
    inner: Arc<FabricState>,
}

#[derive(Default)]
struct FabricState {
    routes: Mutex<Vec<Route>>,
    connections: Mutex<Vec<mpsc::UnboundedSender<TransportEvent>>>,
    credentials: Mutex<Vec<Credential>>,
    published: Mutex<Vec<(String, Bytes)>>,
    connect_failure: Mutex<Option<String>>,
    next_id: AtomicU64,
}

struct Route {
    connection: u64,
    pattern: String,
    queue_group: Option<String>,
    sender: mpsc::UnboundedSender<InboundMessage>,
}

impl MemoryFabric {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following connect attempt fail with `reason`
    pub fn fail_connections_with(&self, reason: impl Into<String>) {
        *lock(&self.inner.connect_failure) = Some(reason.into());
    }

    pub fn allow_connections(&self) {
        *lock(&self.inner.connect_failure) = None;
    }

    /// Number of connect attempts made through the `Connector` impl
    pub fn connect_attempts(&self) -> usize {
        lock(&self.inner.credentials).len()
    }

    /// Credentials presented by each connect attempt, oldest first
    pub fn credentials(&self) -> Vec<Credential> {
        lock(&self.inner.credentials).clone()
    }

    /// Report a status change to every connection opened by the connector
    pub fn emit(&self, event: TransportEvent) {
        lock(&self.inner.connections).retain(|events| events.send(event.clone()).is_ok());
    }

    /// Payloads published to `topic` so far, replies included
    pub fn published_to(&self, topic: &str) -> Vec<Bytes> {
        lock(&self.inner.published)
            .iter()
            .filter(|(subject, _)| subject == topic)
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    /// Total publishes seen, replies included
    pub fn publish_count(&self) -> usize {
        lock(&self.inner.published).len()
    }

    /// Live subscriptions whose pattern is exactly `pattern`
    pub fn subscriber_count(&self, pattern: &str) -> usize {
        let mut routes = lock(&self.inner.routes);
        routes.retain(|route| !route.sender.is_closed());
        routes.iter().filter(|route| route.pattern == pattern).count()
    }

    /// Open a connection directly, bypassing the connector bookkeeping.
    /// Handy for playing the other side of a conversation in tests.
    pub fn transport(&self) -> MemoryTransport {
        MemoryTransport::new(self.clone())
    }

    fn next_id(&self) -> u64 {
        self.inner.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn add_route(
        &self,
        connection: u64,
        pattern: &str,
        queue_group: Option<&str>,
    ) -> mpsc::UnboundedReceiver<InboundMessage> {
        let (sender, receiver) = mpsc::unbounded_channel();
        lock(&self.inner.routes).push(Route {
            connection,
            pattern: pattern.to_string(),
            queue_group: queue_group.map(str::to_string),
            sender,
        });
        receiver
    }

    fn remove_routes(&self, connection: u64) {
        lock(&self.inner.routes).retain(|route| route.connection != connection);
    }

    /// Deliver to every plain subscriber and one member of each queue group
    fn deliver(&self, topic: &str, reply_to: Option<String>, payload: Bytes) -> usize {
        lock(&self.inner.published).push((topic.to_string(), payload.clone()));

        let mut routes = lock(&self.inner.routes);
        routes.retain(|route| !route.sender.is_closed());

        let mut targets: Vec<&Route> = Vec::new();
        let mut groups: HashMap<&str, Vec<&Route>> = HashMap::new();
        for route in routes.iter().filter(|route| subject_matches(&route.pattern, topic)) {
            match route.queue_group.as_deref() {
                Some(group) => groups.entry(group).or_default().push(route),
                None => targets.push(route),
            }
        }

        let mut rng = rand::thread_rng();
        for members in groups.into_values() {
            targets.push(members[rng.gen_range(0..members.len())]);
        }

        let message = InboundMessage {
            topic: topic.to_string(),
            reply_to,
            payload,
        };
        targets
            .into_iter()
            .filter(|route| route.sender.send(message.clone()).is_ok())
            .count()
    }
}

#[async_trait]
impl Connector for MemoryFabric {
    async fn connect(
        &self,
        request: ConnectRequest,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Arc<dyn Transport>, TransportError> {
        lock(&self.inner.credentials).push(request.credential);

        if let Some(reason) = lock(&self.inner.connect_failure).clone() {
            return Err(TransportError::new(reason));
        }

        let _ = events.send(TransportEvent::Connected);
        lock(&self.inner.connections).push(events.clone());

        let mut transport = MemoryTransport::new(self.clone());
        transport.events = Some(events);
        Ok(Arc::new(transport))
    }
}

/// One connection to a `MemoryFabric`
pub struct MemoryTransport {
    fabric: MemoryFabric,
    connection: u64,
    drained: AtomicBool,
    events: Option<mpsc::UnboundedSender<TransportEvent>>,
}

impl MemoryTransport {
    fn new(fabric: MemoryFabric) -> Self {
        let connection = fabric.next_id();
        Self {
            fabric,
            connection,
            drained: AtomicBool::new(false),
            events: None,
        }
    }

    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.drained.load(Ordering::Acquire) {
            Err(TransportError::new("connection closed"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn subscribe(
        &self,
        topic: &str,
        queue_group: Option<&str>,
    ) -> Result<MessageStream, TransportError> {
        self.ensure_open()?;
        let receiver = self.fabric.add_route(self.connection, topic, queue_group);
        Ok(Box::pin(receiver_stream(receiver)))
    }

    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), TransportError> {
        self.ensure_open()?;
        self.fabric.deliver(topic, None, payload);
        Ok(())
    }

    async fn request(&self, topic: &str, payload: Bytes) -> Result<Bytes, TransportError> {
        self.ensure_open()?;

        let inbox = format!("_INBOX.{}", uuid::Uuid::new_v4().simple());
        let mut replies = self.fabric.add_route(self.connection, &inbox, None);
        self.fabric.deliver(topic, Some(inbox), payload);

        // No responder means no reply; the caller's deadline ends the wait
        replies
            .recv()
            .await
            .map(|reply| reply.payload)
            .ok_or_else(|| TransportError::new("connection closed"))
    }

    async fn drain(&self) -> Result<(), TransportError> {
        if self.drained.swap(true, Ordering::AcqRel) {
            return Err(TransportError::new("connection already closed"));
        }

        if let Some(events) = &self.events {
            let _ = events.send(TransportEvent::Draining);
        }
        self.fabric.remove_routes(self.connection);
        if let Some(events) = &self.events {
            let _ = events.send(TransportEvent::Closed);
        }
        Ok(())
    }
}

fn receiver_stream(
    receiver: mpsc::UnboundedReceiver<InboundMessage>,
) -> impl futures_util::Stream<Item = InboundMessage> + Send {
    stream::unfold(receiver, |mut receiver| async move {
        receiver.recv().await.map(|message| (message, receiver))
    })
}

/// NATS subject matching: `*` matches one token, `>` one or more trailing tokens
pub fn subject_matches(pattern: &str, subject: &str) -> bool {
    let mut pattern_tokens = pattern.split('.');
    let mut subject_tokens = subject.split('.');

    loop {
        match (pattern_tokens.next(), subject_tokens.next()) {
            (Some(">"), Some(_)) => return true,
            (Some("*"), Some(_)) => continue,
            (Some(p), Some(s)) if p == s => continue,
            (None, None) => return true,
            _ => return false,
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
