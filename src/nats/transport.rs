//! Transport capability traits
//!
//! A transport is whatever moves bytes between subjects. The core depends on
//! this capability set only, so the fabric can be swapped for a test double.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::Stream;
use tokio::sync::mpsc;

use crate::auth::Credential;
use crate::logging::LogGate;
use crate::types::TransportError;

/// A message delivered to a subscription
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub topic: String,
    /// Subject the sender waits on for a reply, if any
    pub reply_to: Option<String>,
    pub payload: Bytes,
}

/// Messages for one subscription, in delivery order.
/// Dropping the stream unsubscribes.
pub type MessageStream = Pin<Box<dyn Stream<Item = InboundMessage> + Send>>;

/// Connection status reported by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Connected,
    Disconnected,
    Draining,
    Error(String),
    /// The transport released the connection and will not reconnect
    Closed,
}

/// Everything a connector needs to open a connection
#[derive(Debug, Clone)]
pub struct ConnectRequest {
    /// Client name announced to the server
    pub name: String,
    pub servers: Vec<String>,
    pub credential: Credential,
    pub connection_timeout: Duration,
    pub max_reconnects: Option<usize>,
    /// Gate for the transport's own log output
    pub log: LogGate,
}

/// Opens connections to the fabric
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connect once. Status changes after success are sent on `events`.
    async fn connect(
        &self,
        request: ConnectRequest,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Arc<dyn Transport>, TransportError>;
}

/// A live connection to the fabric
#[async_trait]
pub trait Transport: Send + Sync {
    /// Subscribe to `topic`, competing with other members of `queue_group`
    async fn subscribe(
        &self,
        topic: &str,
        queue_group: Option<&str>,
    ) -> Result<MessageStream, TransportError>;

    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), TransportError>;

    /// Send `payload` and wait for the first reply.
    ///
    /// Implementations need not enforce a deadline; callers race this
    /// against their own timer.
    async fn request(&self, topic: &str, payload: Bytes) -> Result<Bytes, TransportError>;

    /// Flush in-flight work, unsubscribe everything and release the connection
    async fn drain(&self) -> Result<(), TransportError>;
}
