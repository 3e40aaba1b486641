//! async-nats transport
//!
//! Provides connection setup with credentials and reconnection, plus
//! publish, subscribe and inbox-based request/reply.

use std::sync::Arc;
use std::time::Duration;

use async_nats::{Client, ConnectOptions, Event, ServerAddr, StatusCode};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use tokio::sync::mpsc;

use super::transport::{ConnectRequest, Connector, InboundMessage, MessageStream, Transport, TransportEvent};
use crate::auth::Credential;
use crate::logging::LogGate;
use crate::types::TransportError;

/// Correlation tag for connection-level log lines
const CORRELATION: &str = "nats";

/// Default ping interval for keep-alive
const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(120);

/// Default NATS port when an endpoint has none
pub const DEFAULT_NATS_PORT: u16 = 4222;

/// Connector backed by async-nats
#[derive(Debug, Default, Clone, Copy)]
pub struct NatsConnector;

#[async_trait]
impl Connector for NatsConnector {
    async fn connect(
        &self,
        request: ConnectRequest,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Arc<dyn Transport>, TransportError> {
        let servers = request
            .servers
            .iter()
            .map(|server| {
                server_url(server)
                    .parse::<ServerAddr>()
                    .map_err(|e| TransportError::new(format!("Invalid server address {server}: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let log = request.log;
        log.info(
            CORRELATION,
            &format!("Connecting to NATS at {}", request.servers.join(",")),
        );

        // No retry_on_initial_connect(): a failed first connect fails init().
        // Reconnection still applies once connected.
        let mut options = ConnectOptions::new()
            .name(&request.name)
            .ping_interval(DEFAULT_PING_INTERVAL)
            .connection_timeout(request.connection_timeout)
            .request_timeout(None)
            .event_callback(move |event| {
                let events = events.clone();
                async move {
                    let _ = events.send(transport_event(event));
                }
            });

        if let Some(max) = request.max_reconnects {
            options = options.max_reconnects(max);
        }

        options = match request.credential {
            Credential::Jwt { jwt, key_pair } => options.jwt(jwt, move |nonce| {
                let key_pair = Arc::clone(&key_pair);
                async move { key_pair.sign(&nonce).map_err(async_nats::AuthError::new) }
            }),
            Credential::UserPassword { user, password } => options.user_and_password(user, password),
        };

        let client = options
            .connect(servers.as_slice())
            .await
            .map_err(|e| TransportError::new(format!("Failed to connect: {e}")))?;

        log.debug(
            CORRELATION,
            &format!("NATS handshake complete with {}", request.servers.join(",")),
        );

        Ok(Arc::new(NatsTransport { client, log }))
    }
}

/// Live async-nats connection
#[derive(Clone)]
pub struct NatsTransport {
    client: Client,
    log: LogGate,
}

impl NatsTransport {
    /// Get the underlying NATS client
    pub fn inner(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl Transport for NatsTransport {
    async fn subscribe(
        &self,
        topic: &str,
        queue_group: Option<&str>,
    ) -> Result<MessageStream, TransportError> {
        let subscriber = match queue_group {
            Some(group) => {
                self.client
                    .queue_subscribe(topic.to_string(), group.to_string())
                    .await
            }
            None => self.client.subscribe(topic.to_string()).await,
        }
        .map_err(|e| TransportError::new(format!("Subscribe failed: {e}")))?;

        self.log.debug(
            topic,
            &format!("Subscribed to {topic} (queue group: {queue_group:?})"),
        );

        let stream = subscriber.map(|msg| InboundMessage {
            topic: msg.subject.to_string(),
            reply_to: msg.reply.map(|reply| reply.to_string()),
            payload: msg.payload,
        });

        Ok(Box::pin(stream))
    }

    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), TransportError> {
        self.client
            .publish(topic.to_string(), payload)
            .await
            .map_err(|e| TransportError::new(format!("Publish failed: {e}")))
    }

    async fn request(&self, topic: &str, payload: Bytes) -> Result<Bytes, TransportError> {
        // Subscribe to a private inbox before publishing so the reply cannot
        // race the subscription
        let inbox = self.client.new_inbox();
        let mut replies = self
            .client
            .subscribe(inbox.clone())
            .await
            .map_err(|e| TransportError::new(format!("Subscribe failed: {e}")))?;

        self.client
            .publish_with_reply(topic.to_string(), inbox, payload)
            .await
            .map_err(|e| TransportError::new(format!("Publish failed: {e}")))?;

        while let Some(reply) = replies.next().await {
            // The server answers "no responders" immediately; keep waiting so
            // the caller's deadline decides the outcome
            if reply.status == Some(StatusCode::NO_RESPONDERS) {
                self.log.trace_with(topic, || format!("No responders yet on {topic}"));
                continue;
            }
            return Ok(reply.payload);
        }

        Err(TransportError::new("Reply subscription closed"))
    }

    async fn drain(&self) -> Result<(), TransportError> {
        self.log.debug(CORRELATION, "Draining NATS connection");
        self.client
            .drain()
            .await
            .map_err(|e| TransportError::new(format!("Drain failed: {e}")))
    }
}

/// Normalize `host:port` endpoints to NATS URLs
pub fn server_url(server: &str) -> String {
    let server = server.trim();
    if server.contains("://") {
        server.to_string()
    } else if server.contains(':') {
        format!("nats://{server}")
    } else {
        format!("nats://{server}:{DEFAULT_NATS_PORT}")
    }
}

fn transport_event(event: Event) -> TransportEvent {
    match event {
        Event::Connected => TransportEvent::Connected,
        Event::Disconnected => TransportEvent::Disconnected,
        Event::Draining => TransportEvent::Draining,
        Event::Closed => TransportEvent::Closed,
        other => TransportEvent::Error(other.to_string()),
    }
}
