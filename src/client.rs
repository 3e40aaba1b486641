//! Service-facing client
//!
//! `FabricClient` wires the connection manager, subscription registry and
//! request/reply layer together behind one handle. The hosting service owns
//! the process: the client reports terminal states, it never exits.

use std::future::Future;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{broadcast, watch};

use crate::auth::{AuthorizationApi, Authenticator};
use crate::codec;
use crate::config::ConnectionConfig;
use crate::connection::{ConnectionManager, ConnectionState};
use crate::events::{EventBus, LifecycleEvent};
use crate::logging::{LogGate, LogLevel, LogSink, TracingSink};
use crate::nats::{Connector, NatsConnector};
use crate::query::RequestResponder;
use crate::subscription::{
    HandlerResult, SubscriptionInfo, SubscriptionRegistry, TopicHandler, TopicRequest,
};
use crate::types::{FabricError, Result};

pub struct FabricClient {
    config: Arc<ConnectionConfig>,
    log: LogGate,
    events: EventBus,
    connection: ConnectionManager,
    subscriptions: SubscriptionRegistry,
    responder: RequestResponder,
}

impl FabricClient {
    /// Client on async-nats, authorizing over HTTP when configured to
    pub fn new(config: ConnectionConfig) -> Self {
        Self::builder(config).build()
    }

    pub fn builder(config: ConnectionConfig) -> FabricClientBuilder {
        FabricClientBuilder::new(config)
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Authenticate and connect
    pub async fn init(&self) -> Result<()> {
        self.connection.init().await
    }

    /// Stop taking messages, let in-flight handlers finish, drain, close.
    /// Safe to call at any time and more than once. A concurrent `init()`
    /// is allowed to finish connecting first, then drained.
    pub async fn shutdown(&self) {
        let Some(transport) = self.connection.begin_shutdown().await else {
            self.log.info("shutdown", "Shutdown - not connected");
            self.subscriptions.deregister_all(self.config.drain_timeout).await;
            return;
        };

        self.log.info("shutdown", "Shutting down");
        let deregistered = self
            .subscriptions
            .deregister_all(self.config.drain_timeout)
            .await;
        self.connection.complete_shutdown(transport).await;
        self.log.info(
            "shutdown",
            &format!("Shutdown complete ({deregistered} topic handlers deregistered)"),
        );
    }

    /// Log through the client's level gate. Returns whether it was emitted.
    pub fn log_event(&self, level: LogLevel, correlation: &str, message: &str) -> bool {
        self.log.log_event(level, correlation, message)
    }

    /// Serve `topic` with an async closure.
    ///
    /// Members of the same `queue_group` share the topic's messages; each
    /// message goes to one of them.
    pub async fn register_topic_handler<F, Fut>(
        &self,
        topic: &str,
        handler: F,
        queue_group: Option<&str>,
    ) -> Result<SubscriptionInfo>
    where
        F: Fn(TopicRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.register_handler(topic, Arc::new(handler), queue_group)
            .await
    }

    /// Serve `topic` with a `TopicHandler` implementation
    pub async fn register_handler(
        &self,
        topic: &str,
        handler: Arc<dyn TopicHandler>,
        queue_group: Option<&str>,
    ) -> Result<SubscriptionInfo> {
        let transport = self.live_transport(topic).await?;
        self.subscriptions
            .register(transport, topic, queue_group, handler)
            .await
    }

    /// Deregister every topic handler. Returns how many were removed.
    pub async fn deregister_topic_handlers(&self) -> usize {
        self.subscriptions
            .deregister_all(self.config.drain_timeout)
            .await
    }

    /// Deregister the handlers for one topic
    pub async fn deregister_topic_handler(&self, topic: &str) -> usize {
        self.subscriptions
            .deregister(topic, self.config.drain_timeout)
            .await
    }

    pub async fn subscriptions(&self) -> Vec<SubscriptionInfo> {
        self.subscriptions.subscriptions().await
    }

    /// Fire-and-forget publish of a JSON object
    pub async fn publish_topic(&self, topic: &str, payload: &Value) -> Result<()> {
        let bytes = codec::encode_object(payload)?;
        let transport = self.live_transport(topic).await?;

        self.log
            .trace_with(topic, || format!("Publish on {topic}: {payload}"));

        transport.publish(topic, bytes).await.map_err(|e| {
            self.log
                .error(topic, &format!("Failed to publish on {topic}: {e}"));
            FabricError::from(e)
        })
    }

    /// Request/reply. `timeout_ms` of `None` or `0` uses the configured
    /// request timeout.
    pub async fn query_topic(
        &self,
        topic: &str,
        payload: &Value,
        timeout_ms: Option<u64>,
    ) -> Result<Value> {
        let transport = self.live_transport(topic).await?;
        self.responder
            .query(transport.as_ref(), topic, payload, timeout_ms)
            .await
    }

    /// Lifecycle notifications published after this call
    pub fn events(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.events.subscribe()
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.events
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.connection.watch_state()
    }

    /// Wait until the connection reaches a terminal state and return the
    /// exit code the host process should use: 0 after a clean shutdown,
    /// 1 after a failure.
    pub async fn wait_for_termination(&self) -> i32 {
        let mut rx = self.watch_state();
        let code = match rx.wait_for(ConnectionState::is_terminal).await {
            Ok(state) => state.exit_code(),
            Err(_) => None,
        };
        code.unwrap_or(1)
    }

    async fn live_transport(&self, correlation: &str) -> Result<Arc<dyn crate::nats::Transport>> {
        self.connection.transport().await.map_err(|e| {
            self.log
                .error(correlation, &format!("{e} (state: {})", self.state()));
            e
        })
    }
}

impl std::fmt::Debug for FabricClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FabricClient")
            .field("config", &self.config)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Builder for swapping the connector, authorization service or log sink
pub struct FabricClientBuilder {
    config: ConnectionConfig,
    connector: Arc<dyn Connector>,
    authorization_api: Option<Arc<dyn AuthorizationApi>>,
    log_sink: Arc<dyn LogSink>,
    events: EventBus,
}

impl FabricClientBuilder {
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            connector: Arc::new(NatsConnector),
            authorization_api: None,
            log_sink: Arc::new(TracingSink),
            events: EventBus::new(),
        }
    }

    pub fn connector(mut self, connector: impl Connector + 'static) -> Self {
        self.connector = Arc::new(connector);
        self
    }

    pub fn authorization_api(mut self, api: Arc<dyn AuthorizationApi>) -> Self {
        self.authorization_api = Some(api);
        self
    }

    pub fn log_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.log_sink = sink;
        self
    }

    pub fn event_bus(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn build(self) -> FabricClient {
        let config = Arc::new(self.config);
        let log = LogGate::with_sink(&config.service_name, config.log_level, self.log_sink);

        let authenticator = match self.authorization_api {
            Some(api) => Authenticator::with_api(api),
            None => Authenticator::new(),
        };

        let connection = ConnectionManager::new(
            Arc::clone(&config),
            self.connector,
            authenticator,
            log.clone(),
            self.events.clone(),
        );

        FabricClient {
            subscriptions: SubscriptionRegistry::new(log.clone(), self.events.clone()),
            responder: RequestResponder::new(log.clone(), config.request_timeout),
            connection,
            events: self.events,
            log,
            config,
        }
    }
}
