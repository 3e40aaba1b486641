//! Connection manager
//!
//! Drives `Uninitialized → Authenticating → Connecting → Connected`, then
//! follows the transport's status stream until shutdown drains the
//! connection or the transport gives up.

use std::sync::Arc;

use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tokio::task::JoinHandle;

use super::state::{ConnectionState, StateMachine};
use crate::auth::Authenticator;
use crate::config::ConnectionConfig;
use crate::events::{EventBus, LifecycleEvent};
use crate::logging::LogGate;
use crate::nats::{ConnectRequest, Connector, Transport, TransportEvent};
use crate::types::{FabricError, Result};

const CORRELATION: &str = "connection";

/// State machine plus the side effects every transition carries
struct Lifecycle {
    machine: StateMachine,
    log: LogGate,
    events: EventBus,
}

impl Lifecycle {
    fn current(&self) -> ConnectionState {
        self.machine.current()
    }

    fn transition(&self, to: ConnectionState) -> Result<ConnectionState> {
        let from = self.machine.transition(to)?;
        self.log.debug(CORRELATION, &format!("State: {from} -> {to}"));
        self.events.publish(LifecycleEvent::StateChanged { from, to });
        Ok(from)
    }

    /// Move to `Failed` unless already terminal
    fn fail(&self) {
        let _ = self.transition(ConnectionState::Failed);
    }
}

/// Sole owner of the transport
pub struct ConnectionManager {
    config: Arc<ConnectionConfig>,
    connector: Arc<dyn Connector>,
    authenticator: Authenticator,
    lifecycle: Arc<Lifecycle>,
    transport: RwLock<Option<Arc<dyn Transport>>>,
    monitor: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionManager {
    pub fn new(
        config: Arc<ConnectionConfig>,
        connector: Arc<dyn Connector>,
        authenticator: Authenticator,
        log: LogGate,
        events: EventBus,
    ) -> Self {
        Self {
            config,
            connector,
            authenticator,
            lifecycle: Arc::new(Lifecycle {
                machine: StateMachine::new(),
                log,
                events,
            }),
            transport: RwLock::new(None),
            monitor: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.lifecycle.current()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.lifecycle.machine.watch()
    }

    /// Authenticate and connect. Fails fast: no retry of the first connect.
    pub async fn init(&self) -> Result<()> {
        let log = &self.lifecycle.log;

        if let Err(e) = self.config.validate() {
            log.error(CORRELATION, &e.to_string());
            self.lifecycle.fail();
            return Err(e);
        }

        self.lifecycle.transition(ConnectionState::Authenticating)?;

        let credential = match self.authenticator.obtain_credential(&self.config, log).await {
            Ok(credential) => credential,
            Err(e) => {
                log.error(CORRELATION, &format!("Authentication failed: {e}"));
                self.lifecycle.fail();
                return Err(e.into());
            }
        };

        self.lifecycle.transition(ConnectionState::Connecting)?;

        let (status_tx, status_rx) = mpsc::unbounded_channel();
        let request = ConnectRequest {
            name: self.config.service_name.clone(),
            servers: self.config.servers.clone(),
            credential,
            connection_timeout: self.config.connection_timeout,
            max_reconnects: self.config.max_reconnects,
            log: log.clone(),
        };

        let transport = match self.connector.connect(request, status_tx).await {
            Ok(transport) => transport,
            Err(e) => {
                log.error(CORRELATION, &format!("Connection failed: {e}"));
                self.lifecycle.fail();
                return Err(FabricError::Connection(e.0));
            }
        };

        *self.transport.write().await = Some(transport);
        // Monitor is in place before Connected is visible to a waiting shutdown
        let handle = tokio::spawn(monitor(status_rx, Arc::clone(&self.lifecycle)));
        *self.monitor.lock().await = Some(handle);

        self.lifecycle.transition(ConnectionState::Connected)?;
        log.info(
            CORRELATION,
            &format!("Connected to {}", self.config.servers.join(",")),
        );

        Ok(())
    }

    /// The live transport, while connected or reconnecting
    pub async fn transport(&self) -> Result<Arc<dyn Transport>> {
        if !self.state().is_live() {
            return Err(FabricError::NotConnected);
        }
        self.transport
            .read()
            .await
            .clone()
            .ok_or(FabricError::NotConnected)
    }

    /// Enter `Draining`. Returns the transport to drain, or `None` when there
    /// is no live connection (never connected, already draining or closed).
    ///
    /// An `init()` still authenticating or connecting is waited out first, so
    /// it cannot reach `Connected` after shutdown has returned.
    pub async fn begin_shutdown(&self) -> Option<Arc<dyn Transport>> {
        let mut states = self.watch_state();
        let _ = states
            .wait_for(|state| {
                !matches!(
                    state,
                    ConnectionState::Authenticating | ConnectionState::Connecting
                )
            })
            .await;

        self.lifecycle.transition(ConnectionState::Draining).ok()?;
        self.transport.read().await.clone()
    }

    /// Drain `transport` and move to `Closed`. Drain failures are logged only.
    pub async fn complete_shutdown(&self, transport: Arc<dyn Transport>) {
        let log = &self.lifecycle.log;

        match tokio::time::timeout(self.config.drain_timeout, transport.drain()).await {
            Ok(Ok(())) => log.debug(CORRELATION, "Connection drained"),
            Ok(Err(e)) => log.error(CORRELATION, &format!("Drain failed: {e}")),
            Err(_) => log.error(
                CORRELATION,
                &format!("Drain timed out after {:?}", self.config.drain_timeout),
            ),
        }

        if let Err(e) = self.lifecycle.transition(ConnectionState::Closed) {
            log.debug(CORRELATION, &e.to_string());
        }

        self.transport.write().await.take();
        if let Some(handle) = self.monitor.lock().await.take() {
            handle.abort();
        }
    }

    /// Drain and close. Returns false when there was nothing to shut down.
    pub async fn shutdown(&self) -> bool {
        match self.begin_shutdown().await {
            Some(transport) => {
                self.complete_shutdown(transport).await;
                true
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("service", &self.config.service_name)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Follow transport status until the connection ends
async fn monitor(mut status: mpsc::UnboundedReceiver<TransportEvent>, lifecycle: Arc<Lifecycle>) {
    use ConnectionState::*;

    while let Some(event) = status.recv().await {
        let current = lifecycle.current();

        match event {
            TransportEvent::Disconnected if current == Connected => {
                if lifecycle.transition(Reconnecting).is_ok() {
                    lifecycle.log.info(CORRELATION, "Disconnected, reconnecting");
                }
            }
            TransportEvent::Connected if current == Reconnecting => {
                if lifecycle.transition(Connected).is_ok() {
                    lifecycle.log.info(CORRELATION, "Reconnected");
                }
            }
            TransportEvent::Error(message) => {
                lifecycle.log.error(CORRELATION, &message);
                lifecycle.events.publish(LifecycleEvent::TransportError { message });
            }
            TransportEvent::Closed if matches!(current, Draining | Closed) => {
                lifecycle.log.debug(CORRELATION, "Transport closed");
            }
            TransportEvent::Closed => {
                let reason = format!("transport closed while {current}");
                lifecycle.log.error(CORRELATION, &format!("Connection lost: {reason}"));
                lifecycle.fail();
                lifecycle.events.publish(LifecycleEvent::ConnectionLost { reason });
            }
            other => {
                lifecycle
                    .log
                    .debug(CORRELATION, &format!("Transport status {other:?} while {current}"));
            }
        }

        if lifecycle.current().is_terminal() {
            break;
        }
    }
}
