//! Subscription registry
//!
//! One entry per registered handler, each with its own dispatch task and a
//! stop signal. Deregistration stops intake and waits for in-flight work;
//! it never cancels a running handler.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use super::dispatch::Dispatcher;
use super::handler::{SubscriptionInfo, TopicHandler};
use crate::events::{EventBus, LifecycleEvent};
use crate::logging::LogGate;
use crate::nats::Transport;
use crate::types::{FabricError, Result};

struct Entry {
    info: SubscriptionInfo,
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

pub struct SubscriptionRegistry {
    log: LogGate,
    events: EventBus,
    next_id: AtomicU64,
    entries: Mutex<Vec<Entry>>,
}

impl SubscriptionRegistry {
    pub fn new(log: LogGate, events: EventBus) -> Self {
        Self {
            log,
            events,
            next_id: AtomicU64::new(1),
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Subscribe `handler` to `topic` and start its dispatch loop.
    /// An empty `queue_group` counts as none.
    pub async fn register(
        &self,
        transport: Arc<dyn Transport>,
        topic: &str,
        queue_group: Option<&str>,
        handler: Arc<dyn TopicHandler>,
    ) -> Result<SubscriptionInfo> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(FabricError::Validation("topic must not be empty".into()));
        }
        let queue_group = queue_group.map(str::trim).filter(|g| !g.is_empty());

        let messages = transport.subscribe(topic, queue_group).await.map_err(|e| {
            self.log
                .error(topic, &format!("Failed to subscribe to {topic}: {e}"));
            FabricError::from(e)
        })?;

        let info = SubscriptionInfo {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            topic: topic.to_string(),
            queue_group: queue_group.map(str::to_string),
        };

        let (stop, stop_rx) = watch::channel(false);
        let dispatcher = Dispatcher {
            topic: info.topic.clone(),
            transport,
            handler,
            log: self.log.clone(),
            events: self.events.clone(),
        };
        let task = tokio::spawn(dispatcher.run(messages, stop_rx));

        self.entries.lock().await.push(Entry {
            info: info.clone(),
            stop,
            task,
        });

        self.log.info(
            topic,
            &format!("Registered topic handler (sid: {}) for: {topic}", info.id),
        );
        self.events.publish(LifecycleEvent::TopicRegistered {
            topic: info.topic.clone(),
            queue_group: info.queue_group.clone(),
        });

        Ok(info)
    }

    /// Deregister every subscription, waiting up to `grace` for in-flight
    /// handlers. Returns how many were deregistered.
    pub async fn deregister_all(&self, grace: Duration) -> usize {
        let entries = std::mem::take(&mut *self.entries.lock().await);
        self.stop(entries, grace).await
    }

    /// Deregister the subscriptions on `topic`
    pub async fn deregister(&self, topic: &str, grace: Duration) -> usize {
        let entries = {
            let mut all = self.entries.lock().await;
            let (matching, rest): (Vec<Entry>, Vec<Entry>) = std::mem::take(&mut *all)
                .into_iter()
                .partition(|entry| entry.info.topic == topic);
            *all = rest;
            matching
        };
        self.stop(entries, grace).await
    }

    pub async fn subscriptions(&self) -> Vec<SubscriptionInfo> {
        self.entries
            .lock()
            .await
            .iter()
            .map(|entry| entry.info.clone())
            .collect()
    }

    async fn stop(&self, entries: Vec<Entry>, grace: Duration) -> usize {
        if entries.is_empty() {
            return 0;
        }

        let mut tasks = Vec::with_capacity(entries.len());
        let mut infos = Vec::with_capacity(entries.len());
        for entry in entries {
            let _ = entry.stop.send(true);
            tasks.push(entry.task);
            infos.push(entry.info);
        }

        if tokio::time::timeout(grace, join_all(tasks)).await.is_err() {
            self.log.error(
                "subscriptions",
                &format!("Handlers still running after {grace:?}; leaving them to finish"),
            );
        }

        for info in &infos {
            self.log
                .info(&info.topic, &format!("Deregistered topic: {}", info.topic));
            self.events.publish(LifecycleEvent::TopicDeregistered {
                topic: info.topic.clone(),
            });
        }

        infos.len()
    }
}

impl std::fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("next_id", &self.next_id)
            .finish_non_exhaustive()
    }
}
