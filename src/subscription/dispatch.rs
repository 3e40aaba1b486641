//! Per-subscription dispatch loop
//!
//! Messages are handled one at a time in arrival order: the next message is
//! not taken until the current reply has been published.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::{FutureExt, StreamExt};
use tokio::sync::watch;

use super::handler::{TopicHandler, TopicRequest};
use crate::codec::{self, normalize_response};
use crate::events::{EventBus, LifecycleEvent};
use crate::logging::LogGate;
use crate::nats::{InboundMessage, MessageStream, Transport};

pub(crate) struct Dispatcher {
    pub topic: String,
    pub transport: Arc<dyn Transport>,
    pub handler: Arc<dyn TopicHandler>,
    pub log: LogGate,
    pub events: EventBus,
}

impl Dispatcher {
    /// Take messages until `stop` fires or the stream ends. Dropping the
    /// stream on return unsubscribes.
    pub async fn run(self, mut messages: MessageStream, mut stop: watch::Receiver<bool>) {
        loop {
            let message = tokio::select! {
                biased;
                _ = stop.changed() => break,
                next = messages.next() => match next {
                    Some(message) => message,
                    None => break,
                },
            };

            self.dispatch(message).await;
        }

        self.log.debug(&self.topic, "Dispatch loop stopped");
    }

    async fn dispatch(&self, message: InboundMessage) {
        let correlation = message.reply_to.as_deref().unwrap_or(&message.topic);

        let payload = match codec::decode(&message.payload) {
            Ok(payload) => payload,
            Err(e) => {
                self.log.error(
                    correlation,
                    &format!("Dropping undecodable message on {}: {e}", message.topic),
                );
                return;
            }
        };

        self.log
            .trace_with(correlation, || format!("Request on {}: {payload}", message.topic));

        let request = TopicRequest {
            topic: message.topic.clone(),
            reply_to: message.reply_to.clone(),
            payload,
        };

        let outcome = AssertUnwindSafe(self.handler.handle(request))
            .catch_unwind()
            .await;

        let response = match outcome {
            Ok(Ok(response)) => normalize_response(response),
            Ok(Err(e)) => return self.handler_failed(correlation, e.message()),
            Err(panic) => return self.handler_failed(correlation, &panic_message(panic)),
        };

        self.log
            .trace_with(correlation, || format!("Response on {}: {response}", message.topic));

        let Some(reply_to) = message.reply_to.as_deref() else {
            return;
        };

        let published = match codec::encode(&response) {
            Ok(bytes) => self.transport.publish(reply_to, bytes).await.map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        if let Err(e) = published {
            self.log
                .error(correlation, &format!("Failed to reply on {}: {e}", message.topic));
        }
    }

    fn handler_failed(&self, correlation: &str, error: &str) {
        self.log
            .error(correlation, &format!("Handler for {} failed: {error}", self.topic));
        self.events.publish(LifecycleEvent::HandlerFailed {
            topic: self.topic.clone(),
            error: error.to_string(),
        });
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("panicked: {message}")
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("panicked: {message}")
    } else {
        "panicked".to_string()
    }
}
