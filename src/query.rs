//! Request/reply with a local deadline

use std::time::Duration;

use serde_json::Value;

use crate::codec;
use crate::logging::LogGate;
use crate::nats::Transport;
use crate::types::{FabricError, QueryError, Result};

#[derive(Debug, Clone)]
pub struct RequestResponder {
    log: LogGate,
    default_timeout: Duration,
}

impl RequestResponder {
    pub fn new(log: LogGate, default_timeout: Duration) -> Self {
        Self {
            log,
            default_timeout,
        }
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Send `payload` to `topic` and wait for one reply.
    ///
    /// `timeout_ms` of `None` or `0` uses the configured default. Every
    /// failure is logged at ERROR and returned.
    pub async fn query(
        &self,
        transport: &dyn Transport,
        topic: &str,
        payload: &Value,
        timeout_ms: Option<u64>,
    ) -> Result<Value> {
        let bytes = codec::encode_object(payload).map_err(|e| {
            self.log.error(topic, &format!("Query on {topic} rejected: {e}"));
            e
        })?;

        let deadline = match timeout_ms {
            Some(ms) if ms > 0 => Duration::from_millis(ms),
            _ => self.default_timeout,
        };

        self.log
            .trace_with(topic, || format!("Query on {topic} ({deadline:?}): {payload}"));

        let outcome = tokio::time::timeout(deadline, transport.request(topic, bytes)).await;

        let result = match outcome {
            Err(_) => Err(QueryError::Timeout {
                topic: topic.to_string(),
                timeout_ms: deadline.as_millis() as u64,
            }),
            Ok(Err(e)) => Err(QueryError::Transport {
                topic: topic.to_string(),
                cause: e.to_string(),
            }),
            Ok(Ok(reply)) => codec::decode(&reply).map_err(|e| QueryError::Decode {
                topic: topic.to_string(),
                cause: e.to_string(),
            }),
        };

        match result {
            Ok(reply) => {
                self.log
                    .trace_with(topic, || format!("Reply on {topic}: {reply}"));
                Ok(reply)
            }
            Err(e) => {
                self.log.error(topic, &e.to_string());
                Err(FabricError::Query(e))
            }
        }
    }
}
