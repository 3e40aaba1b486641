//! Topic handler contract

use std::future::Future;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::types::HandlerError;

/// What a handler returns: `None` or `{}` means plain success
pub type HandlerResult = Result<Option<Value>, HandlerError>;

/// One inbound message, decoded
#[derive(Debug, Clone, PartialEq)]
pub struct TopicRequest {
    /// Concrete subject the message arrived on
    pub topic: String,
    /// Where the sender waits for the reply, if it wants one
    pub reply_to: Option<String>,
    pub payload: Value,
}

/// Read-only view of an active subscription
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionInfo {
    pub id: u64,
    pub topic: String,
    pub queue_group: Option<String>,
}

#[async_trait]
pub trait TopicHandler: Send + Sync + 'static {
    async fn handle(&self, request: TopicRequest) -> HandlerResult;
}

#[async_trait]
impl<F, Fut> TopicHandler for F
where
    F: Fn(TopicRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    async fn handle(&self, request: TopicRequest) -> HandlerResult {
        (self)(request).await
    }
}
