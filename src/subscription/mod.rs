//! Topic subscriptions and their dispatch loops

mod dispatch;
pub mod handler;
pub mod registry;

pub use handler::{HandlerResult, SubscriptionInfo, TopicHandler, TopicRequest};
pub use registry::SubscriptionRegistry;
