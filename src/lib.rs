//! fabric-client - service client for the NATS messaging fabric
//!
//! Gives a microservice one handle for everything it does on the fabric:
//! authenticate, connect and watch the connection, serve topics, publish,
//! and make request/reply calls with a deadline.
//!
//! ## Components
//!
//! - **Auth**: static JWT/seed or user/password credentials, or a remote
//!   challenge/verification exchange that yields a short-lived token
//! - **Connection**: lifecycle state machine, status monitor and drain
//! - **Subscriptions**: one dispatch loop per topic handler, replies normalized
//! - **Query**: request/reply with a local deadline
//! - **Logging**: level gate in front of `tracing`
//! - **Events**: lifecycle notifications for the hosting service
//!
//! ## Example
//!
//! ```rust,no_run
//! use fabric_client::{ConnectionConfig, FabricClient, TopicRequest};
//! use serde_json::json;
//!
//! # async fn example() -> fabric_client::Result<()> {
//! let config = ConnectionConfig::new("orders-service")
//!     .with_servers(vec!["127.0.0.1:4222".into()])
//!     .with_user_password("orders", "secret");
//!
//! let client = FabricClient::new(config);
//! client.init().await?;
//!
//! client
//!     .register_topic_handler(
//!         "orders.create",
//!         |request: TopicRequest| async move { Ok(Some(json!({ "accepted": request.payload }))) },
//!         Some("orders-service"),
//!     )
//!     .await?;
//!
//! let reply = client.query_topic("inventory.check", &json!({ "sku": "A-1" }), None).await?;
//! println!("inventory: {reply}");
//!
//! client.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod client;
pub mod codec;
pub mod config;
pub mod connection;
pub mod events;
pub mod logging;
pub mod nats;
pub mod query;
pub mod subscription;
pub mod types;

pub use auth::{AuthorizationApi, Authenticator, Credential, HttpAuthorizationApi};
pub use client::{FabricClient, FabricClientBuilder};
pub use config::{ClientArgs, ConnectionConfig};
pub use connection::{ConnectionManager, ConnectionState};
pub use events::{EventBus, LifecycleEvent};
pub use logging::{LogGate, LogLevel, LogSink};
pub use nats::{Connector, MemoryFabric, NatsConnector, Transport, TransportEvent};
pub use subscription::{HandlerResult, SubscriptionInfo, TopicHandler, TopicRequest};
pub use types::{AuthError, FabricError, HandlerError, QueryError, Result, TransportError};
