//! NATS messaging layer
//!
//! The rest of the crate only sees the `Connector` and `Transport` traits.
//! `NatsConnector` runs on async-nats; `MemoryFabric` is an in-process
//! fabric for tests and local development.

pub mod client;
pub mod memory;
pub mod transport;

pub use client::{NatsConnector, NatsTransport};
pub use memory::{MemoryFabric, MemoryTransport};
pub use transport::{ConnectRequest, Connector, InboundMessage, MessageStream, Transport, TransportEvent};
