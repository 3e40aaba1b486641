//! Connection lifecycle
//!
//! `ConnectionManager` is the only owner of the transport: it authenticates,
//! connects, watches transport status and drains on shutdown.

pub mod manager;
pub mod state;

pub use manager::ConnectionManager;
pub use state::{ConnectionState, StateMachine};
