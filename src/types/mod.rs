//! Shared types for fabric-client

pub mod error;

pub use error::{AuthError, FabricError, HandlerError, QueryError, Result, TransportError};
