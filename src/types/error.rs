//! Error types for fabric-client
//!
//! Errors raised before a connection exists (`Auth`, `Connection`) are fatal
//! to `init()`. Everything after that is scoped to the operation that caused
//! it.

use std::fmt;

use crate::connection::ConnectionState;

/// Main error type for fabric-client operations
#[derive(Debug, thiserror::Error)]
pub enum FabricError {
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Query error: {0}")]
    Query(#[from] QueryError),

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition {
        from: ConnectionState,
        to: ConnectionState,
    },

    #[error("Not connected")]
    NotConnected,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl FabricError {
    /// True for errors that leave the client without a usable connection
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Auth(_) | Self::Connection(_))
    }

    /// True if this is a query that ran out of time
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Query(QueryError::Timeout { .. }))
    }
}

impl From<TransportError> for FabricError {
    fn from(err: TransportError) -> Self {
        Self::Transport(err.0)
    }
}

/// Credential acquisition failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("no credential strategy configured (token and seed, user and password, or authorization endpoint)")]
    NoStrategy,

    #[error("a signing seed is required")]
    MissingSeed,

    #[error("invalid signing seed: {0}")]
    InvalidSeed(String),

    #[error("no session")]
    NoSession,

    #[error("verification failed")]
    VerificationFailed,

    #[error("authorization service error: {0}")]
    Service(String),
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        Self::Service(err.to_string())
    }
}

/// Request/reply failures, always surfaced to the caller
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    #[error("query on {topic} timed out after {timeout_ms}ms")]
    Timeout { topic: String, timeout_ms: u64 },

    #[error("query on {topic} failed: {cause}")]
    Transport { topic: String, cause: String },

    #[error("reply on {topic} is not valid JSON: {cause}")]
    Decode { topic: String, cause: String },
}

/// Error returned by a topic handler
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct HandlerError(String);

impl HandlerError {
    pub fn new(message: impl fmt::Display) -> Self {
        Self(message.to_string())
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self(message)
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self(message.to_string())
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        Self(format!("JSON error: {err}"))
    }
}

impl From<anyhow::Error> for HandlerError {
    fn from(err: anyhow::Error) -> Self {
        Self(format!("{err:#}"))
    }
}

/// Fault reported by the underlying transport
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct TransportError(pub String);

impl TransportError {
    pub fn new(message: impl fmt::Display) -> Self {
        Self(message.to_string())
    }
}

/// Result type alias for fabric-client operations
pub type Result<T> = std::result::Result<T, FabricError>;
