//! `tracing` subscriber setup for services using fabric-client

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use super::level::LogLevel;
use crate::types::{FabricError, Result};

/// Default filter when `RUST_LOG` is not set
pub fn default_directives(verbosity: LogLevel) -> String {
    format!("fabric_client={verbosity},async_nats=warn")
}

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over `verbosity`. Fails if a global
/// subscriber is already installed.
pub fn init_tracing(verbosity: LogLevel, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(verbosity)));

    let registry = tracing_subscriber::registry().with(filter);
    let installed = if json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };

    installed.map_err(|e| FabricError::Config(format!("Failed to install tracing subscriber: {e}")))
}
