//! fabric-client - minimal service on the NATS messaging fabric
//!
//! Connects with the configured credentials, answers `<service>.ping` and
//! runs until Ctrl-C or until the connection is lost.

use clap::Parser;
use serde_json::json;
use tracing::{error, info};

use fabric_client::{logging, ClientArgs, FabricClient, TopicRequest};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = ClientArgs::parse();

    logging::init_tracing(args.log_level, args.log_json)?;

    let config = match args.into_config() {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    info!("======================================");
    info!("  fabric-client");
    info!("======================================");
    info!("Service: {}", config.service_name);
    info!("Servers: {}", config.servers.join(","));
    info!("Request timeout: {:?}", config.request_timeout);
    info!("Log level: {}", config.log_level);
    info!("======================================");

    let service = config.service_name.clone();
    let client = FabricClient::new(config);

    if let Err(e) = client.init().await {
        error!("Failed to connect: {}", e);
        std::process::exit(1);
    }

    let ping_topic = format!("{service}.ping");
    client
        .register_topic_handler(
            &ping_topic,
            |request: TopicRequest| async move {
                Ok(Some(json!({ "pong": true, "echo": request.payload })))
            },
            Some(service.as_str()),
        )
        .await?;

    let code = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl-C, shutting down");
            client.shutdown().await;
            0
        }
        code = client.wait_for_termination() => {
            error!("Connection ended, exiting with {}", code);
            client.shutdown().await;
            code
        }
    };

    std::process::exit(code);
}
