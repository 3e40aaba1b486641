//! Configuration for fabric-client
//!
//! `ConnectionConfig` is what the library consumes. `ClientArgs` reads it
//! from CLI arguments and environment variables using clap.

use std::fmt;
use std::time::Duration;

use clap::Parser;

use crate::logging::LogLevel;
use crate::types::{FabricError, Result};

/// Default deadline for request/reply calls
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 7500;

/// Default time allowed for the initial TCP/TLS handshake
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);

/// Default grace period for in-flight handlers and the transport drain
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Everything needed to authenticate and connect one service
#[derive(Clone)]
pub struct ConnectionConfig {
    /// Identifies the service in logs and to the server
    pub service_name: String,
    /// Ordered endpoints, `host:port` or `nats://host:port`
    pub servers: Vec<String>,
    /// Static user JWT
    pub token: Option<String>,
    /// Nkey seed signing the server nonce and the remote verification
    pub seed: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    /// Base URL of the token-issuing service
    pub auth_url: Option<String>,
    /// Tag sent along with the remote verification
    pub namespace: Option<String>,
    pub request_timeout: Duration,
    pub connection_timeout: Duration,
    pub drain_timeout: Duration,
    /// `None` keeps the transport's own reconnect policy
    pub max_reconnects: Option<usize>,
    pub log_level: LogLevel,
}

impl ConnectionConfig {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Default::default()
        }
    }

    pub fn with_servers(mut self, servers: Vec<String>) -> Self {
        self.servers = servers;
        self
    }

    pub fn with_jwt(mut self, token: &str, seed: &str) -> Self {
        self.token = Some(token.to_string());
        self.seed = Some(seed.to_string());
        self
    }

    pub fn with_seed(mut self, seed: &str) -> Self {
        self.seed = Some(seed.to_string());
        self
    }

    pub fn with_user_password(mut self, user: &str, password: &str) -> Self {
        self.user = Some(user.to_string());
        self.password = Some(password.to_string());
        self
    }

    pub fn with_auth_url(mut self, url: &str) -> Self {
        self.auth_url = Some(url.to_string());
        self
    }

    pub fn with_namespace(mut self, namespace: &str) -> Self {
        self.namespace = Some(namespace.to_string());
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    pub fn with_max_reconnects(mut self, max: usize) -> Self {
        self.max_reconnects = Some(max);
        self
    }

    pub fn with_log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.service_name.trim().is_empty() {
            return Err(FabricError::Config("service name must not be empty".into()));
        }

        if self.servers.iter().all(|s| s.trim().is_empty()) {
            return Err(FabricError::Config("at least one server is required".into()));
        }

        if self.request_timeout.is_zero() {
            return Err(FabricError::Config("request timeout must be positive".into()));
        }

        if self.connection_timeout.is_zero() {
            return Err(FabricError::Config("connection timeout must be positive".into()));
        }

        Ok(())
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            service_name: "fabric-client".to_string(),
            servers: vec!["127.0.0.1:4222".to_string()],
            token: None,
            seed: None,
            user: None,
            password: None,
            auth_url: None,
            namespace: None,
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            max_reconnects: None,
            log_level: LogLevel::Info,
        }
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("ConnectionConfig")
            .field("service_name", &self.service_name)
            .field("servers", &self.servers)
            .field("token", &redact(&self.token))
            .field("seed", &redact(&self.seed))
            .field("user", &self.user)
            .field("password", &redact(&self.password))
            .field("auth_url", &self.auth_url)
            .field("namespace", &self.namespace)
            .field("request_timeout", &self.request_timeout)
            .field("connection_timeout", &self.connection_timeout)
            .field("drain_timeout", &self.drain_timeout)
            .field("max_reconnects", &self.max_reconnects)
            .field("log_level", &self.log_level)
            .finish()
    }
}

/// fabric-client - service client for the NATS messaging fabric
#[derive(Parser, Debug, Clone)]
#[command(name = "fabric-client")]
#[command(about = "Serve and call topics on a NATS messaging fabric")]
pub struct ClientArgs {
    /// Service name, used for logs, the client name and the ping queue group
    #[arg(long, env = "SERVICE_NAME", default_value = "fabric-client")]
    pub service_name: String,

    /// Log level (error, info, debug, trace)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: LogLevel,

    /// Emit logs as JSON
    #[arg(long, env = "LOG_JSON", default_value = "false")]
    pub log_json: bool,

    /// NATS configuration
    #[command(flatten)]
    pub nats: NatsArgs,

    /// Request/reply deadline in milliseconds
    #[arg(long, env = "NATS_TIMEOUT", default_value_t = DEFAULT_REQUEST_TIMEOUT_MS)]
    pub request_timeout_ms: u64,

    /// Grace period for in-flight handlers and the drain, in milliseconds
    #[arg(long, env = "DRAIN_TIMEOUT_MS", default_value = "30000")]
    pub drain_timeout_ms: u64,
}

/// NATS connection and credential arguments
#[derive(Parser, Debug, Clone)]
pub struct NatsArgs {
    /// NATS server host, or host:port
    #[arg(long, env = "NATS_SERVER", default_value = "127.0.0.1")]
    pub nats_server: String,

    /// Comma-separated cluster hosts; overrides NATS_SERVER when set
    #[arg(long, env = "NATS_CLUSTER")]
    pub nats_cluster: Option<String>,

    /// Port appended to hosts that carry none
    #[arg(long, env = "NATS_PORT", default_value = "4222")]
    pub nats_port: u16,

    /// NATS username (optional)
    #[arg(long, env = "NATS_USER")]
    pub nats_user: Option<String>,

    /// NATS password (optional)
    #[arg(long, env = "NATS_PWD", hide_env_values = true)]
    pub nats_pwd: Option<String>,

    /// Static user JWT (requires NATS_SEED)
    #[arg(long, env = "NATS_JWT", hide_env_values = true)]
    pub nats_jwt: Option<String>,

    /// Nkey seed for nonce signing and remote verification
    #[arg(long, env = "NATS_SEED", hide_env_values = true)]
    pub nats_seed: Option<String>,

    /// Namespace tag sent to the authorization service
    #[arg(long, env = "NATS_NAMESPACE")]
    pub nats_namespace: Option<String>,

    /// Authorization service base URL
    #[arg(long, env = "NATS_AUTH_URL")]
    pub auth_url: Option<String>,

    /// Maximum reconnect attempts (default: transport default)
    #[arg(long, env = "NATS_MAX_RECONNECTS")]
    pub max_reconnects: Option<usize>,
}

impl ClientArgs {
    /// Server endpoints: the cluster list if set, else the single server
    pub fn server_list(&self) -> Vec<String> {
        let port = self.nats.nats_port;
        let with_port = |host: &str| {
            if host.contains(':') {
                host.to_string()
            } else {
                format!("{host}:{port}")
            }
        };

        match self.nats.nats_cluster.as_deref() {
            Some(cluster) if !cluster.trim().is_empty() => cluster
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(with_port)
                .collect(),
            _ => vec![with_port(self.nats.nats_server.trim())],
        }
    }

    /// Build and validate the library configuration
    pub fn into_config(self) -> Result<ConnectionConfig> {
        let servers = self.server_list();
        let config = ConnectionConfig {
            service_name: self.service_name,
            servers,
            token: self.nats.nats_jwt,
            seed: self.nats.nats_seed,
            user: self.nats.nats_user,
            password: self.nats.nats_pwd,
            auth_url: self.nats.auth_url,
            namespace: self.nats.nats_namespace,
            request_timeout: Duration::from_millis(self.request_timeout_ms),
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
            drain_timeout: Duration::from_millis(self.drain_timeout_ms),
            max_reconnects: self.nats.max_reconnects,
            log_level: self.log_level,
        };
        config.validate()?;
        Ok(config)
    }
}
