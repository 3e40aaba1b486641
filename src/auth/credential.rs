//! Transport credentials and the strategy that produces them

use std::fmt;
use std::sync::Arc;

use nkeys::KeyPair;

use crate::config::ConnectionConfig;
use crate::types::AuthError;

/// What the transport presents when connecting
#[derive(Clone)]
pub enum Credential {
    /// User JWT plus the nkey that answers the server's nonce challenge
    Jwt { jwt: String, key_pair: Arc<KeyPair> },
    UserPassword { user: String, password: String },
}

impl Credential {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Jwt { .. } => "jwt",
            Self::UserPassword { .. } => "user-password",
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Jwt { key_pair, .. } => f
                .debug_struct("Jwt")
                .field("jwt", &"<redacted>")
                .field("public_key", &key_pair.public_key())
                .finish(),
            Self::UserPassword { user, .. } => f
                .debug_struct("UserPassword")
                .field("user", user)
                .field("password", &"<redacted>")
                .finish(),
        }
    }
}

/// How credentials will be obtained for a given configuration.
/// Exactly one strategy applies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthStrategy {
    StaticJwt { token: String, seed: String },
    UserPassword { user: String, password: String },
    Remote { endpoint: String, seed: String },
}

impl AuthStrategy {
    /// Pick the strategy: static token, then remote, then user/password
    pub fn select(config: &ConnectionConfig) -> Result<Self, AuthError> {
        let seed = non_empty(&config.seed);

        if let Some(token) = non_empty(&config.token) {
            let seed = seed.ok_or(AuthError::MissingSeed)?;
            return Ok(Self::StaticJwt { token, seed });
        }

        if let Some(endpoint) = non_empty(&config.auth_url) {
            let seed = seed.ok_or(AuthError::MissingSeed)?;
            return Ok(Self::Remote { endpoint, seed });
        }

        if let Some(user) = non_empty(&config.user) {
            return Ok(Self::UserPassword {
                user,
                password: config.password.clone().unwrap_or_default(),
            });
        }

        Err(AuthError::NoStrategy)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::StaticJwt { .. } => "static-jwt",
            Self::UserPassword { .. } => "user-password",
            Self::Remote { .. } => "remote",
        }
    }
}

/// Parse an nkey seed (`SU...`)
pub fn key_pair_from_seed(seed: &str) -> Result<Arc<KeyPair>, AuthError> {
    KeyPair::from_seed(seed.trim())
        .map(Arc::new)
        .map_err(|e| AuthError::InvalidSeed(e.to_string()))
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
