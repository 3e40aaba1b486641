//! Credential acquisition
//!
//! Turns a `ConnectionConfig` into the `Credential` the transport presents.
//! Static credentials never leave the process; the remote strategy runs the
//! session/verification exchange first. Nothing here touches the transport.

pub mod credential;
pub mod remote;

use std::sync::Arc;
use std::time::Duration;

pub use credential::{key_pair_from_seed, AuthStrategy, Credential};
pub use remote::{
    exchange_token, AuthorizationApi, HttpAuthorizationApi, SessionResponse, TokenResponse,
    VerificationBody, VerificationRequest,
};

use crate::config::ConnectionConfig;
use crate::logging::LogGate;
use crate::types::AuthError;

/// Default timeout for calls to the authorization service
const AUTH_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Produces credentials for the connection manager
#[derive(Clone, Default)]
pub struct Authenticator {
    api: Option<Arc<dyn AuthorizationApi>>,
}

impl Authenticator {
    /// Authenticator that talks HTTP to the configured authorization endpoint
    pub fn new() -> Self {
        Self { api: None }
    }

    /// Use `api` for the remote exchange instead of HTTP
    pub fn with_api(api: Arc<dyn AuthorizationApi>) -> Self {
        Self { api: Some(api) }
    }

    pub async fn obtain_credential(
        &self,
        config: &ConnectionConfig,
        log: &LogGate,
    ) -> Result<Credential, AuthError> {
        let strategy = AuthStrategy::select(config)?;
        log.debug("auth", &format!("Using {} credentials", strategy.name()));

        match strategy {
            AuthStrategy::StaticJwt { token, seed } => Ok(Credential::Jwt {
                jwt: token,
                key_pair: key_pair_from_seed(&seed)?,
            }),
            AuthStrategy::UserPassword { user, password } => {
                Ok(Credential::UserPassword { user, password })
            }
            AuthStrategy::Remote { endpoint, seed } => {
                let key_pair = key_pair_from_seed(&seed)?;
                let api: Arc<dyn AuthorizationApi> = match &self.api {
                    Some(api) => Arc::clone(api),
                    None => Arc::new(HttpAuthorizationApi::new(&endpoint, AUTH_HTTP_TIMEOUT)?),
                };

                log.debug("auth", &format!("Requesting token from {endpoint}"));
                let jwt =
                    exchange_token(api.as_ref(), &key_pair, config.namespace.as_deref(), log)
                        .await?;
                log.info("auth", "Obtained token from authorization service");

                Ok(Credential::Jwt { jwt, key_pair })
            }
        }
    }
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator")
            .field("custom_api", &self.api.is_some())
            .finish()
    }
}
