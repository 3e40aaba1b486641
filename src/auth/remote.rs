//! Remote authorization exchange
//!
//! Proof-of-possession handshake against the token-issuing service:
//!
//! 1. `GET  {endpoint}/authorization/session?requestID=<uuid>` → `{sessionID}`
//! 2. `POST {endpoint}/authorization/verification` with the request
//!    `{requestID, sessionID, namespace, publicKey}` and a signature over its
//!    canonical JSON → `{token}`
//!
//! The service never sees the private key, only a signature over data tied
//! to the session it issued.

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use nkeys::KeyPair;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::logging::LogGate;
use crate::types::AuthError;

/// Reply to session initiation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionResponse {
    #[serde(rename = "sessionID", default)]
    pub session_id: Option<String>,
}

/// The signed part of a verification call. Field order is the canonical
/// serialization order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationRequest {
    #[serde(rename = "requestID")]
    pub request_id: String,
    #[serde(rename = "sessionID")]
    pub session_id: String,
    pub namespace: String,
    #[serde(rename = "publicKey")]
    pub public_key: String,
}

impl VerificationRequest {
    /// Bytes that get signed: compact JSON in declaration order
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, AuthError> {
        serde_json::to_vec(self)
            .map_err(|e| AuthError::Service(format!("Failed to encode verification request: {e}")))
    }
}

/// Body of the verification call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationBody {
    pub request: VerificationRequest,
    /// Base64 signature over `request.canonical_bytes()`
    pub verification: String,
}

/// Reply to verification
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub token: Option<String>,
}

/// The two calls of the authorization service
#[async_trait]
pub trait AuthorizationApi: Send + Sync {
    /// Start a session for `request_id`; `None` if the service issued none
    async fn open_session(&self, request_id: &str) -> Result<Option<String>, AuthError>;

    /// Submit the signed request; `None` if no token was issued
    async fn verify(&self, body: &VerificationBody) -> Result<Option<String>, AuthError>;
}

/// HTTP client for the authorization service
#[derive(Debug, Clone)]
pub struct HttpAuthorizationApi {
    base_url: String,
    client: Client,
}

impl HttpAuthorizationApi {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, AuthError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::Service(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn session_url(&self, request_id: &str) -> String {
        format!(
            "{}/authorization/session?requestID={}",
            self.base_url,
            urlencoding::encode(request_id)
        )
    }

    pub fn verification_url(&self) -> String {
        format!("{}/authorization/verification", self.base_url)
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, AuthError> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(AuthError::Service(format!("{status}: {message}")));
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl AuthorizationApi for HttpAuthorizationApi {
    async fn open_session(&self, request_id: &str) -> Result<Option<String>, AuthError> {
        let response = self.client.get(self.session_url(request_id)).send().await?;
        let session: SessionResponse = Self::handle_response(response).await?;
        Ok(session.session_id)
    }

    async fn verify(&self, body: &VerificationBody) -> Result<Option<String>, AuthError> {
        let response = self
            .client
            .post(self.verification_url())
            .json(body)
            .send()
            .await?;
        let token: TokenResponse = Self::handle_response(response).await?;
        Ok(token.token)
    }
}

/// Run the session + verification exchange, returning the issued token
pub async fn exchange_token(
    api: &dyn AuthorizationApi,
    key_pair: &KeyPair,
    namespace: Option<&str>,
    log: &LogGate,
) -> Result<String, AuthError> {
    let request_id = Uuid::new_v4().to_string();
    log.debug("auth", &format!("Opening authorization session {request_id}"));

    let session_id = api
        .open_session(&request_id)
        .await?
        .filter(|id| !id.is_empty())
        .ok_or(AuthError::NoSession)?;

    let request = VerificationRequest {
        request_id,
        session_id,
        namespace: namespace.unwrap_or_default().to_string(),
        public_key: key_pair.public_key(),
    };

    let signature = key_pair
        .sign(&request.canonical_bytes()?)
        .map_err(|e| AuthError::InvalidSeed(e.to_string()))?;

    log.debug(
        "auth",
        &format!("Submitting verification for session {}", request.session_id),
    );
    let body = VerificationBody {
        request,
        verification: STANDARD.encode(signature),
    };

    api.verify(&body)
        .await?
        .filter(|token| !token.is_empty())
        .ok_or(AuthError::VerificationFailed)
}
