//! Remote authorization over HTTP
//!
//! Runs the session/verification exchange against a mock authorization
//! service and checks what goes over the wire.

mod common;

use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine};
use fabric_client::auth::{exchange_token, VerificationBody};
use fabric_client::{
    AuthError, Authenticator, ConnectionConfig, ConnectionState, Credential, FabricClient,
    FabricError, HttpAuthorizationApi, LogGate, LogLevel, MemoryFabric,
};
use nkeys::KeyPair;
use serde_json::json;
use tokio_test::{assert_err, assert_ok};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::new_seed;

const SESSION_PATH: &str = "/authorization/session";
const VERIFICATION_PATH: &str = "/authorization/verification";

fn log() -> LogGate {
    LogGate::new("orders", LogLevel::Error)
}

fn api(server: &MockServer) -> HttpAuthorizationApi {
    HttpAuthorizationApi::new(&server.uri(), Duration::from_secs(5)).unwrap()
}

async fn mount_session(server: &MockServer, response: ResponseTemplate, calls: u64) {
    Mock::given(method("GET"))
        .and(path(SESSION_PATH))
        .respond_with(response)
        .expect(calls)
        .mount(server)
        .await;
}

async fn mount_verification(server: &MockServer, response: ResponseTemplate, calls: u64) {
    Mock::given(method("POST"))
        .and(path(VERIFICATION_PATH))
        .respond_with(response)
        .expect(calls)
        .mount(server)
        .await;
}

fn json_body(body: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(body)
}

// =============================================================================
// Exchange on the wire
// =============================================================================

#[tokio::test]
async fn test_exchange_sends_signed_request() {
    let server = MockServer::start().await;
    mount_session(&server, json_body(json!({"sessionID": "s-1"})), 1).await;
    mount_verification(&server, json_body(json!({"token": "issued.jwt"})), 1).await;

    let key_pair = KeyPair::new_user();
    let token = assert_ok!(exchange_token(&api(&server), &key_pair, Some("tenant-a"), &log()).await);
    assert_eq!(token, "issued.jwt");

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);

    let session = &requests[0];
    assert_eq!(session.method.as_str(), "GET");
    let request_id = session
        .url
        .query_pairs()
        .find(|(key, _)| key == "requestID")
        .map(|(_, value)| value.into_owned())
        .expect("requestID query parameter");
    assert!(!request_id.is_empty());

    let verification = &requests[1];
    assert_eq!(verification.method.as_str(), "POST");
    let body: VerificationBody = verification.body_json().unwrap();
    assert_eq!(body.request.request_id, request_id);
    assert_eq!(body.request.session_id, "s-1");
    assert_eq!(body.request.namespace, "tenant-a");
    assert_eq!(body.request.public_key, key_pair.public_key());

    let signature = STANDARD.decode(&body.verification).unwrap();
    assert_ok!(key_pair.verify(&body.request.canonical_bytes().unwrap(), &signature));
}

#[tokio::test]
async fn test_missing_namespace_sent_as_empty_string() {
    let server = MockServer::start().await;
    mount_session(&server, json_body(json!({"sessionID": "s-1"})), 1).await;
    mount_verification(&server, json_body(json!({"token": "issued.jwt"})), 1).await;

    assert_ok!(exchange_token(&api(&server), &KeyPair::new_user(), None, &log()).await);

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = requests[1].body_json().unwrap();
    assert_eq!(body["request"]["namespace"], json!(""));
    assert!(body["verification"].is_string());
}

#[tokio::test]
async fn test_error_status_is_service_error() {
    let server = MockServer::start().await;
    mount_session(
        &server,
        ResponseTemplate::new(503).set_body_string("authorization offline"),
        1,
    )
    .await;
    mount_verification(&server, json_body(json!({"token": "issued.jwt"})), 0).await;

    let err = assert_err!(exchange_token(&api(&server), &KeyPair::new_user(), None, &log()).await);
    match err {
        AuthError::Service(message) => {
            assert!(message.contains("503"), "{message}");
            assert!(message.contains("authorization offline"), "{message}");
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn test_verification_error_status_is_service_error() {
    let server = MockServer::start().await;
    mount_session(&server, json_body(json!({"sessionID": "s-1"})), 1).await;
    mount_verification(&server, ResponseTemplate::new(401), 1).await;

    let err = assert_err!(exchange_token(&api(&server), &KeyPair::new_user(), None, &log()).await);
    assert!(matches!(err, AuthError::Service(ref m) if m.contains("401")), "{err:?}");
}

// =============================================================================
// Empty replies through the authenticator
// =============================================================================

fn remote_config(server: &MockServer) -> ConnectionConfig {
    ConnectionConfig::new("orders")
        .with_auth_url(&server.uri())
        .with_seed(&new_seed())
}

#[tokio::test]
async fn test_empty_session_reply_is_no_session() {
    let server = MockServer::start().await;
    mount_session(&server, json_body(json!({})), 1).await;
    mount_verification(&server, json_body(json!({"token": "issued.jwt"})), 0).await;

    let result = Authenticator::new()
        .obtain_credential(&remote_config(&server), &log())
        .await;
    assert_eq!(assert_err!(result), AuthError::NoSession);
}

#[tokio::test]
async fn test_empty_token_reply_is_verification_failure() {
    let server = MockServer::start().await;
    mount_session(&server, json_body(json!({"sessionID": "s-1"})), 1).await;
    mount_verification(&server, json_body(json!({})), 1).await;

    let result = Authenticator::new()
        .obtain_credential(&remote_config(&server), &log())
        .await;
    assert_eq!(assert_err!(result), AuthError::VerificationFailed);
}

#[tokio::test]
async fn test_issued_token_becomes_credential() {
    let server = MockServer::start().await;
    mount_session(&server, json_body(json!({"sessionID": "s-1"})), 1).await;
    mount_verification(&server, json_body(json!({"token": "issued.jwt"})), 1).await;

    let credential = assert_ok!(
        Authenticator::new()
            .obtain_credential(&remote_config(&server), &log())
            .await
    );
    assert!(matches!(credential, Credential::Jwt { ref jwt, .. } if jwt == "issued.jwt"));
}

// =============================================================================
// Client lifecycle
// =============================================================================

#[tokio::test]
async fn test_init_fails_without_session() {
    let server = MockServer::start().await;
    mount_session(&server, json_body(json!({})), 1).await;
    mount_verification(&server, json_body(json!({"token": "issued.jwt"})), 0).await;

    let fabric = MemoryFabric::new();
    let sink = Arc::new(common::RecordingSink::default());
    let client = FabricClient::builder(remote_config(&server))
        .connector(fabric.clone())
        .log_sink(sink.clone())
        .build();

    let err = assert_err!(client.init().await);
    assert!(matches!(err, FabricError::Auth(AuthError::NoSession)), "{err}");
    assert_eq!(client.state(), ConnectionState::Failed);
    assert_eq!(fabric.connect_attempts(), 0);
    assert!(sink.contains(LogLevel::Error, "no session"));
}
