//! Shared helpers for the integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use fabric_client::auth::VerificationBody;
use fabric_client::logging::LogRecord;
use fabric_client::{
    AuthError, AuthorizationApi, ConnectionConfig, FabricClient, LogLevel, LogSink, MemoryFabric,
};

/// Log sink that keeps every record
#[derive(Default)]
pub struct RecordingSink {
    records: Mutex<Vec<(LogLevel, String)>>,
}

impl RecordingSink {
    pub fn messages(&self) -> Vec<(LogLevel, String)> {
        self.records.lock().unwrap().clone()
    }

    pub fn contains(&self, level: LogLevel, needle: &str) -> bool {
        self.messages()
            .iter()
            .any(|(l, m)| *l == level && m.contains(needle))
    }
}

impl LogSink for RecordingSink {
    fn emit(&self, record: &LogRecord<'_>) {
        self.records
            .lock()
            .unwrap()
            .push((record.level, record.message.to_string()));
    }
}

/// Authorization service that counts calls and always issues a token
#[derive(Default)]
pub struct CountingAuthorizationApi {
    pub calls: AtomicUsize,
}

impl CountingAuthorizationApi {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthorizationApi for CountingAuthorizationApi {
    async fn open_session(&self, _request_id: &str) -> Result<Option<String>, AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Some("session".into()))
    }

    async fn verify(&self, _body: &VerificationBody) -> Result<Option<String>, AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Some("remote.jwt".into()))
    }
}

pub fn config(service: &str) -> ConnectionConfig {
    ConnectionConfig::new(service)
        .with_user_password(service, "secret")
        .with_drain_timeout(Duration::from_secs(2))
}

pub fn client_on(fabric: &MemoryFabric, config: ConnectionConfig) -> (FabricClient, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::default());
    let client = FabricClient::builder(config)
        .connector(fabric.clone())
        .log_sink(sink.clone())
        .build();
    (client, sink)
}

/// Connected client with a recording sink at TRACE
pub async fn connected(fabric: &MemoryFabric, service: &str) -> (FabricClient, Arc<RecordingSink>) {
    let (client, sink) = client_on(fabric, config(service).with_log_level(LogLevel::Trace));
    client.init().await.unwrap();
    (client, sink)
}

pub fn new_seed() -> String {
    nkeys::KeyPair::new_user().seed().unwrap()
}
