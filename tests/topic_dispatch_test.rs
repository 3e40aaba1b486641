//! Topic handler integration tests
//!
//! - reply normalization on the wire
//! - handler failure isolation
//! - in-order dispatch per subscription
//! - queue group load balancing
//! - deregistration

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use fabric_client::{
    FabricError, HandlerError, LifecycleEvent, LogLevel, MemoryFabric, TopicRequest, Transport,
};
use serde_json::{json, Value};

use common::connected;

async fn ask(fabric: &MemoryFabric, topic: &str, payload: Value) -> Value {
    let reply = tokio::time::timeout(
        Duration::from_secs(1),
        fabric
            .transport()
            .request(topic, Bytes::from(serde_json::to_vec(&payload).unwrap())),
    )
    .await
    .expect("no reply")
    .unwrap();
    serde_json::from_slice(&reply).unwrap()
}

// =============================================================================
// Normalization
// =============================================================================

#[tokio::test]
async fn test_handler_sees_payload_once() {
    let fabric = MemoryFabric::new();
    let (client, _) = connected(&fabric, "orders").await;
    let seen = Arc::new(Mutex::new(Vec::new()));

    let recorder = seen.clone();
    client
        .register_topic_handler(
            "orders",
            move |request: TopicRequest| {
                let recorder = recorder.clone();
                async move {
                    recorder.lock().unwrap().push(request.payload);
                    Ok(Some(json!(5)))
                }
            },
            None,
        )
        .await
        .unwrap();

    assert_eq!(ask(&fabric, "orders", json!({"id": 1})).await, json!({"result": 5}));
    assert_eq!(*seen.lock().unwrap(), vec![json!({"id": 1})]);
}

#[tokio::test]
async fn test_reply_shapes() {
    let fabric = MemoryFabric::new();
    let (client, _) = connected(&fabric, "shapes").await;

    client
        .register_topic_handler(
            "shapes",
            |request: TopicRequest| async move {
                Ok(match request.payload["kind"].as_str() {
                    Some("empty") => Some(json!({})),
                    Some("object") => Some(json!({"status": "ok"})),
                    Some("string") => Some(json!("done")),
                    _ => None,
                })
            },
            None,
        )
        .await
        .unwrap();

    assert_eq!(
        ask(&fabric, "shapes", json!({"kind": "empty"})).await,
        json!({"result": "SUCCESS"})
    );
    assert_eq!(
        ask(&fabric, "shapes", json!({"kind": "object"})).await,
        json!({"status": "ok"})
    );
    assert_eq!(
        ask(&fabric, "shapes", json!({"kind": "string"})).await,
        json!({"result": "done"})
    );
    assert_eq!(
        ask(&fabric, "shapes", json!({"kind": "none"})).await,
        json!({"result": "SUCCESS"})
    );
}

#[tokio::test]
async fn test_message_without_reply_subject_runs_handler() {
    let fabric = MemoryFabric::new();
    let (client, _) = connected(&fabric, "audit").await;
    let count = Arc::new(AtomicUsize::new(0));

    let counter = count.clone();
    client
        .register_topic_handler(
            "audit.log",
            move |_: TopicRequest| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(None)
                }
            },
            None,
        )
        .await
        .unwrap();

    client.publish_topic("audit.log", &json!({"event": "login"})).await.unwrap();
    client.publish_topic("audit.log", &json!({"event": "logout"})).await.unwrap();

    tokio::time::timeout(Duration::from_secs(1), async {
        while count.load(Ordering::SeqCst) < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
}

// =============================================================================
// Isolation and ordering
// =============================================================================

#[tokio::test]
async fn test_failing_handler_does_not_stop_subscription() {
    let fabric = MemoryFabric::new();
    let (client, sink) = connected(&fabric, "risky").await;
    let mut events = client.events();

    client
        .register_topic_handler(
            "risky",
            |request: TopicRequest| async move {
                match request.payload["mode"].as_str() {
                    Some("error") => Err(HandlerError::new("rejected")),
                    Some("panic") => panic!("unexpected input"),
                    _ => Ok(Some(json!({"ok": true}))),
                }
            },
            None,
        )
        .await
        .unwrap();

    let caller = fabric.transport();
    caller
        .publish("risky", Bytes::from_static(br#"{"mode":"error"}"#))
        .await
        .unwrap();
    caller
        .publish("risky", Bytes::from_static(br#"{"mode":"panic"}"#))
        .await
        .unwrap();

    assert_eq!(ask(&fabric, "risky", json!({})).await, json!({"ok": true}));

    let mut failures = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let LifecycleEvent::HandlerFailed { error, .. } = event {
            failures.push(error);
        }
    }
    assert_eq!(failures.len(), 2);
    assert!(failures[0].contains("rejected"));
    assert!(failures[1].contains("unexpected input"));
    assert!(sink.contains(LogLevel::Error, "rejected"));
}

#[tokio::test]
async fn test_messages_handled_in_arrival_order() {
    let fabric = MemoryFabric::new();
    let (client, _) = connected(&fabric, "seq").await;
    let order = Arc::new(Mutex::new(Vec::new()));

    let recorder = order.clone();
    client
        .register_topic_handler(
            "seq",
            move |request: TopicRequest| {
                let recorder = recorder.clone();
                async move {
                    let n = request.payload["n"].as_u64().unwrap_or_default();
                    // Earlier messages take longer; order must still hold
                    tokio::time::sleep(Duration::from_millis(10 - n)).await;
                    recorder.lock().unwrap().push(n);
                    Ok(None)
                }
            },
            None,
        )
        .await
        .unwrap();

    for n in 0..10 {
        client.publish_topic("seq", &json!({ "n": n })).await.unwrap();
    }
    ask(&fabric, "seq", json!({"n": 10})).await;

    assert_eq!(*order.lock().unwrap(), (0..=10).collect::<Vec<u64>>());
}

#[tokio::test]
async fn test_trace_logging_of_request_and_response() {
    let fabric = MemoryFabric::new();
    let (client, sink) = connected(&fabric, "echo").await;
    client
        .register_topic_handler(
            "echo",
            |request: TopicRequest| async move { Ok(Some(request.payload)) },
            None,
        )
        .await
        .unwrap();

    ask(&fabric, "echo", json!({"a": 1})).await;

    assert!(sink.contains(LogLevel::Trace, "Request on echo"));
    assert!(sink.contains(LogLevel::Trace, "Response on echo"));
}

// =============================================================================
// Queue groups
// =============================================================================

fn counting_handler(
    counter: Arc<AtomicUsize>,
) -> impl Fn(TopicRequest) -> futures_util::future::Ready<fabric_client::HandlerResult>
       + Send
       + Sync
       + 'static {
    move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        futures_util::future::ready(Ok(None))
    }
}

#[tokio::test]
async fn test_queue_group_delivers_once() {
    let fabric = MemoryFabric::new();
    let (first, _) = connected(&fabric, "worker-1").await;
    let (second, _) = connected(&fabric, "worker-2").await;
    let count = Arc::new(AtomicUsize::new(0));

    first
        .register_topic_handler("jobs", counting_handler(count.clone()), Some("workers"))
        .await
        .unwrap();
    second
        .register_topic_handler("jobs", counting_handler(count.clone()), Some("workers"))
        .await
        .unwrap();

    for _ in 0..20 {
        ask(&fabric, "jobs", json!({})).await;
    }
    assert_eq!(count.load(Ordering::SeqCst), 20);
}

#[tokio::test]
async fn test_distinct_groups_each_receive() {
    let fabric = MemoryFabric::new();
    let (client, _) = connected(&fabric, "fanout").await;
    let billing = Arc::new(AtomicUsize::new(0));
    let shipping = Arc::new(AtomicUsize::new(0));

    client
        .register_topic_handler("order.placed", counting_handler(billing.clone()), Some("billing"))
        .await
        .unwrap();
    client
        .register_topic_handler("order.placed", counting_handler(shipping.clone()), Some("shipping"))
        .await
        .unwrap();

    client.publish_topic("order.placed", &json!({"id": 7})).await.unwrap();

    tokio::time::timeout(Duration::from_secs(1), async {
        while billing.load(Ordering::SeqCst) + shipping.load(Ordering::SeqCst) < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(billing.load(Ordering::SeqCst), 1);
    assert_eq!(shipping.load(Ordering::SeqCst), 1);
}

// =============================================================================
// Registration and deregistration
// =============================================================================

#[tokio::test]
async fn test_empty_topic_rejected() {
    let fabric = MemoryFabric::new();
    let (client, _) = connected(&fabric, "svc").await;

    let result = client
        .register_topic_handler("", |_: TopicRequest| async move { Ok(None) }, None)
        .await;
    assert!(matches!(result, Err(FabricError::Validation(_))));
    assert!(client.subscriptions().await.is_empty());
}

#[tokio::test]
async fn test_deregister_single_topic() {
    let fabric = MemoryFabric::new();
    let (client, sink) = connected(&fabric, "svc").await;

    for topic in ["a", "b"] {
        client
            .register_topic_handler(topic, |_: TopicRequest| async move { Ok(None) }, Some("svc"))
            .await
            .unwrap();
    }

    assert_eq!(client.deregister_topic_handler("a").await, 1);
    let remaining: Vec<_> = client
        .subscriptions()
        .await
        .into_iter()
        .map(|info| info.topic)
        .collect();
    assert_eq!(remaining, vec!["b"]);
    assert_eq!(fabric.subscriber_count("a"), 0);
    assert!(sink.contains(LogLevel::Info, "Deregistered topic: a"));

    assert_eq!(client.deregister_topic_handlers().await, 1);
    assert!(client.subscriptions().await.is_empty());
}

#[tokio::test]
async fn test_in_flight_handler_finishes_during_shutdown() {
    let fabric = MemoryFabric::new();
    let (client, _) = connected(&fabric, "slow").await;
    let finished = Arc::new(AtomicUsize::new(0));

    let done = finished.clone();
    client
        .register_topic_handler(
            "slow",
            move |_: TopicRequest| {
                let done = done.clone();
                async move {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    done.fetch_add(1, Ordering::SeqCst);
                    Ok(None)
                }
            },
            None,
        )
        .await
        .unwrap();

    client.publish_topic("slow", &json!({})).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    client.shutdown().await;
    assert_eq!(finished.load(Ordering::SeqCst), 1);
}
