//! Integration tests against a live Redis server
//!
//! These need a Redis 6.2+ instance at REDIS_HOST:REDIS_PORT (default
//! localhost:6379) and are ignored by default:
//!
//! ```text
//! cargo test -- --ignored
//! ```

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use redis_stream::{
    AckPolicy, ConsumerLoop, ConsumerOptions, NackMode, StopReason, StreamClient,
    StreamConfig, StreamError, NEW_ENTRIES,
};

/// Config for a stream no other test touches
fn fresh_config(name: &str) -> StreamConfig {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    StreamConfig {
        stream_key: format!("redis-stream-test:{}:{}", name, nanos),
        block_ms: None,
        ..StreamConfig::default()
    }
}

fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
    items
        .iter()
        .map(|(f, v)| (f.to_string(), v.to_string()))
        .collect()
}

async fn connect(config: StreamConfig) -> StreamClient {
    let mut client = StreamClient::connect(config)
        .await
        .expect("Failed to connect to Redis");
    client.trim(0).await.expect("Failed to trim stream");
    client
}

#[tokio::test]
#[ignore]
async fn test_publish_then_plain_read() {
    let mut client = connect(fresh_config("publish")).await;
    let message = pairs(&[("name", "Bob"), ("age", "25")]);

    let id = client.publish(&message).await.unwrap();
    let read = client.read("0", 1).await.unwrap();

    assert_eq!(read.len(), 1);
    assert_eq!(read[0].id, id);
    assert_eq!(read[0].fields, message);
    client.close();
}

#[tokio::test]
#[ignore]
async fn test_consume_returns_entries_in_publish_order() {
    let mut client = connect(fresh_config("consume")).await;
    client.ensure_group("0").await.unwrap();

    let messages = vec![
        pairs(&[("name", "Charlie"), ("age", "35")]),
        pairs(&[("name", "David"), ("age", "40")]),
        pairs(&[("name", "Eve"), ("age", "45")]),
    ];
    for message in &messages {
        client.publish(message).await.unwrap();
    }

    let consumed = client.consume(NEW_ENTRIES, 3).await.unwrap();

    assert_eq!(consumed.len(), 3);
    assert_eq!(consumed[0].fields, messages[0]);
    let fields: Vec<_> = consumed.iter().map(|m| m.fields.clone()).collect();
    assert_eq!(fields, messages);
    client.close();
}

#[tokio::test]
#[ignore]
async fn test_new_entries_are_delivered_once_per_group() {
    let mut client = connect(fresh_config("once")).await;
    client.ensure_group("0").await.unwrap();
    client.publish(&pairs(&[("n", "1")])).await.unwrap();

    let first = client.consume(NEW_ENTRIES, 10).await.unwrap();
    let second = client.consume(NEW_ENTRIES, 10).await.unwrap();

    assert_eq!(first.len(), 1);
    assert!(second.is_empty());
    assert_eq!(client.pending_count().await.unwrap(), 1);

    // Re-reading from 0 returns this consumer's pending entry again
    let pending = client.consume("0", 10).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, first[0].id);
    client.close();
}

#[tokio::test]
#[ignore]
async fn test_ack_and_nack_modes() {
    let mut config = fresh_config("nack");
    config.nack_mode = NackMode::LeavePending;
    let mut client = connect(config).await;
    client.ensure_group("0").await.unwrap();
    for n in ["1", "2", "3"] {
        client.publish(&pairs(&[("n", n)])).await.unwrap();
    }
    let consumed = client.consume(NEW_ENTRIES, 3).await.unwrap();
    assert_eq!(client.pending_count().await.unwrap(), 3);

    client.nack(&consumed[0].id).await.unwrap();
    assert_eq!(client.pending_count().await.unwrap(), 3);

    client.ack(&consumed[0].id).await.unwrap();
    assert_eq!(client.pending_count().await.unwrap(), 2);

    // Same stream and group, legacy nack behaviour
    let mut legacy = client.config().clone();
    legacy.nack_mode = NackMode::AckAlias;
    let mut legacy = StreamClient::connect(legacy).await.unwrap();
    legacy.nack(&consumed[1].id).await.unwrap();
    assert_eq!(legacy.pending_count().await.unwrap(), 1);

    legacy.close();
    client.close();
}

#[tokio::test]
#[ignore]
async fn test_ensure_group_is_idempotent() {
    let mut client = connect(fresh_config("group")).await;
    client.ensure_group("$").await.unwrap();
    client.ensure_group("$").await.unwrap();
    client.close();
}

#[tokio::test]
#[ignore]
async fn test_is_connected_and_double_close() {
    let mut client = connect(fresh_config("close")).await;
    assert!(client.is_connected().await);

    client.close();
    client.close();

    assert!(!client.is_open());
    assert!(!client.is_connected().await);
    let err = client.publish(&pairs(&[("a", "b")])).await.unwrap_err();
    assert!(matches!(err, StreamError::Connection(_)));
}

#[tokio::test]
#[ignore]
async fn test_publish_rejects_empty_entry() {
    let mut client = connect(fresh_config("empty")).await;
    let err = client.publish(&[]).await.unwrap_err();
    assert!(matches!(err, StreamError::Rejected(_)));
    client.close();
}

#[tokio::test]
#[ignore]
async fn test_consumer_loop_prints_and_acks() {
    let mut config = fresh_config("loop");
    config.block_ms = Some(100);
    let mut client = connect(config).await;
    client.ensure_group("0").await.unwrap();
    let id = client.publish(&pairs(&[("name", "Bob"), ("age", "25")])).await.unwrap();

    let options = ConsumerOptions {
        ack: AckPolicy::AfterPrint,
        ..ConsumerOptions::default()
    };
    let mut consumer = ConsumerLoop::new(client, Vec::new(), options);
    let reason = consumer
        .run(tokio::time::sleep(Duration::from_millis(500)))
        .await
        .unwrap();

    assert_eq!(reason, StopReason::Interrupted);
    let (mut client, out) = consumer.into_parts();
    let out = String::from_utf8(out).unwrap();
    assert!(out.contains(&format!("Received message: {} {{name: Bob, age: 25}}", id)));
    assert!(!client.is_open());

    // Loop closed the client; reconnect to inspect the group
    let mut check = StreamClient::connect(client.config().clone()).await.unwrap();
    assert_eq!(check.pending_count().await.unwrap(), 0);
    check.trim(0).await.unwrap();
    check.close();
    client.close();
}
