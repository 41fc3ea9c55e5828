//! Notification Channel & Status Board Tests
//!
//! Fan-out, live-only delivery, unsubscribe and counters over the
//! in-process store

use feedq_core::application::status_board::{FEED_COUNT, ITEM_COUNT};
use feedq_core::application::{ConnectionManager, NotificationChannel, StatusBoard};
use feedq_core::domain::{Namespace, Payload, TopicName};
use feedq_core::AppError;
use feedq_infra_memory::{MemoryBroker, MemoryConnector};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;

async fn setup() -> (MemoryBroker, NotificationChannel) {
    let broker = MemoryBroker::new();
    let manager = ConnectionManager::new(
        Arc::new(MemoryConnector::new(broker.clone())),
        Namespace::default(),
    );
    let channel = NotificationChannel::new(manager.connection().await.unwrap());
    (broker, channel)
}

fn topic(name: &str) -> TopicName {
    TopicName::new(name).unwrap()
}

#[tokio::test]
async fn test_subscriber_receives_published_event() {
    let (_broker, channel) = setup().await;
    let status = topic("status");

    let mut events = channel.subscribe(&status).await.unwrap();
    let event = Payload::from(serde_json::json!({"feed": "example.com_feed.xml", "items": 3}));
    channel.publish(&status, &event).await.unwrap();

    let received = tokio::time::timeout(Duration::from_secs(1), events.next_event())
        .await
        .expect("event should arrive")
        .unwrap()
        .unwrap();
    assert_eq!(received, event);
    assert_eq!(events.topic(), &status);
}

#[tokio::test]
async fn test_publish_without_subscribers_is_ok() {
    let (_broker, channel) = setup().await;
    channel
        .publish(&topic("nobody"), &Payload::object([("n", 1i64)]))
        .await
        .unwrap();
}

/// Events are not stored: a late subscriber never sees earlier events
#[tokio::test]
async fn test_late_subscriber_misses_earlier_events() {
    let (_broker, channel) = setup().await;
    let status = topic("status");

    channel
        .publish(&status, &Payload::object([("n", 1i64)]))
        .await
        .unwrap();
    let mut events = channel.subscribe(&status).await.unwrap();
    channel
        .publish(&status, &Payload::object([("n", 2i64)]))
        .await
        .unwrap();

    let first = events.next().await.unwrap().unwrap();
    assert_eq!(first.get("n").and_then(Payload::as_i64), Some(2));

    let nothing = tokio::time::timeout(Duration::from_millis(30), events.next()).await;
    assert!(nothing.is_err(), "no further event should be pending");
}

#[tokio::test]
async fn test_fan_out_to_every_subscriber_in_order() {
    let (broker, channel) = setup().await;
    let status = topic("status");

    let mut a = channel.subscribe(&status).await.unwrap();
    let mut b = channel.subscribe(&status).await.unwrap();
    assert_eq!(broker.subscriber_count("feedq:status"), 2);

    for n in 0..3i64 {
        channel
            .publish(&status, &Payload::object([("n", n)]))
            .await
            .unwrap();
    }

    for stream in [&mut a, &mut b] {
        for n in 0..3i64 {
            let event = stream.next().await.unwrap().unwrap();
            assert_eq!(event.get("n").and_then(Payload::as_i64), Some(n));
        }
    }
}

#[tokio::test]
async fn test_topics_do_not_cross() {
    let (_broker, channel) = setup().await;
    let mut status = channel.subscribe(&topic("status")).await.unwrap();

    channel
        .publish(&topic("other"), &Payload::object([("n", 1i64)]))
        .await
        .unwrap();

    let nothing = tokio::time::timeout(Duration::from_millis(30), status.next()).await;
    assert!(nothing.is_err());
}

#[tokio::test]
async fn test_unsubscribe_unregisters() {
    let (broker, channel) = setup().await;
    let status = topic("status");

    let events = channel.subscribe(&status).await.unwrap();
    assert_eq!(broker.subscriber_count("feedq:status"), 1);

    events.unsubscribe();
    assert_eq!(broker.subscriber_count("feedq:status"), 0);

    // Still fine to publish with no one listening
    channel
        .publish(&status, &Payload::object([("n", 1i64)]))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_dropping_stream_unregisters() {
    let (broker, channel) = setup().await;
    let events = channel.subscribe(&topic("status")).await.unwrap();
    assert_eq!(broker.subscriber_count("feedq:status"), 1);

    drop(events);
    assert_eq!(broker.subscriber_count("feedq:status"), 0);
}

/// Cancel from another task ends a consumer blocked on the stream
#[tokio::test]
async fn test_cancel_handle_ends_pending_stream() {
    let (broker, channel) = setup().await;
    let mut events = channel.subscribe(&topic("status")).await.unwrap();
    let cancel = events.cancel_handle();

    let consumer = tokio::spawn(async move {
        let mut received = 0usize;
        while let Some(_event) = events.next().await {
            received += 1;
        }
        received
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!consumer.is_finished());

    cancel.cancel();
    assert!(cancel.is_cancelled());
    // Unregistered at once, not on the consumer's next poll
    assert_eq!(broker.subscriber_count("feedq:status"), 0);

    let received = tokio::time::timeout(Duration::from_secs(1), consumer)
        .await
        .expect("cancel should end the stream")
        .unwrap();
    assert_eq!(received, 0);
    assert_eq!(broker.subscriber_count("feedq:status"), 0);
}

/// An undecodable event is an error item; the stream keeps going
#[tokio::test]
async fn test_malformed_event_does_not_end_stream() {
    let (broker, channel) = setup().await;
    let status = topic("status");
    let mut events = channel.subscribe(&status).await.unwrap();

    broker.publish_raw("feedq:status", "{oops");
    channel
        .publish(&status, &Payload::object([("n", 7i64)]))
        .await
        .unwrap();

    let bad = events.next().await.unwrap();
    assert!(matches!(bad, Err(AppError::MalformedPayload(_))));

    let good = events.next().await.unwrap().unwrap();
    assert_eq!(good.get("n").and_then(Payload::as_i64), Some(7));
}

#[tokio::test]
async fn test_connection_close_reports_connectivity_then_ends() {
    let broker = MemoryBroker::new();
    let manager = ConnectionManager::new(
        Arc::new(MemoryConnector::new(broker.clone())),
        Namespace::default(),
    );
    let connection = manager.connection().await.unwrap();
    let channel = NotificationChannel::new(connection.clone());
    let mut events = channel.subscribe(&topic("status")).await.unwrap();

    connection.close().await;

    let lost = tokio::time::timeout(Duration::from_secs(1), events.next())
        .await
        .expect("stream should report the closed connection");
    assert!(matches!(lost, Some(Err(AppError::Connectivity(_)))));
    assert!(events.next().await.is_none());
    assert_eq!(broker.subscriber_count("feedq:status"), 0);

    let err = channel
        .publish(&topic("status"), &Payload::Null)
        .await
        .unwrap_err();
    assert!(err.is_connectivity());
}

/// A dropped transport surfaces on the stream and poisons the connection
#[tokio::test]
async fn test_lost_connection_surfaces_on_stream() {
    let broker = MemoryBroker::new();
    let connector = Arc::new(MemoryConnector::new(broker.clone()));
    let manager = ConnectionManager::new(connector.clone(), Namespace::default());
    let connection = manager.connection().await.unwrap();
    let channel = NotificationChannel::new(connection.clone());
    let mut events = channel.subscribe(&topic("status")).await.unwrap();

    connector.disconnect_last();

    let lost = tokio::time::timeout(Duration::from_secs(1), events.next_event())
        .await
        .expect("stream should report the lost connection");
    assert!(matches!(lost, Some(Err(AppError::Connectivity(_)))));
    assert!(events.next_event().await.is_none());

    assert!(connection.is_closed());
    assert_eq!(broker.subscriber_count("feedq:status"), 0);
    assert!(channel
        .subscribe(&topic("status"))
        .await
        .unwrap_err()
        .is_connectivity());
}

// ============================================================================
// Status Board
// ============================================================================

#[tokio::test]
async fn test_status_counters() {
    let broker = MemoryBroker::new();
    let manager = ConnectionManager::new(
        Arc::new(MemoryConnector::new(broker.clone())),
        Namespace::default(),
    );
    let board = StatusBoard::new(manager.connection().await.unwrap());

    assert_eq!(board.get(FEED_COUNT).await.unwrap(), None);
    assert_eq!(board.incr(FEED_COUNT, 1).await.unwrap(), 1);
    assert_eq!(board.incr(ITEM_COUNT, 25).await.unwrap(), 25);
    assert_eq!(board.incr(ITEM_COUNT, -5).await.unwrap(), 20);

    let snapshot = board.snapshot().await.unwrap();
    assert_eq!(snapshot.get(FEED_COUNT), Some(&1));
    assert_eq!(snapshot.get(ITEM_COUNT), Some(&20));
    assert_eq!(board.get(ITEM_COUNT).await.unwrap(), Some(20));
}

#[tokio::test]
async fn test_status_non_integer_is_malformed() {
    let broker = MemoryBroker::new();
    let manager = ConnectionManager::new(
        Arc::new(MemoryConnector::new(broker.clone())),
        Namespace::default(),
    );
    let board = StatusBoard::new(manager.connection().await.unwrap());

    broker.hash_set("feedq:status", FEED_COUNT, "lots");

    let err = board.snapshot().await.unwrap_err();
    assert!(matches!(err, AppError::MalformedPayload(_)));
    let err = board.incr(FEED_COUNT, 1).await.unwrap_err();
    assert!(matches!(err, AppError::MalformedPayload(_)));
}
