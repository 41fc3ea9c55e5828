//! Redis Adapter Tests
//!
//! Need a live server: FEEDQ_TEST_REDIS_URL=redis://127.0.0.1:6379 cargo test -- --ignored

use feedq_core::application::{ConnectionManager, NotificationChannel, QueueChannel, StatusBoard};
use feedq_core::domain::{Namespace, Payload, QueueName, TopicName};
use feedq_core::AppError;
use feedq_infra_redis::RedisConnector;
use std::sync::Arc;
use std::time::Duration;

const REDIS_URL_VAR: &str = "FEEDQ_TEST_REDIS_URL";

/// Manager on a namespace unique to this test run
fn manager(test: &str) -> ConnectionManager {
    let url = std::env::var(REDIS_URL_VAR).unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
    let namespace = Namespace::new(format!(
        "feedq-test:{}:{}:",
        std::process::id(),
        test
    ))
    .unwrap();
    ConnectionManager::new(Arc::new(RedisConnector::new(url)), namespace)
}

#[tokio::test]
#[ignore = "requires a running Redis server"]
async fn test_redis_queue_round_trip_and_blocking_dequeue() {
    let manager = manager("queue");
    let channel = QueueChannel::new(manager.connection().await.unwrap());
    let jobs = QueueName::new("jobs").unwrap();

    let job = Payload::from(serde_json::json!({"url": "http://a.com"}));
    channel.enqueue(&jobs, &job).await.unwrap();
    assert_eq!(channel.dequeue(&jobs).await.unwrap(), job);

    // Blocking pop must not stall other commands on the shared connection
    let waiter = {
        let channel = channel.clone();
        let jobs = jobs.clone();
        tokio::spawn(async move { channel.dequeue(&jobs).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    tokio::time::timeout(Duration::from_secs(1), channel.enqueue(&jobs, &job))
        .await
        .expect("enqueue should not wait behind BLPOP")
        .unwrap();

    let received = tokio::time::timeout(Duration::from_secs(2), waiter)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(received, job);

    manager.close().await;
}

#[tokio::test]
#[ignore = "requires a running Redis server"]
async fn test_redis_publish_subscribe() {
    let manager = manager("pubsub");
    let channel = NotificationChannel::new(manager.connection().await.unwrap());
    let status = TopicName::new("status").unwrap();

    let mut events = channel.subscribe(&status).await.unwrap();
    let event = Payload::object([("feed", "example.com_feed.xml")]);
    channel.publish(&status, &event).await.unwrap();

    let received = tokio::time::timeout(Duration::from_secs(2), events.next_event())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(received, event);

    events.unsubscribe();
    manager.close().await;
}

#[tokio::test]
#[ignore = "requires a running Redis server"]
async fn test_redis_status_counters() {
    let manager = manager("status");
    let board = StatusBoard::new(manager.connection().await.unwrap());

    let start = board.get("feed_count").await.unwrap().unwrap_or(0);
    assert_eq!(board.incr("feed_count", 2).await.unwrap(), start + 2);
    assert_eq!(board.get("feed_count").await.unwrap(), Some(start + 2));

    board.incr("feed_count", -(start + 2)).await.unwrap();
    manager.close().await;
}

#[tokio::test]
async fn test_redis_unreachable_is_connectivity_error() {
    // Nothing listens on port 1
    let manager = ConnectionManager::new(
        Arc::new(RedisConnector::new("redis://127.0.0.1:1")),
        Namespace::default(),
    );
    let err = manager.connection().await.unwrap_err();
    assert!(matches!(err, AppError::Connectivity(_)));
}
