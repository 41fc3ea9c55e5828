// Redis BackingStore Implementation

use crate::error::map_redis_error;
use async_trait::async_trait;
use feedq_core::error::{AppError, Result};
use feedq_core::port::{BackingStore, Subscription};
use futures::StreamExt;
use redis::aio::MultiplexedConnection;
use redis::Client;
use std::collections::HashMap;
use tokio::sync::watch;
use tracing::{debug, info};

fn closed_error() -> AppError {
    AppError::Connectivity("redis connection is closed".to_string())
}

/// Shared Redis connection
///
/// Non-blocking commands share one multiplexed connection. A blocking
/// `BLPOP` would stall every command queued behind it on that pipe, so each
/// blocking pop and each subscription uses its own connection from the same
/// client. Dropping the pop future or the subscription closes that
/// connection and Redis forgets the waiter.
pub struct RedisStore {
    client: Client,
    shared: MultiplexedConnection,
    closed: watch::Sender<bool>,
}

impl RedisStore {
    pub async fn connect(client: Client) -> Result<Self> {
        let shared = client
            .get_multiplexed_async_connection()
            .await
            .map_err(map_redis_error)?;
        let (closed, _) = watch::channel(false);
        info!("Redis connection established");
        Ok(Self {
            client,
            shared,
            closed,
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if *self.closed.borrow() {
            return Err(closed_error());
        }
        Ok(())
    }

    fn connection(&self) -> Result<MultiplexedConnection> {
        self.ensure_open()?;
        Ok(self.shared.clone())
    }
}

#[async_trait]
impl BackingStore for RedisStore {
    async fn push_tail(&self, key: &str, item: String) -> Result<u64> {
        let mut conn = self.connection()?;
        let len: u64 = redis::cmd("RPUSH")
            .arg(key)
            .arg(item)
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        Ok(len)
    }

    async fn pop_head_blocking(&self, key: &str) -> Result<String> {
        self.ensure_open()?;
        let mut closed = self.closed.subscribe();
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(map_redis_error)?;

        loop {
            let blpop = async {
                // Timeout 0: wait forever
                let reply: Option<(String, String)> = redis::cmd("BLPOP")
                    .arg(key)
                    .arg(0)
                    .query_async(&mut conn)
                    .await
                    .map_err(map_redis_error)?;
                Ok::<_, AppError>(reply)
            };

            tokio::select! {
                reply = blpop => {
                    if let Some((_, item)) = reply? {
                        return Ok(item);
                    }
                    debug!(key = key, "BLPOP returned nil, waiting again");
                }
                _ = closed.wait_for(|c| *c) => return Err(closed_error()),
            }
        }
    }

    async fn publish(&self, channel: &str, message: String) -> Result<u64> {
        let mut conn = self.connection()?;
        let receivers: u64 = redis::cmd("PUBLISH")
            .arg(channel)
            .arg(message)
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        Ok(receivers)
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription> {
        self.ensure_open()?;
        let mut pubsub = self.client.get_async_pubsub().await.map_err(map_redis_error)?;
        // Returns once the server has confirmed the subscription
        pubsub.subscribe(channel).await.map_err(map_redis_error)?;

        let mut closed = self.closed.subscribe();
        // Closing or a dropped socket both end the stream with a Connectivity error
        let messages = pubsub
            .into_on_message()
            .map(|msg| msg.get_payload::<String>().map_err(map_redis_error))
            .take_until(async move {
                let _ = closed.wait_for(|c| *c).await;
            })
            .chain(futures::stream::once(async {
                Err(AppError::Connectivity(
                    "redis subscription ended".to_string(),
                ))
            }))
            .boxed();

        debug!(channel = channel, "Redis subscription registered");
        Ok(Subscription::new(channel, messages))
    }

    async fn hash_incr(&self, key: &str, field: &str, delta: i64) -> Result<i64> {
        let mut conn = self.connection()?;
        let value: i64 = redis::cmd("HINCRBY")
            .arg(key)
            .arg(field)
            .arg(delta)
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        Ok(value)
    }

    async fn hash_get_all(&self, key: &str) -> Result<Vec<(String, String)>> {
        let mut conn = self.connection()?;
        let fields: HashMap<String, String> = redis::cmd("HGETALL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        Ok(fields.into_iter().collect())
    }

    async fn close(&self) {
        if !self.closed.send_replace(true) {
            info!("Redis connection closed");
        }
    }
}
