// Backing Store Port (Interface)
//
// Any store offering atomic list push/pop, blocking head-pop and pub/sub
// fan-out satisfies this contract. Keys arrive already namespaced.

use crate::error::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tracing::debug;

/// Store primitives used by the queue, notification and status components
#[async_trait]
pub trait BackingStore: Send + Sync {
    /// Append to the tail of a list in one round trip. Returns the new length.
    async fn push_tail(&self, key: &str, item: String) -> Result<u64>;

    /// Block until the list has a head item, then remove and return it.
    ///
    /// No timeout. Dropping the returned future must not consume an item.
    async fn pop_head_blocking(&self, key: &str) -> Result<String>;

    /// Broadcast to current subscribers. Returns how many received it.
    async fn publish(&self, channel: &str, message: String) -> Result<u64>;

    /// Register a subscriber. Delivery starts once this returns.
    async fn subscribe(&self, channel: &str) -> Result<Subscription>;

    /// Atomically add `delta` to a hash field. Returns the new value.
    async fn hash_incr(&self, key: &str, field: &str, delta: i64) -> Result<i64>;

    /// Read every field of a hash (empty if the key is absent)
    async fn hash_get_all(&self, key: &str) -> Result<Vec<(String, String)>>;

    /// Release the connection. Later calls fail with `AppError::Connectivity`.
    async fn close(&self);
}

/// Establishes backing-store connections
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn BackingStore>>;

    /// Human-readable target for logs
    fn describe(&self) -> String;
}

type Release = Box<dyn FnOnce() + Send>;

/// Live registration on a broadcast channel
///
/// Yields raw messages in publish order. Dropping it (or calling
/// [`Subscription::unsubscribe`]) unregisters immediately.
pub struct Subscription {
    channel: String,
    messages: BoxStream<'static, Result<String>>,
    release: Option<Release>,
}

impl Subscription {
    pub fn new(channel: impl Into<String>, messages: BoxStream<'static, Result<String>>) -> Self {
        Self {
            channel: channel.into(),
            messages,
            release: None,
        }
    }

    /// Run `release` exactly once when the subscription goes away
    pub fn on_release(mut self, release: impl FnOnce() + Send + 'static) -> Self {
        self.release = Some(Box::new(release));
        self
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Explicit release; equivalent to dropping
    pub fn unsubscribe(self) {}
}

impl Stream for Subscription {
    type Item = Result<String>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.messages.as_mut().poll_next(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
        debug!(channel = %self.channel, "Subscription released");
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_subscription_yields_and_releases_once() {
        let released = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&released);

        let messages = futures::stream::iter(vec![Ok("a".to_string()), Ok("b".to_string())]);
        let mut sub = Subscription::new("status", messages.boxed())
            .on_release(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });

        assert_eq!(sub.next().await.unwrap().unwrap(), "a");
        assert_eq!(sub.next().await.unwrap().unwrap(), "b");
        assert!(sub.next().await.is_none());
        assert_eq!(released.load(Ordering::SeqCst), 0);

        sub.unsubscribe();
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }
}
