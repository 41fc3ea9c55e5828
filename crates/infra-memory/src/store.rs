// In-process BackingStore connection

use crate::broker::MemoryBroker;
use async_trait::async_trait;
use feedq_core::error::{AppError, Result};
use feedq_core::port::{BackingStore, Subscription};
use futures::StreamExt;
use tokio::sync::watch;
use tracing::debug;

fn closed_error() -> AppError {
    AppError::Connectivity("memory store connection is closed".to_string())
}

/// One connection to a [`MemoryBroker`]
///
/// Closing it fails pending and future operations and ends its
/// subscriptions; other connections to the same broker are unaffected.
pub struct MemoryStore {
    broker: MemoryBroker,
    closed: watch::Sender<bool>,
}

impl MemoryStore {
    pub fn new(broker: MemoryBroker) -> Self {
        let (closed, _) = watch::channel(false);
        Self { broker, closed }
    }

    pub fn broker(&self) -> &MemoryBroker {
        &self.broker
    }

    /// Simulate the transport dropping underneath the caller
    pub fn disconnect(&self) {
        self.closed.send_replace(true);
    }

    fn ensure_open(&self) -> Result<()> {
        if *self.closed.borrow() {
            return Err(closed_error());
        }
        Ok(())
    }
}

#[async_trait]
impl BackingStore for MemoryStore {
    async fn push_tail(&self, key: &str, item: String) -> Result<u64> {
        self.ensure_open()?;
        Ok(self.broker.push_tail(key, item))
    }

    async fn pop_head_blocking(&self, key: &str) -> Result<String> {
        let mut closed = self.closed.subscribe();
        loop {
            // Register for wakeups before checking, so a push in between is not missed
            let notified = self.broker.item_pushed().notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            self.ensure_open()?;
            if let Some(item) = self.broker.try_pop_head(key) {
                return Ok(item);
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = closed.wait_for(|c| *c) => return Err(closed_error()),
            }
        }
    }

    async fn publish(&self, channel: &str, message: String) -> Result<u64> {
        self.ensure_open()?;
        Ok(self.broker.publish(channel, &message))
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription> {
        self.ensure_open()?;
        let (id, rx) = self.broker.register(channel);
        let closed = self.closed.subscribe();

        // Ends with one Connectivity error once this connection closes
        let messages = futures::stream::unfold(Some((rx, closed)), |state| async move {
            let (mut rx, mut closed) = state?;
            tokio::select! {
                biased;
                _ = async { let _ = closed.wait_for(|c| *c).await; } => Some((Err(closed_error()), None)),
                message = rx.recv() => match message {
                    Some(message) => Some((Ok(message), Some((rx, closed)))),
                    None => Some((Err(closed_error()), None)),
                },
            }
        })
        .boxed();

        let broker = self.broker.clone();
        let registered = channel.to_string();
        debug!(channel = channel, subscriber = id, "Memory subscriber registered");
        Ok(Subscription::new(channel, messages).on_release(move || {
            broker.unregister(&registered, id);
        }))
    }

    async fn hash_incr(&self, key: &str, field: &str, delta: i64) -> Result<i64> {
        self.ensure_open()?;
        self.broker
            .hash_incr(key, field, delta)
            .map_err(AppError::MalformedPayload)
    }

    async fn hash_get_all(&self, key: &str) -> Result<Vec<(String, String)>> {
        self.ensure_open()?;
        Ok(self.broker.hash_get_all(key))
    }

    async fn close(&self) {
        self.closed.send_replace(true);
    }
}
