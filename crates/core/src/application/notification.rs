// Notification Channel - ephemeral namespaced broadcast topics

use crate::application::connection::Connection;
use crate::domain::{decode, encode, Payload, TopicName};
use crate::error::{AppError, Result};
use crate::port::Subscription;
use futures::task::AtomicWaker;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use tracing::{debug, info, warn};

/// Publish / subscribe over the shared connection
///
/// Events are never stored: a publish with no registered subscriber is a
/// silent no-op, and a subscriber only sees events published after it
/// registered.
#[derive(Clone, Debug)]
pub struct NotificationChannel {
    connection: Connection,
}

impl NotificationChannel {
    pub fn new(connection: Connection) -> Self {
        Self { connection }
    }

    /// Broadcast an event once to every current subscriber of `topic`
    ///
    /// # Errors
    /// - `AppError::MalformedPayload` if the event cannot be encoded
    /// - `AppError::Connectivity` if the connection is closed or lost
    pub async fn publish(&self, topic: &TopicName, event: &Payload) -> Result<()> {
        let encoded = encode(event)?;
        let channel = self.connection.key(topic.as_str());
        let store = self.connection.store()?;

        let receivers = self
            .connection
            .observe(store.publish(&channel, encoded).await)?;
        debug!(topic = %topic, receivers = receivers, "Event published");
        Ok(())
    }

    /// Register on `topic` and return the live event stream
    ///
    /// # Errors
    /// - `AppError::Connectivity` if the connection is closed or lost
    pub async fn subscribe(&self, topic: &TopicName) -> Result<EventStream> {
        let channel = self.connection.key(topic.as_str());
        let store = self.connection.store()?;

        let subscription = self.connection.observe(store.subscribe(&channel).await)?;
        info!(topic = %topic, "Subscribed");
        Ok(EventStream::new(
            self.connection.clone(),
            topic.clone(),
            subscription,
        ))
    }
}

#[derive(Debug)]
struct StreamState {
    topic: TopicName,
    cancelled: AtomicBool,
    waker: AtomicWaker,
    subscription: Mutex<Option<Subscription>>,
}

impl StreamState {
    fn slot(&self) -> MutexGuard<'_, Option<Subscription>> {
        self.subscription
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Unregister now; later calls are no-ops
    fn release(&self) {
        // Take it out first so the unregister runs outside the lock
        let released = self.slot().take();
        if released.is_some() {
            info!(topic = %self.topic, "Unsubscribed");
        }
    }
}

/// Stops an [`EventStream`] from another task
///
/// The subscription is unregistered inside [`CancelHandle::cancel`]; the
/// consumer's next poll then returns `None`.
#[derive(Clone)]
pub struct CancelHandle {
    state: Arc<StreamState>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.state.cancelled.store(true, Ordering::SeqCst);
        self.state.release();
        self.state.waker.wake();
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::SeqCst)
    }
}

/// Lazy, unbounded sequence of decoded events for one topic
///
/// Pull-based: nothing is decoded until the consumer polls. An event that
/// fails to decode is yielded as `Err(AppError::MalformedPayload)` and the
/// stream continues. If the connection closes or drops underneath the
/// stream, it yields one `Err(AppError::Connectivity)`, marks the connection
/// broken, and ends. Dropping the stream, calling
/// [`EventStream::unsubscribe`], or triggering its [`CancelHandle`]
/// unregisters the subscription and ends it quietly.
#[derive(Debug)]
pub struct EventStream {
    connection: Connection,
    state: Arc<StreamState>,
}

impl EventStream {
    fn new(connection: Connection, topic: TopicName, subscription: Subscription) -> Self {
        Self {
            connection,
            state: Arc::new(StreamState {
                topic,
                cancelled: AtomicBool::new(false),
                waker: AtomicWaker::new(),
                subscription: Mutex::new(Some(subscription)),
            }),
        }
    }

    pub fn topic(&self) -> &TopicName {
        &self.state.topic
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            state: Arc::clone(&self.state),
        }
    }

    /// Next event, or `None` once cancelled or ended
    pub async fn next_event(&mut self) -> Option<Result<Payload>> {
        self.next().await
    }

    /// Unregister now
    pub fn unsubscribe(self) {
        self.state.release();
    }

    fn connection_lost(&self, error: AppError) -> Option<Result<Payload>> {
        self.state.release();
        warn!(topic = %self.state.topic, error = %error, "Subscription lost its connection");
        Some(self.connection.observe(Err(error)))
    }
}

impl Stream for EventStream {
    type Item = Result<Payload>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.state.waker.register(cx.waker());
        if self.state.cancelled.load(Ordering::SeqCst) {
            self.state.release();
            return Poll::Ready(None);
        }

        let polled = {
            let mut slot = self.state.slot();
            let Some(subscription) = slot.as_mut() else {
                return Poll::Ready(None);
            };
            subscription.poll_next_unpin(cx)
        };

        match polled {
            Poll::Ready(Some(Ok(raw))) => {
                let decoded = decode(&raw);
                if let Err(e) = &decoded {
                    warn!(topic = %self.state.topic, error = %e, "Discarding undecodable event");
                }
                Poll::Ready(Some(decoded))
            }
            Poll::Ready(Some(Err(e))) if e.is_connectivity() => {
                Poll::Ready(self.connection_lost(e))
            }
            Poll::Ready(Some(Err(e))) => Poll::Ready(Some(Err(e))),
            // Subscriptions never end on their own
            Poll::Ready(None) => Poll::Ready(self.connection_lost(AppError::Connectivity(
                format!("subscription to '{}' ended", self.state.topic),
            ))),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.state.release();
    }
}
