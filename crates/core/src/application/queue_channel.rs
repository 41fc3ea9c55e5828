// Queue Channel - durable namespaced FIFO lists

use crate::application::connection::Connection;
use crate::domain::{decode, encode, Payload, QueueName};
use crate::error::Result;
use std::future::Future;
use tracing::{debug, warn};

/// Enqueue / blocking dequeue over the shared connection
///
/// Delivery is at-most-once: a dequeued job is gone from the store whether
/// or not the caller finishes processing it.
#[derive(Clone, Debug)]
pub struct QueueChannel {
    connection: Connection,
}

impl QueueChannel {
    pub fn new(connection: Connection) -> Self {
        Self { connection }
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Append a job to the tail of the queue
    ///
    /// Returns the queue length after the push.
    ///
    /// # Errors
    /// - `AppError::MalformedPayload` if the job cannot be encoded (nothing is sent)
    /// - `AppError::Connectivity` if the connection is closed or lost
    pub async fn enqueue(&self, queue: &QueueName, job: &Payload) -> Result<u64> {
        let encoded = encode(job)?;
        let key = self.connection.key(queue.as_str());
        let store = self.connection.store()?;

        let len = self
            .connection
            .observe(store.push_tail(&key, encoded).await)?;
        debug!(queue = %queue, len = len, "Job enqueued");
        Ok(len)
    }

    /// Block until a job is at the head of the queue, then remove and decode it
    ///
    /// # Errors
    /// - `AppError::MalformedPayload` if the item cannot be decoded (it stays consumed)
    /// - `AppError::Connectivity` if the connection is closed or lost
    pub async fn dequeue(&self, queue: &QueueName) -> Result<Payload> {
        let key = self.connection.key(queue.as_str());
        let store = self.connection.store()?;

        let raw = self.connection.observe(store.pop_head_blocking(&key).await)?;
        match decode(&raw) {
            Ok(job) => {
                debug!(queue = %queue, "Job dequeued");
                Ok(job)
            }
            Err(e) => {
                warn!(queue = %queue, error = %e, "Discarding undecodable job");
                Err(e)
            }
        }
    }

    /// [`QueueChannel::dequeue`] that gives up when `cancel` completes first
    ///
    /// Returns `Ok(None)` on cancellation; no job is consumed in that case.
    pub async fn dequeue_until<F>(&self, queue: &QueueName, cancel: F) -> Result<Option<Payload>>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            job = self.dequeue(queue) => job.map(Some),
            _ = cancel => {
                debug!(queue = %queue, "Dequeue cancelled");
                Ok(None)
            }
        }
    }
}

impl From<Connection> for QueueChannel {
    fn from(connection: Connection) -> Self {
        Self::new(connection)
    }
}
