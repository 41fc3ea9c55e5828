// Worker - job processing loop on top of the queue and notification channels

pub mod constants;
mod shutdown;

use constants::*;
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};

use crate::application::connection::Connection;
use crate::application::notification::NotificationChannel;
use crate::application::queue_channel::QueueChannel;
use crate::application::status_board::{StatusBoard, JOBS_DONE, JOBS_FAILED};
use crate::domain::{Payload, QueueName, TopicName};
use crate::error::{AppError, Result};
use crate::port::{JobHandler, TimeProvider};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Outcome of one handled job
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Done(Option<Payload>),
    Failed(String),
}

impl JobOutcome {
    pub fn state(&self) -> &'static str {
        match self {
            JobOutcome::Done(_) => STATE_DONE,
            JobOutcome::Failed(_) => STATE_FAILED,
        }
    }
}

/// Worker pulls jobs from one queue and reports each outcome on a topic
///
/// No acknowledgement: a job whose handler fails or panics is reported as
/// failed and dropped, never requeued.
pub struct Worker {
    queue: QueueName,
    status_topic: TopicName,
    queue_channel: QueueChannel,
    notifications: NotificationChannel,
    status_board: StatusBoard,
    handler: Arc<dyn JobHandler>,
    time_provider: Arc<dyn TimeProvider>, // For deterministic testing
}

impl Worker {
    pub fn new(
        queue: QueueName,
        status_topic: TopicName,
        connection: Connection,
        handler: Arc<dyn JobHandler>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            queue,
            status_topic,
            queue_channel: QueueChannel::new(connection.clone()),
            notifications: NotificationChannel::new(connection.clone()),
            status_board: StatusBoard::new(connection),
            handler,
            time_provider,
        }
    }

    /// Run worker loop with graceful shutdown support
    ///
    /// Shutdown interrupts a pending dequeue without consuming a job.
    ///
    /// # Errors
    /// - `AppError::Connectivity` once the connection is lost (no reconnect here)
    pub async fn run(&self, mut shutdown: ShutdownToken) -> Result<()> {
        info!(queue = %self.queue, topic = %self.status_topic, "Worker started");
        loop {
            if shutdown.is_shutdown() {
                info!(queue = %self.queue, "Worker shutting down");
                break;
            }

            let job = match self
                .queue_channel
                .dequeue_until(&self.queue, shutdown.wait())
                .await
            {
                Ok(Some(job)) => job,
                Ok(None) => {
                    info!("Worker interrupted while waiting for a job");
                    break;
                }
                Err(AppError::MalformedPayload(e)) => {
                    // Already consumed; nothing to report it against
                    warn!(queue = %self.queue, error = %e, "Skipping malformed job");
                    continue;
                }
                Err(e) => {
                    error!(queue = %self.queue, error = %e, "Worker stopping");
                    return Err(e);
                }
            };

            self.process_job(job).await?;
        }
        info!(queue = %self.queue, "Worker stopped");
        Ok(())
    }

    /// Handle one job and publish its outcome
    ///
    /// The handler runs in its own task so a panic only fails this job.
    pub async fn process_job(&self, job: Payload) -> Result<JobOutcome> {
        let handler = Arc::clone(&self.handler);
        let job_for_exec = job.clone();
        let handle = tokio::task::spawn(async move { handler.handle(job_for_exec).await });

        let outcome = match handle.await {
            Ok(Ok(result)) => {
                info!(queue = %self.queue, "Job completed");
                JobOutcome::Done(result)
            }
            Ok(Err(e)) => {
                warn!(queue = %self.queue, error = %e, "Job failed");
                JobOutcome::Failed(e.to_string())
            }
            Err(join_err) => {
                // Task panicked or was cancelled (non-retryable)
                if join_err.is_panic() {
                    error!(queue = %self.queue, "Job handler panicked: {:?}", join_err);
                    JobOutcome::Failed("handler panicked".to_string())
                } else {
                    error!(queue = %self.queue, "Job handler cancelled: {:?}", join_err);
                    JobOutcome::Failed("handler cancelled".to_string())
                }
            }
        };

        match self.report(job, &outcome).await {
            Ok(()) => Ok(outcome),
            Err(e) if e.is_connectivity() => Err(e),
            Err(e) => {
                // e.g. a result summary holding a non-finite float
                warn!(queue = %self.queue, error = %e, "Could not report job outcome");
                Ok(outcome)
            }
        }
    }

    async fn report(&self, job: Payload, outcome: &JobOutcome) -> Result<()> {
        let mut event = BTreeMap::new();
        event.insert("queue".to_string(), Payload::from(self.queue.as_str()));
        event.insert("state".to_string(), Payload::from(outcome.state()));
        event.insert(
            "finished_at".to_string(),
            Payload::Timestamp(self.time_provider.now()),
        );
        event.insert("job".to_string(), job);
        match outcome {
            JobOutcome::Done(Some(result)) => {
                event.insert("result".to_string(), result.clone());
            }
            JobOutcome::Done(None) => {}
            JobOutcome::Failed(message) => {
                event.insert("error".to_string(), Payload::from(message.as_str()));
            }
        }

        self.notifications
            .publish(&self.status_topic, &Payload::Object(event))
            .await?;

        let counter = match outcome {
            JobOutcome::Done(_) => JOBS_DONE,
            JobOutcome::Failed(_) => JOBS_FAILED,
        };
        self.status_board.incr(counter, 1).await?;
        Ok(())
    }
}
