//! Scheduler - periodic producer of fetch jobs
//!
//! Every round, each configured feed URL becomes one job on the fetch queue:
//! `{"_id": <feed id>, "url": <url>, "scheduled_at": $date}`.

use crate::application::queue_channel::QueueChannel;
use crate::application::worker::ShutdownToken;
use crate::domain::{generate_id, Payload, QueueName};
use crate::error::{AppError, Result};
use crate::port::TimeProvider;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Enqueues one fetch job per feed at a fixed interval
pub struct Scheduler {
    queue: QueueName,
    queue_channel: QueueChannel,
    interval: Duration,
    time_provider: Arc<dyn TimeProvider>,
}

impl Scheduler {
    pub fn new(
        queue: QueueName,
        queue_channel: QueueChannel,
        interval: Duration,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            queue,
            queue_channel,
            interval,
            time_provider,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Fetch job for one feed URL
    ///
    /// # Errors
    /// - `AppError::InvalidUrl` if no feed ID can be derived from `url`
    pub fn fetch_job(&self, url: &str) -> Result<Payload> {
        let feed_id = generate_id(url)?;
        Ok(Payload::object([
            ("_id", Payload::from(feed_id.into_string())),
            ("url", Payload::from(url)),
            ("scheduled_at", Payload::Timestamp(self.time_provider.now())),
        ]))
    }

    /// Enqueue one job per URL; returns how many were enqueued
    ///
    /// Invalid URLs are skipped with a warning. Connectivity errors stop the
    /// round immediately.
    pub async fn schedule_round(&self, urls: &[String]) -> Result<usize> {
        let mut scheduled = 0;
        for url in urls {
            let job = match self.fetch_job(url) {
                Ok(job) => job,
                Err(AppError::InvalidUrl(e)) => {
                    warn!(url = %url, error = %e, "Skipping feed with invalid URL");
                    continue;
                }
                Err(e) => return Err(e),
            };
            self.queue_channel.enqueue(&self.queue, &job).await?;
            debug!(url = %url, queue = %self.queue, "Fetch job scheduled");
            scheduled += 1;
        }
        info!(queue = %self.queue, scheduled = scheduled, "Fetch round scheduled");
        Ok(scheduled)
    }

    /// Schedule a round now and then once per interval until shutdown
    pub async fn run(&self, urls: &[String], mut shutdown: ShutdownToken) -> Result<()> {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            queue = %self.queue,
            feeds = urls.len(),
            interval_secs = self.interval.as_secs(),
            "Scheduler started"
        );
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.schedule_round(urls).await?;
                }
                _ = shutdown.wait() => {
                    info!(queue = %self.queue, "Scheduler stopped");
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::time_provider::FixedTimeProvider;
    use chrono::{TimeZone, Utc};

    struct NoStore;

    #[async_trait::async_trait]
    impl crate::port::BackingStore for NoStore {
        async fn push_tail(&self, _key: &str, _item: String) -> Result<u64> {
            Err(AppError::Connectivity("no store".to_string()))
        }
        async fn pop_head_blocking(&self, _key: &str) -> Result<String> {
            Err(AppError::Connectivity("no store".to_string()))
        }
        async fn publish(&self, _channel: &str, _message: String) -> Result<u64> {
            Ok(0)
        }
        async fn subscribe(&self, _channel: &str) -> Result<crate::port::Subscription> {
            Err(AppError::Connectivity("no store".to_string()))
        }
        async fn hash_incr(&self, _key: &str, _field: &str, _delta: i64) -> Result<i64> {
            Ok(0)
        }
        async fn hash_get_all(&self, _key: &str) -> Result<Vec<(String, String)>> {
            Ok(Vec::new())
        }
        async fn close(&self) {}
    }

    fn scheduler() -> Scheduler {
        let connection = crate::application::Connection::new(
            Arc::new(NoStore),
            crate::domain::Namespace::default(),
        );
        Scheduler::new(
            QueueName::new("fetch").unwrap(),
            QueueChannel::new(connection),
            Duration::from_secs(60),
            Arc::new(FixedTimeProvider(
                Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            )),
        )
    }

    #[test]
    fn test_fetch_job_carries_feed_id() {
        let job = scheduler().fetch_job("http://example.com/feed.xml").unwrap();
        assert_eq!(job.get("_id").and_then(Payload::as_str), Some("example.com_feed.xml"));
        assert_eq!(
            job.get("url").and_then(Payload::as_str),
            Some("http://example.com/feed.xml")
        );
        assert!(job.get("scheduled_at").and_then(Payload::as_timestamp).is_some());
    }

    #[test]
    fn test_fetch_job_rejects_invalid_url() {
        assert!(matches!(
            scheduler().fetch_job("not a url"),
            Err(AppError::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn test_round_stops_on_connectivity_error() {
        let err = scheduler()
            .schedule_round(&["http://example.com/feed.xml".to_string()])
            .await
            .unwrap_err();
        assert!(err.is_connectivity());
    }
}
