// Status Board - aggregate counters read by the status endpoint

use crate::application::connection::Connection;
use crate::error::{AppError, Result};
use std::collections::BTreeMap;
use tracing::debug;

/// Hash holding the counters (namespaced like every other key)
pub const STATUS_KEY: &str = "status";

/// Counter: feeds known to the fetchers
pub const FEED_COUNT: &str = "feed_count";
/// Counter: items stored across all feeds
pub const ITEM_COUNT: &str = "item_count";
/// Counter: jobs finished by workers
pub const JOBS_DONE: &str = "jobs_done";
/// Counter: jobs whose handler failed
pub const JOBS_FAILED: &str = "jobs_failed";

/// Atomic counters in a single namespaced hash
#[derive(Clone, Debug)]
pub struct StatusBoard {
    connection: Connection,
}

impl StatusBoard {
    pub fn new(connection: Connection) -> Self {
        Self { connection }
    }

    /// Add `delta` to `field`; returns the new value
    pub async fn incr(&self, field: &str, delta: i64) -> Result<i64> {
        let key = self.connection.key(STATUS_KEY);
        let store = self.connection.store()?;

        let value = self
            .connection
            .observe(store.hash_incr(&key, field, delta).await)?;
        debug!(field = field, delta = delta, value = value, "Status counter updated");
        Ok(value)
    }

    pub async fn get(&self, field: &str) -> Result<Option<i64>> {
        Ok(self.snapshot().await?.get(field).copied())
    }

    /// All counters
    ///
    /// # Errors
    /// - `AppError::MalformedPayload` if a stored value is not an integer
    pub async fn snapshot(&self) -> Result<BTreeMap<String, i64>> {
        let key = self.connection.key(STATUS_KEY);
        let store = self.connection.store()?;

        let fields = self.connection.observe(store.hash_get_all(&key).await)?;
        fields
            .into_iter()
            .map(|(field, raw)| {
                raw.trim()
                    .parse::<i64>()
                    .map(|value| (field.clone(), value))
                    .map_err(|_| {
                        AppError::MalformedPayload(format!(
                            "status field '{}' is not an integer: '{}'",
                            field, raw
                        ))
                    })
            })
            .collect()
    }
}
