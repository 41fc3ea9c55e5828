// MemoryConnector - opens MemoryStore connections to a shared broker

use crate::broker::MemoryBroker;
use crate::store::MemoryStore;
use async_trait::async_trait;
use feedq_core::error::{AppError, Result};
use feedq_core::port::{BackingStore, Connector};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// URL scheme selecting the in-process store
pub const MEMORY_URL: &str = "memory://";

/// Connector for the in-process broker
///
/// Can be switched unavailable to exercise connect failures, and keeps the
/// last opened store so tests can cut it from underneath its users.
pub struct MemoryConnector {
    broker: MemoryBroker,
    available: AtomicBool,
    connects: AtomicUsize,
    last: Mutex<Option<Arc<MemoryStore>>>,
}

impl MemoryConnector {
    pub fn new(broker: MemoryBroker) -> Self {
        Self {
            broker,
            available: AtomicBool::new(true),
            connects: AtomicUsize::new(0),
            last: Mutex::new(None),
        }
    }

    pub fn broker(&self) -> &MemoryBroker {
        &self.broker
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of successful connects so far
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Drop the most recently opened connection's transport
    pub fn disconnect_last(&self) {
        let last = self.last.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(store) = last.as_ref() {
            store.disconnect();
        }
    }
}

impl Default for MemoryConnector {
    fn default() -> Self {
        Self::new(MemoryBroker::new())
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self) -> Result<Arc<dyn BackingStore>> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(AppError::Connectivity(
                "memory broker is unavailable".to_string(),
            ));
        }
        // Yield so concurrent first callers really overlap in tests
        tokio::task::yield_now().await;

        let store = Arc::new(MemoryStore::new(self.broker.clone()));
        *self.last.lock().unwrap_or_else(|p| p.into_inner()) = Some(Arc::clone(&store));
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(store)
    }

    fn describe(&self) -> String {
        MEMORY_URL.to_string()
    }
}
