// In-process broker state shared by every MemoryStore connection

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{mpsc, Notify};

#[derive(Default)]
struct BrokerState {
    lists: HashMap<String, VecDeque<String>>,
    hashes: HashMap<String, HashMap<String, String>>,
    channels: HashMap<String, HashMap<u64, mpsc::UnboundedSender<String>>>,
}

/// The "server": lists, hashes and channels, shared between connections
///
/// Every operation takes the state lock for its whole critical section, so a
/// push, a pop or a publish is atomic with respect to all others.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    state: Arc<Mutex<BrokerState>>,
    item_pushed: Arc<Notify>,
    next_subscriber: Arc<AtomicU64>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BrokerState> {
        // A panic while holding the lock cannot leave a half-applied list op
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn push_tail(&self, key: &str, item: String) -> u64 {
        let len = {
            let mut state = self.lock();
            let list = state.lists.entry(key.to_string()).or_default();
            list.push_back(item);
            list.len() as u64
        };
        self.item_pushed.notify_waiters();
        len
    }

    pub(crate) fn try_pop_head(&self, key: &str) -> Option<String> {
        let mut state = self.lock();
        let list = state.lists.get_mut(key)?;
        let item = list.pop_front();
        if list.is_empty() {
            state.lists.remove(key);
        }
        item
    }

    pub(crate) fn item_pushed(&self) -> &Notify {
        &self.item_pushed
    }

    pub(crate) fn publish(&self, channel: &str, message: &str) -> u64 {
        let state = self.lock();
        state
            .channels
            .get(channel)
            .map(|subscribers| {
                subscribers
                    .values()
                    .filter(|tx| tx.send(message.to_string()).is_ok())
                    .count() as u64
            })
            .unwrap_or(0)
    }

    pub(crate) fn register(&self, channel: &str) -> (u64, mpsc::UnboundedReceiver<String>) {
        let id = self.next_subscriber.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock()
            .channels
            .entry(channel.to_string())
            .or_default()
            .insert(id, tx);
        (id, rx)
    }

    pub(crate) fn unregister(&self, channel: &str, id: u64) {
        let mut state = self.lock();
        if let Some(subscribers) = state.channels.get_mut(channel) {
            subscribers.remove(&id);
            if subscribers.is_empty() {
                state.channels.remove(channel);
            }
        }
    }

    pub(crate) fn hash_incr(&self, key: &str, field: &str, delta: i64) -> Result<i64, String> {
        let mut state = self.lock();
        let hash = state.hashes.entry(key.to_string()).or_default();
        let current = match hash.get(field) {
            Some(raw) => raw
                .parse::<i64>()
                .map_err(|_| format!("hash value is not an integer: '{}'", raw))?,
            None => 0,
        };
        let next = current
            .checked_add(delta)
            .ok_or_else(|| "increment or decrement would overflow".to_string())?;
        hash.insert(field.to_string(), next.to_string());
        Ok(next)
    }

    pub(crate) fn hash_get_all(&self, key: &str) -> Vec<(String, String)> {
        self.lock()
            .hashes
            .get(key)
            .map(|hash| hash.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default()
    }

    /// Overwrite a hash field with a raw string (test seeding)
    pub fn hash_set(&self, key: &str, field: &str, value: impl Into<String>) {
        self.lock()
            .hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.into());
    }

    /// Push a raw, possibly undecodable, item (test seeding)
    pub fn push_raw(&self, key: &str, item: impl Into<String>) -> u64 {
        self.push_tail(key, item.into())
    }

    /// Broadcast a raw, possibly undecodable, message (test seeding)
    pub fn publish_raw(&self, channel: &str, message: &str) -> u64 {
        self.publish(channel, message)
    }

    /// Current length of a list
    pub fn list_len(&self, key: &str) -> usize {
        self.lock().lists.get(key).map_or(0, VecDeque::len)
    }

    /// Registered subscribers on a channel
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.lock().channels.get(channel).map_or(0, HashMap::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_pop_fifo() {
        let broker = MemoryBroker::new();
        assert_eq!(broker.push_tail("q", "a".to_string()), 1);
        assert_eq!(broker.push_tail("q", "b".to_string()), 2);
        assert_eq!(broker.try_pop_head("q").as_deref(), Some("a"));
        assert_eq!(broker.try_pop_head("q").as_deref(), Some("b"));
        assert_eq!(broker.try_pop_head("q"), None);
        assert_eq!(broker.list_len("q"), 0);
    }

    #[test]
    fn test_publish_without_subscribers_reaches_nobody() {
        let broker = MemoryBroker::new();
        assert_eq!(broker.publish("status", "x"), 0);
    }

    #[test]
    fn test_unregister_removes_subscriber() {
        let broker = MemoryBroker::new();
        let (id, _rx) = broker.register("status");
        assert_eq!(broker.subscriber_count("status"), 1);
        broker.unregister("status", id);
        assert_eq!(broker.subscriber_count("status"), 0);
    }

    #[test]
    fn test_hash_incr_rejects_non_integer() {
        let broker = MemoryBroker::new();
        assert_eq!(broker.hash_incr("status", "feed_count", 2), Ok(2));
        broker.hash_set("status", "item_count", "many");
        assert!(broker.hash_incr("status", "item_count", 1).is_err());
    }
}
