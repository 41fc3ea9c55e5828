// feedq Infrastructure - Redis Adapter
// Implements: BackingStore, Connector
//
// Queues are lists (RPUSH / BLPOP 0), topics are pub/sub channels,
// counters are a hash (HINCRBY / HGETALL).

mod connection;
mod error;
mod store;

pub use connection::RedisConnector;
pub use store::RedisStore;
