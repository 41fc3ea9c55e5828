// Domain Layer - Pure values: identifiers, names, payloads

pub mod feed_id;
pub mod names;
pub mod payload;

// Re-exports
pub use feed_id::{generate_id, FeedId};
pub use names::{Namespace, QueueName, TopicName, DEFAULT_NAMESPACE};
pub use payload::{decode, encode, ObjectId, Payload};
