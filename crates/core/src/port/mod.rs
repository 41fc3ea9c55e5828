// Port Layer - Interfaces for external dependencies

pub mod backing_store;
pub mod job_handler;
pub mod time_provider; // For deterministic testing

// Re-exports
pub use backing_store::{BackingStore, Connector, Subscription};
pub use job_handler::JobHandler;
pub use time_provider::TimeProvider;
