// Application Layer - Coordination services built on the BackingStore port

pub mod connection;
pub mod notification;
pub mod queue_channel;
pub mod scheduler;
pub mod status_board;
pub mod worker;

// Re-exports
pub use connection::{Connection, ConnectionManager};
pub use notification::{CancelHandle, EventStream, NotificationChannel};
pub use queue_channel::QueueChannel;
pub use scheduler::Scheduler;
pub use status_board::StatusBoard;
pub use worker::{shutdown_channel, JobOutcome, ShutdownSender, ShutdownToken, Worker};
