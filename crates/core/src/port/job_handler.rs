// Job Handler Port
// What a worker does with a dequeued job (fetching, parsing, storing)

use crate::domain::Payload;
use crate::error::Result;
use async_trait::async_trait;

/// Processes one dequeued job
///
/// Implementations:
/// - feed fetchers (outside this workspace)
/// - LineHandler in feedq-cli: relays jobs to another process
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Handle a job and optionally return a result summary for the status event
    ///
    /// # Errors
    /// Any error marks the job failed. The job is not requeued.
    async fn handle(&self, job: Payload) -> Result<Option<Payload>>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::sync::{Arc, Mutex};

    /// Mock handler behavior
    #[derive(Debug, Clone)]
    pub enum MockBehavior {
        /// Succeed, echoing nothing
        Success,
        /// Succeed with a fixed result summary
        Reply(Payload),
        /// Fail with message
        Fail(String),
        /// Panic with message (for panic isolation testing)
        Panic(String),
    }

    /// Mock Job Handler that records every job it sees
    pub struct MockJobHandler {
        behavior: Arc<Mutex<MockBehavior>>,
        seen: Arc<Mutex<Vec<Payload>>>,
    }

    impl MockJobHandler {
        pub fn new(behavior: MockBehavior) -> Self {
            Self {
                behavior: Arc::new(Mutex::new(behavior)),
                seen: Arc::new(Mutex::new(Vec::new())),
            }
        }
        pub fn new_success() -> Self {
            Self::new(MockBehavior::Success)
        }
        pub fn new_fail(message: impl Into<String>) -> Self {
            Self::new(MockBehavior::Fail(message.into()))
        }
        pub fn new_panic_inducing(message: impl Into<String>) -> Self {
            Self::new(MockBehavior::Panic(message.into()))
        }
        pub fn set_behavior(&self, behavior: MockBehavior) {
            *self.behavior.lock().unwrap() = behavior;
        }
        pub fn seen(&self) -> Vec<Payload> {
            self.seen.lock().unwrap().clone()
        }
        pub fn call_count(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl JobHandler for MockJobHandler {
        async fn handle(&self, job: Payload) -> Result<Option<Payload>> {
            self.seen.lock().unwrap().push(job);

            let behavior = self.behavior.lock().unwrap().clone();

            match behavior {
                MockBehavior::Success => Ok(None),
                MockBehavior::Reply(result) => Ok(Some(result)),
                MockBehavior::Fail(msg) => Err(AppError::Handler(msg)),
                MockBehavior::Panic(msg) => {
                    panic!("{}", msg); // Actually panic for panic isolation testing
                }
            }
        }
    }
}
