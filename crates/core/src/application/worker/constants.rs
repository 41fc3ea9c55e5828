// Worker constants (no magic values)

/// Queue fetch jobs are scheduled on
pub const DEFAULT_JOB_QUEUE: &str = "fetch";

/// Topic workers announce job outcomes on
pub const DEFAULT_STATUS_TOPIC: &str = "fetch_status";

/// `state` field of a status event for a handled job
pub const STATE_DONE: &str = "done";

/// `state` field of a status event for a job whose handler failed or panicked
pub const STATE_FAILED: &str = "failed";
