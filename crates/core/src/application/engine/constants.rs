// Engine constants (ADR: No magic values)
use std::time::Duration;

/// Slack added to a strategy's own timeouts for the engine-side guard (5s)
pub const ITEM_BUDGET_GRACE: Duration = Duration::from_secs(5);

/// Reason for items that never started because stop was requested
pub const STOPPED_BEFORE_START: &str = "Stopped before start";

/// Reason for in-flight calls torn down by a stop request
pub const STOP_ABORT_REASON: &str = "Aborted by stop request";

/// Prefix for items failed by an engine fault
pub const FAULT_REASON_PREFIX: &str = "Aborted";

/// Error code stored on items failed by an engine fault
pub const FAULT_ERROR_CODE: &str = "engine_fault";
