//! Adaptive polling
//!
//! Responsible for:
//! - Re-running a refresh function on a delay that grows on failure
//! - Never overlapping two invocations of the same task
//! - Cancelling cleanly when the task is disabled or dropped

mod backoff;
mod task;

pub use backoff::BackoffPolicy;
pub use task::{refresh_fn, Liveness, PollTask, RefreshFn};
