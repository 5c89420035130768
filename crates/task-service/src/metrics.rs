//! Task metrics
//!
//! - `task_runs_total` (counter): label `status` (`success` / `failed`)
//! - `task_duration_seconds` (histogram): label `status`

use crate::task::TaskStatus;

/// Record a task reaching a terminal state.
pub fn record_run(status: TaskStatus, duration_secs: f64) {
    let status = status.as_str();
    metrics::counter!("task_runs_total", "status" => status).increment(1);
    metrics::histogram!("task_duration_seconds", "status" => status).record(duration_secs);
}
