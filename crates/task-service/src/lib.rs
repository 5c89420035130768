//! Single-flight task orchestration
//!
//! A [`TaskRunner`] executes one job at a time on a dedicated worker, tracks
//! each job as a [`Task`] (status, counters, results, capped log) and lets the
//! running job hot-swap the shared account pool.

pub mod context;
pub mod error;
pub mod metrics;
pub mod registry;
pub mod runner;
pub mod task;

pub use context::TaskContext;
pub use error::{Error, Result};
pub use registry::TaskRegistry;
pub use runner::{RebindCallback, RunnerOptions, StatsProvider, TaskRunner};
pub use task::{LogEntry, MAX_TASK_LOGS, Task, TaskStatus};
