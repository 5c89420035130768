//! Error types for task submission and account updates

/// Errors surfaced to callers of the task runner.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Another task is still pending or running.
    #[error("task {current} is still active")]
    Busy { current: String },

    #[error("task id already exists: {0}")]
    DuplicateTask(String),

    #[error("task worker has stopped")]
    WorkerStopped,

    #[error("account update failed: {0}")]
    AccountUpdate(#[from] account_pool::Error),
}

/// Result alias for task service operations.
pub type Result<T> = std::result::Result<T, Error>;
