//! Error types for mailbox provider operations

/// Errors from mailbox provider calls.
///
/// Transport and protocol failures are reported the same way by callers: the
/// session logs them and the operation counts as failed.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unexpected provider response: {0}")]
    Protocol(String),

    #[error("mailbox credentials missing, register or set credentials first")]
    MissingCredentials,
}

/// Result alias for mailbox operations.
pub type Result<T> = std::result::Result<T, Error>;
