//! Disposable mailbox client and verification-code retrieval
//!
//! Flow used by provisioning jobs:
//! 1. `MailboxSession::register()` creates a fresh mailbox on the provider
//! 2. `MailboxSession::authenticate()` exchanges address + password for a bearer token
//! 3. `VerificationPoller::poll_for_code()` fetches the newest message until
//!    `extract()` finds a code or the time budget runs out
//!
//! Provider failures never escape as panics: session calls return `Result`, and
//! message fetches degrade to `None` after logging the cause.

pub mod config;
pub mod constants;
pub mod error;
pub mod extract;
pub mod message;
pub mod poller;
pub mod session;

pub use config::MailboxConfig;
pub use error::{Error, Result};
pub use extract::{extract, extract_fragments};
pub use message::MessageBody;
pub use poller::VerificationPoller;
pub use session::MailboxSession;

use std::future::Future;
use std::pin::Pin;

/// Source of messages for the poller.
///
/// `MailboxSession` is the production implementation; the seam exists so the
/// polling loop can run against other inbox backends. Boxed futures keep the
/// trait usable as `&mut dyn Inbox`.
pub trait Inbox: Send {
    /// Make sure a bearer token is held, logging in if necessary.
    fn ensure_session(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Newest message in the inbox, or `None` when empty or unreachable.
    fn latest_message(&mut self) -> Pin<Box<dyn Future<Output = Option<MessageBody>> + Send + '_>>;
}
