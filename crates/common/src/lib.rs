//! Common types shared by the mail provisioner crates

mod error;
mod log;
mod secret;

pub use error::{Error, Result};
pub use log::{LogCallback, LogLevel, LogSink};
pub use secret::Secret;
