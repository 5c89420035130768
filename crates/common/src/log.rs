//! Log levels and the callback sink used to route component logs into task logs
//!
//! Mailbox sessions and pollers do not know about tasks. They report through a
//! `LogSink`; a job body installs a callback that appends to its task log, and
//! everything else falls through to `tracing`.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, warn};

/// Severity of a task/component log entry.
///
/// Levels are always chosen in code, so there is no string parsing and no
/// "unknown" level to fall back from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Callback receiving `(level, message)` pairs.
pub type LogCallback = Arc<dyn Fn(LogLevel, &str) + Send + Sync>;

/// Destination for component log lines.
///
/// With a callback installed every entry goes to the callback only; without one
/// entries are emitted through `tracing` at the matching level.
#[derive(Clone, Default)]
pub struct LogSink {
    callback: Option<LogCallback>,
}

impl LogSink {
    pub fn new(callback: LogCallback) -> Self {
        Self {
            callback: Some(callback),
        }
    }

    /// Sink that writes straight to `tracing`.
    pub fn tracing() -> Self {
        Self::default()
    }

    pub fn emit(&self, level: LogLevel, message: &str) {
        match &self.callback {
            Some(callback) => callback(level, message),
            None => match level {
                LogLevel::Info => info!("{message}"),
                LogLevel::Warning => warn!("{message}"),
                LogLevel::Error => error!("{message}"),
            },
        }
    }

    pub fn info(&self, message: &str) {
        self.emit(LogLevel::Info, message);
    }

    pub fn warn(&self, message: &str) {
        self.emit(LogLevel::Warning, message);
    }

    pub fn error(&self, message: &str) {
        self.emit(LogLevel::Error, message);
    }
}

impl fmt::Debug for LogSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogSink")
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn level_displays_lowercase() {
        let names: Vec<String> = [LogLevel::Info, LogLevel::Warning, LogLevel::Error]
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(names, ["info", "warning", "error"]);
        assert_eq!(LogLevel::Error.as_str(), "error");
    }

    #[test]
    fn sink_forwards_to_callback() {
        let seen: Arc<Mutex<Vec<(LogLevel, String)>>> = Arc::new(Mutex::new(Vec::new()));
        let captured = seen.clone();
        let sink = LogSink::new(Arc::new(move |level, message: &str| {
            captured.lock().unwrap().push((level, message.to_string()));
        }));

        sink.info("hello");
        sink.error("boom");

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], (LogLevel::Info, "hello".to_string()));
        assert_eq!(seen[1], (LogLevel::Error, "boom".to_string()));
    }

    #[test]
    fn tracing_sink_does_not_panic_without_subscriber() {
        LogSink::tracing().warn("no subscriber installed");
    }
}
