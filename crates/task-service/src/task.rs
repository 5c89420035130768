//! Task record and lifecycle states

use std::collections::VecDeque;

use chrono::{DateTime, Local, Utc};
use common::LogLevel;
use serde::Serialize;
use serde_json::Value;

/// Maximum number of log entries kept per task; older entries are dropped first.
pub const MAX_TASK_LOGS: usize = 200;

const LOG_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Task lifecycle: Pending → Running → {Success, Failed}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Success,
    Failed,
}

impl TaskStatus {
    /// Success and Failed are terminal; nothing transitions out of them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Success | TaskStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Success => "success",
            TaskStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    /// Local wall-clock time, `YYYY-MM-DD HH:MM:SS`
    pub time: String,
    pub level: LogLevel,
    pub message: String,
}

/// One tracked unit of orchestrated work.
#[derive(Debug, Clone, Serialize)]
pub struct Task {
    pub id: String,
    pub status: TaskStatus,
    pub progress: u64,
    pub success_count: u64,
    pub fail_count: u64,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub results: Vec<Value>,
    pub error: Option<String>,
    pub logs: VecDeque<LogEntry>,
}

impl Task {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: TaskStatus::Pending,
            progress: 0,
            success_count: 0,
            fail_count: 0,
            created_at: Utc::now(),
            finished_at: None,
            results: Vec::new(),
            error: None,
            logs: VecDeque::with_capacity(MAX_TASK_LOGS),
        }
    }

    /// Append a log entry stamped with the local time, keeping the newest
    /// `MAX_TASK_LOGS` entries.
    pub(crate) fn push_log(&mut self, level: LogLevel, message: &str) {
        self.logs.push_back(LogEntry {
            time: Local::now().format(LOG_TIME_FORMAT).to_string(),
            level,
            message: message.to_string(),
        });
        while self.logs.len() > MAX_TASK_LOGS {
            self.logs.pop_front();
        }
    }

    pub(crate) fn start(&mut self) {
        if self.status == TaskStatus::Pending {
            self.status = TaskStatus::Running;
        }
    }

    /// Move to a terminal state. A task that already finished is left as is.
    pub(crate) fn finish(&mut self, error: Option<String>) {
        if self.status.is_terminal() {
            return;
        }
        self.finished_at = Some(Utc::now());
        match error {
            None => self.status = TaskStatus::Success,
            Some(error) => {
                self.status = TaskStatus::Failed;
                self.error = Some(error);
            }
        }
    }
}
