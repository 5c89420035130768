//! Capability handed to a running job body
//!
//! A `TaskContext` is scoped to one task: it appends to that task's log,
//! updates its counters and results, and can hot-swap the account pool through
//! the runner. Mutations are ignored once the task reached a terminal state.

use std::sync::Arc;

use account_pool::{AccountPool, AccountRecord};
use common::{LogLevel, LogSink};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::error::Result;
use crate::registry::{TaskHandle, lock_task};
use crate::runner::Shared;
use crate::task::Task;

#[derive(Clone)]
pub struct TaskContext {
    task: TaskHandle,
    task_id: String,
    shared: Arc<Shared>,
}

impl TaskContext {
    pub(crate) fn new(task: TaskHandle, shared: Arc<Shared>) -> Self {
        let task_id = lock_task(&task).id.clone();
        Self {
            task,
            task_id,
            shared,
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Append to the task log and mirror the line to `tracing` as `[prefix] message`.
    pub fn log(&self, level: LogLevel, message: &str) {
        if !self.update(|task| task.push_log(level, message)) {
            return;
        }
        let prefix = &self.shared.log_prefix;
        match level {
            LogLevel::Info => info!(task_id = %self.task_id, "[{prefix}] {message}"),
            LogLevel::Warning => warn!(task_id = %self.task_id, "[{prefix}] {message}"),
            LogLevel::Error => error!(task_id = %self.task_id, "[{prefix}] {message}"),
        }
    }

    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    pub fn warn(&self, message: &str) {
        self.log(LogLevel::Warning, message);
    }

    pub fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }

    /// Sink that routes mailbox/poller logs into this task's log.
    pub fn log_sink(&self) -> LogSink {
        let ctx = self.clone();
        LogSink::new(Arc::new(move |level, message: &str| {
            ctx.log(level, message)
        }))
    }

    pub fn set_progress(&self, progress: u64) {
        self.update(|task| task.progress = progress);
    }

    pub fn record_success(&self) {
        self.update(|task| task.success_count += 1);
    }

    pub fn record_failure(&self) {
        self.update(|task| task.fail_count += 1);
    }

    pub fn push_result(&self, result: Value) {
        self.update(|task| task.results.push(result));
    }

    /// Current state of this task.
    pub fn snapshot(&self) -> Task {
        lock_task(&self.task).clone()
    }

    /// Rebuild the account pool from `records` without stopping the task.
    pub async fn apply_accounts_update(&self, records: &[AccountRecord]) -> Result<Arc<AccountPool>> {
        self.shared.apply_accounts_update(records).await
    }

    pub async fn account_pool(&self) -> Arc<AccountPool> {
        self.shared.account_pool().await
    }

    /// Run `f` on the task record unless it already finished.
    fn update(&self, f: impl FnOnce(&mut Task)) -> bool {
        let mut task = lock_task(&self.task);
        if task.status.is_terminal() {
            return false;
        }
        f(&mut task);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{RunnerOptions, TaskRunner};
    use account_pool::{HttpConfig, PoolPolicy};
    use std::io;
    use std::sync::Mutex;
    use std::time::Duration;

    /// In-memory writer for a scoped fmt subscriber.
    #[derive(Clone, Default)]
    struct CapturedOutput(Arc<Mutex<Vec<u8>>>);

    impl io::Write for CapturedOutput {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl CapturedOutput {
        fn line_containing(&self, needle: &str) -> Option<String> {
            String::from_utf8_lossy(&self.0.lock().unwrap())
                .lines()
                .find(|line| line.contains(needle))
                .map(str::to_string)
        }
    }

    fn runner(prefix: &str) -> TaskRunner {
        let http = HttpConfig::new(reqwest::Client::new(), "context-test");
        let policy = PoolPolicy::default();
        let mut options = RunnerOptions::new(
            Arc::new(AccountPool::empty(policy.clone(), http.clone())),
            http,
            policy,
        );
        options.log_prefix = prefix.to_string();
        TaskRunner::new(options)
    }

    // Current-thread runtime: the worker and the job share the test thread, so
    // the thread-local subscriber sees their events.
    #[tokio::test]
    async fn log_lines_mirror_to_tracing_with_prefix_and_level() {
        let output = CapturedOutput::default();
        let writer = output.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .without_time()
            .with_max_level(tracing::Level::INFO)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let runner = runner("REG");
        let id = runner
            .submit(None, |ctx| async move {
                ctx.info("mirror-info");
                ctx.warn("mirror-warn");
                ctx.log_sink().error("mirror-error");
                Ok(())
            })
            .await
            .unwrap();

        let task = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match runner.get_task(&id).await {
                    Some(task) if task.status.is_terminal() => return task,
                    _ => tokio::time::sleep(Duration::from_millis(5)).await,
                }
            }
        })
        .await
        .expect("task did not finish");
        assert_eq!(task.logs.len(), 3);

        let info = output.line_containing("[REG] mirror-info").unwrap_or_default();
        let warn = output.line_containing("[REG] mirror-warn").unwrap_or_default();
        let error = output.line_containing("[REG] mirror-error").unwrap_or_default();
        assert!(info.contains("INFO"), "info line: {info:?}");
        assert!(warn.contains("WARN"), "warn line: {warn:?}");
        assert!(error.contains("ERROR"), "error line: {error:?}");
        assert!(warn.contains(&format!("task_id={id}")), "warn line: {warn:?}");
    }

    #[tokio::test]
    async fn nothing_is_mirrored_after_the_task_finished() {
        let output = CapturedOutput::default();
        let writer = output.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let runner = runner("REG");
        let (tx, rx) = tokio::sync::oneshot::channel();
        let id = runner
            .submit(None, |ctx| async move {
                let _ = tx.send(ctx.clone());
                Ok(())
            })
            .await
            .unwrap();
        let ctx = rx.await.unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            while !runner
                .get_task(&id)
                .await
                .is_some_and(|t| t.status.is_terminal())
            {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("task did not finish");

        ctx.warn("late-line");
        assert!(output.line_containing("late-line").is_none());
        assert!(runner.get_task(&id).await.unwrap().logs.is_empty());
    }
}
