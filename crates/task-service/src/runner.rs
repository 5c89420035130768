//! Single-worker task execution
//!
//! `submit` registers a Pending task under the registry lock and queues the job
//! for the one worker loop. The worker moves the task to Running, drives the
//! job on its own spawned tokio task (so a panic surfaces as a `JoinError`
//! instead of killing the loop) and records the terminal state.
//!
//! Locks:
//! - registry `RwLock`: task creation and the current pointer
//! - per-task `Mutex`: log append/truncate and counters, never held across `.await`
//! - account pool `Mutex`: serializes rebuild-and-swap

use std::any::Any;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use account_pool::{AccountPool, AccountRecord, HttpConfig, PoolPolicy, UsageSnapshot};
use tokio::sync::{Mutex, RwLock, mpsc};
use tracing::{error, info, warn};

use crate::context::TaskContext;
use crate::error::{Error, Result};
use crate::registry::{TaskHandle, TaskRegistry, lock_task};
use crate::task::{Task, TaskStatus};

/// Supplies the global usage statistics consumed by pool rebuilds.
pub type StatsProvider = Arc<dyn Fn() -> UsageSnapshot + Send + Sync>;

/// Invoked with every new pool handle so other holders can rebind.
pub type RebindCallback = Arc<dyn Fn(Arc<AccountPool>) + Send + Sync>;

type JobFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;
type Job = Box<dyn FnOnce(TaskContext) -> JobFuture + Send>;

struct Queued {
    task: TaskHandle,
    job: Job,
}

/// Construction parameters for a [`TaskRunner`].
pub struct RunnerOptions {
    /// Tag for mirrored task log lines, e.g. `REGISTER`
    pub log_prefix: String,
    pub pool: Arc<AccountPool>,
    pub http: HttpConfig,
    pub policy: PoolPolicy,
    pub stats: StatsProvider,
    pub rebind: Option<RebindCallback>,
}

impl RunnerOptions {
    pub fn new(pool: Arc<AccountPool>, http: HttpConfig, policy: PoolPolicy) -> Self {
        Self {
            log_prefix: "TASK".to_string(),
            pool,
            http,
            policy,
            stats: Arc::new(UsageSnapshot::default),
            rebind: None,
        }
    }
}

pub(crate) struct Shared {
    registry: RwLock<TaskRegistry>,
    pool: Mutex<Arc<AccountPool>>,
    http: HttpConfig,
    policy: PoolPolicy,
    stats: StatsProvider,
    rebind: Option<RebindCallback>,
    pub(crate) log_prefix: String,
}

impl Shared {
    /// Rebuild from `records`, swap the held handle and notify the rebind callback.
    pub(crate) async fn apply_accounts_update(
        &self,
        records: &[AccountRecord],
    ) -> Result<Arc<AccountPool>> {
        let mut pool = self.pool.lock().await;
        let stats = (self.stats)();
        let rebuilt =
            account_pool::update_accounts_config(records, &pool, &self.http, &self.policy, &stats)
                .await?;

        *pool = rebuilt.clone();
        if let Some(rebind) = &self.rebind {
            rebind(rebuilt.clone());
        }
        info!(accounts = rebuilt.len(), "account pool handle replaced");
        Ok(rebuilt)
    }

    pub(crate) async fn account_pool(&self) -> Arc<AccountPool> {
        self.pool.lock().await.clone()
    }
}

/// Runs at most one job at a time.
///
/// Cloning is cheap; clones share the registry, worker and pool handle.
#[derive(Clone)]
pub struct TaskRunner {
    shared: Arc<Shared>,
    queue: mpsc::UnboundedSender<Queued>,
}

impl TaskRunner {
    /// Create the runner and spawn its worker. Must be called within a tokio runtime.
    pub fn new(options: RunnerOptions) -> Self {
        let shared = Arc::new(Shared {
            registry: RwLock::new(TaskRegistry::new()),
            pool: Mutex::new(options.pool),
            http: options.http,
            policy: options.policy,
            stats: options.stats,
            rebind: options.rebind,
            log_prefix: options.log_prefix,
        });
        let (queue, rx) = mpsc::unbounded_channel();
        tokio::spawn(worker_loop(rx, shared.clone()));
        Self { shared, queue }
    }

    /// Queue `job` as a new task and return its id without waiting for it.
    ///
    /// Rejected with `Busy` while the current task is Pending or Running.
    /// A missing `id` gets a random UUID.
    pub async fn submit<F, Fut>(&self, id: Option<String>, job: F) -> Result<String>
    where
        F: FnOnce(TaskContext) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let id = id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let job: Job = Box::new(move |ctx| -> JobFuture { Box::pin(job(ctx)) });

        let mut registry = self.shared.registry.write().await;
        if let Some(current) = registry.active() {
            warn!(task_id = %id, current = %current, "task rejected, another task is active");
            return Err(Error::Busy { current });
        }
        let task = registry.insert_current(Task::new(id.clone()))?;

        if self
            .queue
            .send(Queued {
                task: task.clone(),
                job,
            })
            .is_err()
        {
            lock_task(&task).finish(Some(Error::WorkerStopped.to_string()));
            return Err(Error::WorkerStopped);
        }

        info!(task_id = %id, "task submitted");
        Ok(id)
    }

    pub async fn get_task(&self, id: &str) -> Option<Task> {
        self.shared.registry.read().await.get(id)
    }

    /// Most recently submitted task, finished or not.
    pub async fn get_current_task(&self) -> Option<Task> {
        self.shared.registry.read().await.current()
    }

    /// Rebuild the account pool from `records` and swap the handle in.
    pub async fn apply_accounts_update(
        &self,
        records: &[AccountRecord],
    ) -> Result<Arc<AccountPool>> {
        self.shared.apply_accounts_update(records).await
    }

    /// Handle currently held by the runner.
    pub async fn account_pool(&self) -> Arc<AccountPool> {
        self.shared.account_pool().await
    }
}

async fn worker_loop(mut rx: mpsc::UnboundedReceiver<Queued>, shared: Arc<Shared>) {
    while let Some(queued) = rx.recv().await {
        run_job(queued, shared.clone()).await;
    }
    info!("task worker stopped");
}

async fn run_job(queued: Queued, shared: Arc<Shared>) {
    let Queued { task, job } = queued;
    let task_id = {
        let mut task = lock_task(&task);
        task.start();
        task.id.clone()
    };
    info!(task_id = %task_id, "task started");

    let ctx = TaskContext::new(task.clone(), shared);
    let started = Instant::now();
    let error = match tokio::spawn(job(ctx)).await {
        Ok(Ok(())) => None,
        Ok(Err(err)) => Some(describe_error(&err)),
        Err(join) if join.is_panic() => Some(format!(
            "job panicked: {}",
            panic_message(join.into_panic())
        )),
        Err(join) => Some(format!("job aborted: {join}")),
    };

    let status = {
        let mut task = lock_task(&task);
        task.finish(error);
        task.status
    };
    crate::metrics::record_run(status, started.elapsed().as_secs_f64());

    match status {
        TaskStatus::Success => info!(task_id = %task_id, "task succeeded"),
        _ => {
            let reason = lock_task(&task).error.clone().unwrap_or_default();
            error!(task_id = %task_id, error = %reason, "task failed");
        }
    }
}

fn describe_error(err: &anyhow::Error) -> String {
    let text = format!("{err:#}");
    if text.trim().is_empty() {
        "job failed".to_string()
    } else {
        text
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
