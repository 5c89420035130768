//! Mail Provisioner
//!
//! Single-binary tool that:
//! 1. Loads configuration and starts the single-flight task runner
//! 2. Submits one provisioning task: register a mailbox, poll for the
//!    verification code, publish the account into the pool
//! 3. Waits for the task to finish and prints its record as JSON

mod config;
mod job;
mod metrics;

use std::sync::Arc;
use std::time::Duration;

use account_pool::{AccountPool, HttpConfig};
use anyhow::{Context, Result};
use task_service::{RunnerOptions, Task, TaskRunner, TaskStatus};
use tokio::sync::watch;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::job::ProvisionJob;

/// How often the task record is checked while waiting.
const STATUS_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting mail-provisioner");

    let prometheus =
        metrics::install_recorder().context("failed to install Prometheus recorder")?;

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        base_url = %config.mailbox.base_url,
        domain = ?config.mailbox.domain,
        api_key = config.mailbox.api_key.is_some(),
        poll_timeout_secs = config.poll.timeout_secs,
        poll_interval_secs = config.poll.interval_secs,
        "configuration loaded"
    );

    let client = reqwest::Client::builder()
        .user_agent(config.pool.user_agent.clone())
        .build()
        .context("failed to build pool HTTP client")?;
    let http = HttpConfig::new(client, config.pool.user_agent.clone());
    let policy = config.pool.policy();

    // Other holders of the pool observe swaps through this channel.
    let initial = Arc::new(AccountPool::empty(policy.clone(), http.clone()));
    let (pool_tx, pool_rx) = watch::channel(initial.clone());

    let mut options = RunnerOptions::new(initial, http, policy);
    options.log_prefix = config.task.log_prefix.clone();
    options.rebind = Some(Arc::new(move |pool: Arc<AccountPool>| {
        pool_tx.send_replace(pool);
    }));
    let runner = TaskRunner::new(options);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let job = ProvisionJob {
        mailbox: config.mailbox.to_mailbox_config(),
        domain: config.mailbox.domain.clone(),
        poll_timeout: Duration::from_secs(config.poll.timeout_secs),
        poll_interval: Duration::from_secs(config.poll.interval_secs),
        shutdown: shutdown_rx,
    };
    let task_id = runner
        .submit(None, |ctx| job.run(ctx))
        .await
        .context("failed to submit provisioning task")?;

    let task = wait_for_task(&runner, &task_id).await?;
    println!("{}", serde_json::to_string_pretty(&task)?);

    let pool = pool_rx.borrow().clone();
    info!(health = %pool.health().await, "account pool");
    debug!(metrics = %prometheus.render(), "run metrics");

    match task.status {
        TaskStatus::Success => {
            info!(task_id = %task.id, "provisioning complete");
            Ok(())
        }
        _ => anyhow::bail!(
            "provisioning task {} failed: {}",
            task.id,
            task.error.unwrap_or_default()
        ),
    }
}

/// Poll the runner until the task reaches a terminal state.
async fn wait_for_task(runner: &TaskRunner, id: &str) -> Result<Task> {
    let mut ticker = tokio::time::interval(STATUS_POLL_INTERVAL);
    let mut last_progress = None;
    loop {
        ticker.tick().await;
        let task = runner
            .get_task(id)
            .await
            .with_context(|| format!("task {id} is not registered"))?;
        if task.status.is_terminal() {
            return Ok(task);
        }
        if last_progress != Some(task.progress) {
            info!(task_id = %id, status = task.status.as_str(), progress = task.progress, "task progress");
            last_progress = Some(task.progress);
        }
    }
}

/// Wait for SIGTERM or SIGINT.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, cancelling task"),
        _ = terminate => info!("received SIGTERM, cancelling task"),
    }
}
