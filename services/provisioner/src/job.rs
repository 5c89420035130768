//! Mailbox provisioning job body
//!
//! register → poll for the verification code → publish the account to the pool

use std::time::Duration;

use account_pool::AccountRecord;
use anyhow::{Context, Result};
use mailbox::{MailboxConfig, MailboxSession, VerificationPoller};
use serde_json::json;
use task_service::TaskContext;
use tokio::sync::watch;

/// Everything one provisioning run needs, moved into the task.
pub struct ProvisionJob {
    pub mailbox: MailboxConfig,
    pub domain: Option<String>,
    pub poll_timeout: Duration,
    pub poll_interval: Duration,
    pub shutdown: watch::Receiver<bool>,
}

impl ProvisionJob {
    pub async fn run(self, ctx: TaskContext) -> Result<()> {
        let sink = ctx.log_sink();
        let mut session = MailboxSession::new(self.mailbox)
            .context("building mailbox client")?
            .with_log_sink(sink.clone());

        ctx.info("Registering mailbox");
        session
            .register(self.domain.as_deref())
            .await
            .inspect_err(|_| ctx.record_failure())
            .context("mailbox registration failed")?;
        ctx.set_progress(30);

        let address = session.address().unwrap_or_default().to_string();
        let password = session
            .password()
            .map(|p| p.expose().clone())
            .unwrap_or_default();

        let poller = VerificationPoller::new(self.poll_timeout, self.poll_interval)
            .with_log_sink(sink)
            .with_shutdown(self.shutdown);
        let Some(code) = poller.poll_for_code(&mut session).await else {
            ctx.record_failure();
            anyhow::bail!("no verification code received for {address}");
        };
        ctx.set_progress(70);

        let account_id = session.account_id().map(str::to_string);
        let record = AccountRecord::new(&address, password)
            .with_field("code", json!(code))
            .with_field("account_id", json!(account_id));

        let mut records = ctx.account_pool().await.records().to_vec();
        records.push(record);
        let pool = ctx
            .apply_accounts_update(&records)
            .await
            .context("account pool update failed")?;

        ctx.push_result(json!({
            "address": address,
            "account_id": account_id,
            "code": code,
        }));
        ctx.record_success();
        ctx.set_progress(100);
        ctx.info(&format!("Provisioned {address}, pool has {} accounts", pool.len()));
        Ok(())
    }
}
