//! Pool state machine and round-robin account selection
//!
//! The account list is fixed for the lifetime of a pool; adding or removing
//! accounts means building a new pool with `rebuild`. Runtime status and usage
//! counters live behind a `RwLock` and are carried across rebuilds.
//!
//! Cooldown transitions happen automatically: when a CoolingDown account is checked
//! and its cooldown has expired, it transitions back to Available without explicit action.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::record::{AccountRecord, AccountUsage, HttpConfig, PoolPolicy, UsageSnapshot};

/// Runtime status of a pool account.
///
/// Transitions:
/// - Available → CoolingDown (rate limited)
/// - Available → Disabled (`failure_threshold` consecutive failures)
/// - CoolingDown → Available (cooldown expired)
/// - Disabled → (dropped when a rebuild no longer lists the account)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountStatus {
    Available,
    CoolingDown { until: Instant },
    Disabled,
}

impl AccountStatus {
    /// Status label for health/logging.
    pub fn label(&self) -> &'static str {
        match self {
            AccountStatus::Available => "available",
            AccountStatus::CoolingDown { .. } => "cooling_down",
            AccountStatus::Disabled => "disabled",
        }
    }
}

#[derive(Debug, Clone)]
struct AccountState {
    status: AccountStatus,
    usage: AccountUsage,
}

impl AccountState {
    fn available() -> Self {
        Self {
            status: AccountStatus::Available,
            usage: AccountUsage::default(),
        }
    }

    /// Seeded from global stats: disabled if it already crossed the threshold.
    fn from_usage(usage: AccountUsage, policy: &PoolPolicy) -> Self {
        let status = if exceeds_threshold(usage.consecutive_failures, policy) {
            AccountStatus::Disabled
        } else {
            AccountStatus::Available
        };
        Self { status, usage }
    }
}

fn exceeds_threshold(consecutive_failures: u32, policy: &PoolPolicy) -> bool {
    policy.failure_threshold > 0 && consecutive_failures >= policy.failure_threshold
}

/// A selected account, ready for use upstream.
#[derive(Debug, Clone)]
pub struct SelectedAccount {
    pub record: AccountRecord,
}

impl SelectedAccount {
    pub fn address(&self) -> &str {
        &self.record.address
    }
}

/// Pool of provisioned accounts.
///
/// Uses an `AtomicUsize` for the round-robin index and a `RwLock` for the
/// status map. The record list itself is immutable.
#[derive(Debug)]
pub struct AccountPool {
    records: Vec<AccountRecord>,
    states: RwLock<HashMap<String, AccountState>>,
    next_index: AtomicUsize,
    policy: PoolPolicy,
    http: HttpConfig,
}

impl AccountPool {
    /// Create a pool where every account starts Available.
    pub fn new(records: Vec<AccountRecord>, policy: PoolPolicy, http: HttpConfig) -> Self {
        let states = records
            .iter()
            .map(|r| (r.address.clone(), AccountState::available()))
            .collect();
        Self::from_parts(records, states, policy, http)
    }

    pub fn empty(policy: PoolPolicy, http: HttpConfig) -> Self {
        Self::new(Vec::new(), policy, http)
    }

    fn from_parts(
        records: Vec<AccountRecord>,
        states: HashMap<String, AccountState>,
        policy: PoolPolicy,
        http: HttpConfig,
    ) -> Self {
        info!(accounts = records.len(), "account pool initialized");
        Self {
            records,
            states: RwLock::new(states),
            next_index: AtomicUsize::new(0),
            policy,
            http,
        }
    }

    /// Build the replacement pool for `records`.
    ///
    /// - status is carried from this pool for addresses it already knows
    /// - usage counters come from `stats` when listed there, else from this pool
    /// - new addresses missing from `stats` start Available with zero usage
    /// - addresses absent from `records` are dropped
    pub async fn rebuild(
        &self,
        records: Vec<AccountRecord>,
        http: HttpConfig,
        policy: PoolPolicy,
        stats: &UsageSnapshot,
    ) -> AccountPool {
        let current = self.states.read().await;
        let mut carried = 0usize;
        let states = records
            .iter()
            .map(|record| {
                let address = &record.address;
                let state = match (current.get(address), stats.get(address)) {
                    (Some(existing), usage) => {
                        carried += 1;
                        AccountState {
                            status: existing.status.clone(),
                            usage: usage.copied().unwrap_or(existing.usage),
                        }
                    }
                    (None, Some(usage)) => AccountState::from_usage(*usage, &policy),
                    (None, None) => AccountState::available(),
                };
                (address.clone(), state)
            })
            .collect();
        drop(current);

        debug!(
            accounts = records.len(),
            carried,
            dropped = self.records.len().saturating_sub(carried),
            "rebuilding account pool"
        );
        AccountPool::from_parts(records, states, policy, http)
    }

    /// Select the next available account via round-robin.
    ///
    /// Scans all accounts starting from `next_index`. Expired cooldowns are
    /// transitioned to Available automatically. Returns `PoolExhausted` with
    /// pool counts if no account is available.
    pub async fn select(&self) -> Result<SelectedAccount> {
        let n = self.records.len();
        if n == 0 {
            return Err(Error::PoolExhausted(exhausted_message(0, 0, 0, 0)));
        }

        let start = self.next_index.fetch_add(1, Ordering::Relaxed) % n;
        let mut states = self.states.write().await;
        let now = Instant::now();

        for offset in 0..n {
            let record = &self.records[(start + offset) % n];
            let Some(state) = states.get_mut(&record.address) else {
                continue;
            };
            match state.status {
                AccountStatus::Available => {}
                AccountStatus::CoolingDown { until } if now >= until => {
                    info!(account = %record.address, "cooldown expired, account available again");
                    state.status = AccountStatus::Available;
                }
                _ => continue,
            }
            state.usage.requests += 1;
            return Ok(SelectedAccount {
                record: record.clone(),
            });
        }

        let (total, available, cooling, disabled) = count_statuses(&self.records, &states, now);
        Err(Error::PoolExhausted(exhausted_message(
            total, available, cooling, disabled,
        )))
    }

    /// Reset the consecutive failure count after a successful use.
    pub async fn report_success(&self, address: &str) -> Result<()> {
        let mut states = self.states.write().await;
        let state = states
            .get_mut(address)
            .ok_or_else(|| Error::NotFound(address.to_string()))?;
        state.usage.consecutive_failures = 0;
        Ok(())
    }

    /// Count a failure; disables the account once `failure_threshold` is reached.
    pub async fn report_failure(&self, address: &str) -> Result<()> {
        let mut states = self.states.write().await;
        let state = states
            .get_mut(address)
            .ok_or_else(|| Error::NotFound(address.to_string()))?;
        state.usage.failures += 1;
        state.usage.consecutive_failures += 1;
        if exceeds_threshold(state.usage.consecutive_failures, &self.policy) {
            warn!(
                account = address,
                failures = state.usage.consecutive_failures,
                "account disabled (failure threshold reached)"
            );
            state.status = AccountStatus::Disabled;
        }
        Ok(())
    }

    /// Put the account into cooldown for `rate_limit_cooldown`.
    pub async fn report_rate_limited(&self, address: &str) -> Result<()> {
        let mut states = self.states.write().await;
        let state = states
            .get_mut(address)
            .ok_or_else(|| Error::NotFound(address.to_string()))?;
        if state.status == AccountStatus::Disabled {
            return Ok(());
        }
        info!(
            account = address,
            cooldown_secs = self.policy.rate_limit_cooldown.as_secs(),
            "account entering cooldown (rate limited)"
        );
        state.status = AccountStatus::CoolingDown {
            until: Instant::now() + self.policy.rate_limit_cooldown,
        };
        Ok(())
    }

    pub async fn status(&self, address: &str) -> Option<AccountStatus> {
        self.states
            .read()
            .await
            .get(address)
            .map(|s| s.status.clone())
    }

    /// Usage counters of every account, in the shape rebuilds consume.
    pub async fn usage_snapshot(&self) -> UsageSnapshot {
        let states = self.states.read().await;
        UsageSnapshot {
            accounts: states
                .iter()
                .map(|(address, state)| (address.clone(), state.usage))
                .collect(),
        }
    }

    /// Pool health summary.
    ///
    /// Status mapping: all available → healthy, some available → degraded,
    /// none available → unhealthy.
    pub async fn health(&self) -> serde_json::Value {
        let states = self.states.read().await;
        let now = Instant::now();

        let accounts: Vec<serde_json::Value> = self
            .records
            .iter()
            .map(|record| match states.get(&record.address).map(|s| &s.status) {
                Some(AccountStatus::CoolingDown { until }) if *until > now => serde_json::json!({
                    "address": record.address,
                    "status": "cooling_down",
                    "cooldown_remaining_secs": (*until - now).as_secs()
                }),
                Some(AccountStatus::Disabled) | None => serde_json::json!({
                    "address": record.address,
                    "status": "disabled"
                }),
                Some(_) => serde_json::json!({
                    "address": record.address,
                    "status": "available"
                }),
            })
            .collect();

        let (total, available, cooling, disabled) = count_statuses(&self.records, &states, now);
        let pool_status = if available == total && total > 0 {
            "healthy"
        } else if available > 0 {
            "degraded"
        } else {
            "unhealthy"
        };

        serde_json::json!({
            "status": pool_status,
            "accounts_total": total,
            "accounts_available": available,
            "accounts_cooling_down": cooling,
            "accounts_disabled": disabled,
            "session_cache_ttl_secs": self.policy.session_cache_ttl.as_secs(),
            "accounts": accounts
        })
    }

    pub fn addresses(&self) -> Vec<String> {
        self.records.iter().map(|r| r.address.clone()).collect()
    }

    pub fn records(&self) -> &[AccountRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn policy(&self) -> &PoolPolicy {
        &self.policy
    }

    pub fn http(&self) -> &HttpConfig {
        &self.http
    }
}

/// Count accounts by status; expired cooldowns count as available.
fn count_statuses(
    records: &[AccountRecord],
    states: &HashMap<String, AccountState>,
    now: Instant,
) -> (usize, usize, usize, usize) {
    let mut available = 0usize;
    let mut cooling = 0usize;
    let mut disabled = 0usize;

    for record in records {
        match states.get(&record.address).map(|s| &s.status) {
            Some(AccountStatus::Available) => available += 1,
            Some(AccountStatus::CoolingDown { until }) => {
                if now >= *until {
                    available += 1;
                } else {
                    cooling += 1;
                }
            }
            Some(AccountStatus::Disabled) | None => disabled += 1,
        }
    }
    (records.len(), available, cooling, disabled)
}

/// Build the exhausted error message JSON.
fn exhausted_message(total: usize, available: usize, cooling: usize, disabled: usize) -> String {
    serde_json::json!({
        "error": {
            "type": "pool_exhausted",
            "message": "All accounts exhausted",
            "pool": {
                "accounts_total": total,
                "accounts_available": available,
                "accounts_cooling_down": cooling,
                "accounts_disabled": disabled
            }
        }
    })
    .to_string()
}
