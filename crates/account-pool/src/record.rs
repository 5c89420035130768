//! Inputs to a pool rebuild: account records, policy, HTTP settings, usage stats

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One provisioned account as produced by a job.
///
/// Fields other than `address` and `password` are kept verbatim in `extra`.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountRecord {
    pub address: String,
    pub password: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AccountRecord {
    pub fn new(address: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            password: password.into(),
            extra: Map::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

impl fmt::Debug for AccountRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountRecord")
            .field("address", &self.address)
            .field("password", &"[REDACTED]")
            .field("extra", &self.extra)
            .finish()
    }
}

/// Fixed policy parameters applied to every account in a pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolPolicy {
    /// Consecutive failures before an account is disabled (0 = never)
    pub failure_threshold: u32,
    pub rate_limit_cooldown: Duration,
    /// How long an upstream session for a selected account may be reused
    pub session_cache_ttl: Duration,
}

impl Default for PoolPolicy {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            rate_limit_cooldown: Duration::from_secs(600),
            session_cache_ttl: Duration::from_secs(3600),
        }
    }
}

/// HTTP client and identity the pool's accounts are used with.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub client: reqwest::Client,
    pub user_agent: String,
}

impl HttpConfig {
    pub fn new(client: reqwest::Client, user_agent: impl Into<String>) -> Self {
        Self {
            client,
            user_agent: user_agent.into(),
        }
    }
}

/// Usage counters for one account.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountUsage {
    #[serde(default)]
    pub requests: u64,
    #[serde(default)]
    pub failures: u64,
    #[serde(default)]
    pub consecutive_failures: u32,
}

/// Point-in-time usage statistics keyed by account address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageSnapshot {
    #[serde(default)]
    pub accounts: HashMap<String, AccountUsage>,
}

impl UsageSnapshot {
    pub fn get(&self, address: &str) -> Option<&AccountUsage> {
        self.accounts.get(address)
    }
}
