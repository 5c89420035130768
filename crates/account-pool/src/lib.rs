//! Account pool for freshly provisioned mailbox accounts
//!
//! Holds the accounts produced by provisioning jobs with round-robin selection,
//! failure counting and rate-limit cooldowns. Jobs never mutate a live pool:
//! `update_accounts_config` builds a replacement from the new records, the
//! current pool's runtime state and a usage statistics snapshot, and the caller
//! swaps the returned handle in.
//!
//! Account lifecycle:
//! 1. Job finishes a mailbox → record handed to `update_accounts_config`
//! 2. Pool selects account round-robin → caller uses it upstream
//! 3. Upstream rate-limits → `CoolingDown` for `rate_limit_cooldown`
//! 4. `failure_threshold` consecutive failures → `Disabled`
//! 5. Cooldown expires → automatic transition back to `Available`

pub mod bridge;
pub mod error;
pub mod pool;
pub mod record;

pub use bridge::update_accounts_config;
pub use error::{Error, Result};
pub use pool::{AccountPool, AccountStatus, SelectedAccount};
pub use record::{AccountRecord, AccountUsage, HttpConfig, PoolPolicy, UsageSnapshot};
