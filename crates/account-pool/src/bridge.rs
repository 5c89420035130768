//! Rebuild entry point used by provisioning jobs

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::pool::AccountPool;
use crate::record::{AccountRecord, HttpConfig, PoolPolicy, UsageSnapshot};

/// Build the pool that replaces `current` once `records` are live.
///
/// Records are validated first: an empty address or password rejects the
/// whole batch. Duplicate addresses collapse to the last occurrence, keeping
/// the position of the first. The current pool is left untouched; swapping the
/// returned handle in is the caller's job.
pub async fn update_accounts_config(
    records: &[AccountRecord],
    current: &AccountPool,
    http: &HttpConfig,
    policy: &PoolPolicy,
    stats: &UsageSnapshot,
) -> Result<Arc<AccountPool>> {
    let records = normalize(records)?;
    let previous = current.len();

    let pool = current
        .rebuild(records, http.clone(), policy.clone(), stats)
        .await;

    info!(
        previous,
        accounts = pool.len(),
        failure_threshold = policy.failure_threshold,
        cooldown_secs = policy.rate_limit_cooldown.as_secs(),
        "account pool rebuilt"
    );
    Ok(Arc::new(pool))
}

fn normalize(records: &[AccountRecord]) -> Result<Vec<AccountRecord>> {
    let mut out: Vec<AccountRecord> = Vec::with_capacity(records.len());
    let mut positions: HashMap<String, usize> = HashMap::new();

    for (i, record) in records.iter().enumerate() {
        let address = record.address.trim();
        if address.is_empty() {
            return Err(Error::InvalidRecord(format!("record {i}: empty address")));
        }
        if record.password.is_empty() {
            return Err(Error::InvalidRecord(format!(
                "record {i} ({address}): empty password"
            )));
        }

        let mut record = record.clone();
        record.address = address.to_string();
        match positions.get(address) {
            Some(&pos) => {
                warn!(account = address, "duplicate account record, keeping the latest");
                out[pos] = record;
            }
            None => {
                positions.insert(address.to_string(), out.len());
                out.push(record);
            }
        }
    }
    Ok(out)
}
