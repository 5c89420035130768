//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The mailbox API key is loaded from MAILBOX_API_KEY or api_key_file,
//! never stored in the TOML directly.

use std::path::{Path, PathBuf};
use std::time::Duration;

use account_pool::PoolPolicy;
use common::Secret;
use mailbox::MailboxConfig;
use serde::Deserialize;

const API_KEY_ENV: &str = "MAILBOX_API_KEY";

/// Root configuration
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub mailbox: MailboxSection,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub task: TaskConfig,
}

/// Mailbox provider settings
#[derive(Debug, Deserialize)]
pub struct MailboxSection {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Fixed mailbox domain; discovered from the provider when unset
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub proxy: Option<String>,
    #[serde(default)]
    pub api_key_file: Option<PathBuf>,
    #[serde(skip)]
    pub api_key: Option<Secret<String>>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub log_body: bool,
}

impl Default for MailboxSection {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            domain: None,
            proxy: None,
            api_key_file: None,
            api_key: None,
            request_timeout_secs: default_request_timeout(),
            log_body: false,
        }
    }
}

impl MailboxSection {
    pub fn to_mailbox_config(&self) -> MailboxConfig {
        MailboxConfig {
            base_url: self.base_url.clone(),
            proxy: self.proxy.clone(),
            api_key: self.api_key.clone(),
            log_body: self.log_body,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }
}

/// Verification code polling budget
#[derive(Debug, Deserialize)]
pub struct PollConfig {
    #[serde(default = "default_poll_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_poll_interval")]
    pub interval_secs: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_poll_timeout(),
            interval_secs: default_poll_interval(),
        }
    }
}

/// Account pool policy and the HTTP identity its accounts are used with
#[derive(Debug, Deserialize)]
pub struct PoolConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_cooldown")]
    pub rate_limit_cooldown_secs: u64,
    #[serde(default = "default_session_ttl")]
    pub session_cache_ttl_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            failure_threshold: default_failure_threshold(),
            rate_limit_cooldown_secs: default_cooldown(),
            session_cache_ttl_secs: default_session_ttl(),
        }
    }
}

impl PoolConfig {
    pub fn policy(&self) -> PoolPolicy {
        PoolPolicy {
            failure_threshold: self.failure_threshold,
            rate_limit_cooldown: Duration::from_secs(self.rate_limit_cooldown_secs),
            session_cache_ttl: Duration::from_secs(self.session_cache_ttl_secs),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TaskConfig {
    #[serde(default = "default_log_prefix")]
    pub log_prefix: String,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            log_prefix: default_log_prefix(),
        }
    }
}

fn default_base_url() -> String {
    mailbox::constants::DEFAULT_BASE_URL.to_string()
}

fn default_request_timeout() -> u64 {
    mailbox::constants::DEFAULT_REQUEST_TIMEOUT.as_secs()
}

fn default_poll_timeout() -> u64 {
    120
}

fn default_poll_interval() -> u64 {
    4
}

fn default_user_agent() -> String {
    concat!("mail-provisioner/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_cooldown() -> u64 {
    600
}

fn default_session_ttl() -> u64 {
    3600
}

fn default_log_prefix() -> String {
    "REGISTER".to_string()
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// API key resolution order:
    /// 1. MAILBOX_API_KEY env var
    /// 2. api_key_file path from config
    ///
    /// MAILBOX_LOG_BODY, when set, overrides `log_body`.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;
        config.validate()?;

        if let Ok(key) = std::env::var(API_KEY_ENV) {
            let key = key.trim().to_owned();
            if !key.is_empty() {
                config.mailbox.api_key = Some(Secret::new(key));
            }
        } else if let Some(ref key_file) = config.mailbox.api_key_file {
            let key = std::fs::read_to_string(key_file).map_err(|e| {
                common::Error::Config(format!(
                    "failed to read api_key_file {}: {e}",
                    key_file.display()
                ))
            })?;
            let key = key.trim().to_owned();
            if !key.is_empty() {
                config.mailbox.api_key = Some(Secret::new(key));
            }
        }

        if let Some(log_body) = MailboxConfig::log_body_from_env() {
            config.mailbox.log_body = log_body;
        }

        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        let base_url = &self.mailbox.base_url;
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(common::Error::Config(format!(
                "base_url must start with http:// or https://, got: {base_url}"
            )));
        }
        if self.mailbox.request_timeout_secs == 0 {
            return Err(common::Error::Config(
                "request_timeout_secs must be greater than 0".into(),
            ));
        }
        if self.poll.interval_secs == 0 {
            return Err(common::Error::Config(
                "interval_secs must be greater than 0".into(),
            ));
        }
        if self.pool.user_agent.trim().is_empty() {
            return Err(common::Error::Config("user_agent must not be empty".into()));
        }
        Ok(())
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("mail-provisioner.toml")
    }
}
