//! Mailbox client settings

use std::time::Duration;

use common::Secret;

use crate::constants::{DEFAULT_BASE_URL, DEFAULT_REQUEST_TIMEOUT, LOG_BODY_ENV};
use crate::error::{Error, Result};

/// Connection settings for the mailbox provider.
#[derive(Debug, Clone)]
pub struct MailboxConfig {
    /// Provider root, trailing slash stripped on use
    pub base_url: String,
    /// Optional outbound proxy for all provider calls
    pub proxy: Option<String>,
    /// Sent as a bearer header on calls that carry no mailbox token
    pub api_key: Option<Secret<String>>,
    /// Log response bodies even for successful calls
    pub log_body: bool,
    pub request_timeout: Duration,
}

impl Default for MailboxConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            proxy: None,
            api_key: None,
            log_body: false,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl MailboxConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// Build the HTTP client used by a session.
    pub fn build_client(&self) -> Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder().timeout(self.request_timeout);
        if let Some(proxy) = self.proxy.as_deref().filter(|p| !p.trim().is_empty()) {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| Error::Http(format!("invalid proxy {proxy}: {e}")))?;
            builder = builder.proxy(proxy);
        }
        builder
            .build()
            .map_err(|e| Error::Http(format!("building HTTP client: {e}")))
    }

    /// `MAILBOX_LOG_BODY` as a body-logging switch, `None` when unset.
    pub fn log_body_from_env() -> Option<bool> {
        std::env::var(LOG_BODY_ENV).ok().map(|v| is_truthy(&v))
    }
}

/// `1`, `true`, `yes`, `y`, `on` (any case, surrounding whitespace ignored).
pub fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "y" | "on"
    )
}
