//! Mailbox provider defaults

use std::time::Duration;

/// Provider used when no base URL is configured
pub const DEFAULT_BASE_URL: &str = "https://api.duckmail.sbs";

/// Domain used when `GET /domains` fails or lists nothing
pub const DEFAULT_DOMAIN: &str = "duck.com";

/// Per-request HTTP timeout, independent of the polling budget
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Env switch that forces response bodies into the log
pub const LOG_BODY_ENV: &str = "MAILBOX_LOG_BODY";

/// Response bodies are cut to this many characters before logging
pub const LOG_BODY_LIMIT: usize = 500;

/// Characters of a bearer token that may appear in logs
pub const TOKEN_LOG_PREFIX: usize = 20;

/// Length of the random part of generated local parts and passwords
pub const RANDOM_PART_LEN: usize = 10;
