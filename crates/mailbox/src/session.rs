//! Mailbox session against the provider's account/token/message endpoints
//!
//! One session owns one mailbox: the generated address and password, the
//! provider account id, and the bearer token once logged in. Every outbound
//! call is reported through the session's `LogSink`; bearer tokens only ever
//! appear as a short prefix.

use std::future::Future;
use std::pin::Pin;
use std::time::{SystemTime, UNIX_EPOCH};

use common::{LogSink, Secret};
use rand::RngExt;
use reqwest::Method;
use serde_json::{Value, json};

use crate::Inbox;
use crate::config::MailboxConfig;
use crate::constants::{DEFAULT_DOMAIN, LOG_BODY_LIMIT, RANDOM_PART_LEN, TOKEN_LOG_PREFIX};
use crate::error::{Error, Result};
use crate::message::{Collection, DomainEntry, MessageBody, MessageSummary};

const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Status and raw body of one provider call.
struct ProviderResponse {
    status: u16,
    body: String,
}

impl ProviderResponse {
    /// Body as JSON; an empty body reads as an empty object.
    fn json(&self) -> Result<Value> {
        if self.body.trim().is_empty() {
            return Ok(json!({}));
        }
        serde_json::from_str(&self.body)
            .map_err(|e| Error::Protocol(format!("response is not JSON: {e}")))
    }
}

/// Stateful client for a single disposable mailbox.
pub struct MailboxSession {
    client: reqwest::Client,
    config: MailboxConfig,
    sink: LogSink,
    address: Option<String>,
    password: Option<Secret<String>>,
    account_id: Option<String>,
    token: Option<Secret<String>>,
}

impl MailboxSession {
    pub fn new(config: MailboxConfig) -> Result<Self> {
        let client = config.build_client()?;
        Ok(Self::with_client(client, config))
    }

    /// Session sharing an existing HTTP client.
    pub fn with_client(client: reqwest::Client, config: MailboxConfig) -> Self {
        Self {
            client,
            config,
            sink: LogSink::tracing(),
            address: None,
            password: None,
            account_id: None,
            token: None,
        }
    }

    pub fn with_log_sink(mut self, sink: LogSink) -> Self {
        self.sink = sink;
        self
    }

    /// Reuse an existing mailbox instead of registering a new one.
    pub fn set_credentials(&mut self, address: impl Into<String>, password: impl Into<String>) {
        self.address = Some(address.into());
        self.password = Some(Secret::new(password.into()));
        self.token = None;
    }

    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    pub fn password(&self) -> Option<&Secret<String>> {
        self.password.as_ref()
    }

    pub fn account_id(&self) -> Option<&str> {
        self.account_id.as_deref()
    }

    pub fn has_token(&self) -> bool {
        self.token.as_ref().is_some_and(|t| !t.is_empty())
    }

    /// Create a new mailbox on the provider.
    ///
    /// Without a `domain` the first entry of `GET /domains` is used, falling
    /// back to `DEFAULT_DOMAIN`. Success is a 200 or 201 from `POST /accounts`.
    pub async fn register(&mut self, domain: Option<&str>) -> Result<()> {
        let domain = match domain.map(str::trim).filter(|d| !d.is_empty()) {
            Some(d) => d.to_string(),
            None => self.discover_domain().await,
        };
        self.sink.info(&format!("Mailbox domain: {domain}"));

        let (address, password) = generate_credentials(&domain);
        self.sink
            .info(&format!("Mailbox register address: {address}"));
        let body = json!({ "address": address, "password": password });
        self.address = Some(address);
        self.password = Some(Secret::new(password));
        self.account_id = None;
        self.token = None;

        let response = match self
            .request(Method::POST, "/accounts", None, Some(&body))
            .await
        {
            Ok(r) => r,
            Err(e) => {
                self.sink.error(&format!("Mailbox register failed: {e}"));
                return Err(e);
            }
        };

        if !matches!(response.status, 200 | 201) {
            self.sink.error("Mailbox register failed");
            return Err(Error::Status {
                status: response.status,
                body: truncate(&response.body, LOG_BODY_LIMIT),
            });
        }

        // A created account with an unreadable body still counts as registered
        self.account_id = response
            .json()
            .ok()
            .and_then(|data| data.get("id").and_then(Value::as_str).map(str::to_string));
        self.sink.info("Mailbox register success");
        Ok(())
    }

    /// Exchange address + password for a bearer token.
    pub async fn authenticate(&mut self) -> Result<()> {
        let (Some(address), Some(password)) = (self.address.as_deref(), self.password.as_ref())
        else {
            self.sink
                .error("Mailbox login failed: no credentials, register first");
            return Err(Error::MissingCredentials);
        };
        let body = json!({ "address": address, "password": password.expose() });

        let result = self
            .request(Method::POST, "/token", None, Some(&body))
            .await
            .and_then(|response| {
                if response.status != 200 {
                    return Err(Error::Status {
                        status: response.status,
                        body: truncate(&response.body, LOG_BODY_LIMIT),
                    });
                }
                response
                    .json()?
                    .get("token")
                    .and_then(Value::as_str)
                    .filter(|t| !t.is_empty())
                    .map(|t| Secret::new(t.to_string()))
                    .ok_or_else(|| Error::Protocol("token field missing".into()))
            });

        match result {
            Ok(token) => {
                self.sink.info(&format!(
                    "Mailbox login success, token: {}",
                    token.redacted_prefix(TOKEN_LOG_PREFIX)
                ));
                self.token = Some(token);
                Ok(())
            }
            Err(e) => {
                self.sink.error(&format!("Mailbox login failed: {e}"));
                Err(e)
            }
        }
    }

    /// Newest message with text and html merged, logging in first if needed.
    ///
    /// Any failure along the way is logged and reads as `None`.
    pub async fn fetch_latest_message(&mut self) -> Option<MessageBody> {
        if !self.has_token() && self.authenticate().await.is_err() {
            return None;
        }
        match self.try_fetch_latest().await {
            Ok(message) => message,
            Err(e) => {
                self.sink.error(&format!("Mailbox fetch message failed: {e}"));
                None
            }
        }
    }

    async fn try_fetch_latest(&self) -> Result<Option<MessageBody>> {
        let token = self.token.as_ref().ok_or(Error::MissingCredentials)?;

        let listing = self
            .request(Method::GET, "/messages", Some(token), None)
            .await?;
        if listing.status != 200 {
            self.sink.warn(&format!(
                "Mailbox messages request failed: {}",
                listing.status
            ));
            return Ok(None);
        }
        let messages: Collection<MessageSummary> = serde_json::from_value(listing.json()?)
            .map_err(|e| Error::Protocol(format!("message list: {e}")))?;
        self.sink.info(&format!(
            "Mailbox messages count: {}",
            messages.members.len()
        ));

        let Some(id) = messages.members.into_iter().next().and_then(|m| m.id) else {
            return Ok(None);
        };

        self.sink.info(&format!("Mailbox fetching message: {id}"));
        let detail = self
            .request(Method::GET, &format!("/messages/{id}"), Some(token), None)
            .await?;
        if detail.status != 200 {
            self.sink.warn(&format!(
                "Mailbox message {id} request failed: {}",
                detail.status
            ));
            return Ok(None);
        }

        let message = MessageBody::from_detail(&id, &detail.json()?);
        self.sink
            .info(&format!("Mailbox message subject: {}", message.subject));
        Ok(Some(message))
    }

    /// First domain offered by the provider, or the fixed fallback.
    async fn discover_domain(&self) -> String {
        let discovered = match self.request(Method::GET, "/domains", None, None).await {
            Ok(response) if response.status == 200 => response
                .json()
                .ok()
                .and_then(|v| serde_json::from_value::<Collection<DomainEntry>>(v).ok())
                .and_then(|c| c.members.into_iter().next())
                .and_then(|d| d.domain)
                .filter(|d| !d.is_empty()),
            _ => None,
        };
        discovered.unwrap_or_else(|| DEFAULT_DOMAIN.to_string())
    }

    /// Send one provider call, logging method, URL, status and (when enabled
    /// or on error status) the first `LOG_BODY_LIMIT` characters of the body.
    ///
    /// `bearer` overrides the configured API key for the Authorization header.
    async fn request(
        &self,
        method: Method,
        path: &str,
        bearer: Option<&Secret<String>>,
        body: Option<&Value>,
    ) -> Result<ProviderResponse> {
        let url = format!("{}{}", self.config.base_url(), path);
        self.sink.info(&format!("[HTTP] {method} {url}"));

        let mut request = self.client.request(method, &url);
        if let Some(token) = bearer.or(self.config.api_key.as_ref()) {
            request = request.bearer_auth(token.expose());
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => {
                self.sink.error(&format!("[HTTP] Request failed: {e}"));
                return Err(Error::Http(e.to_string()));
            }
        };

        let status = response.status().as_u16();
        self.sink.info(&format!("[HTTP] Response: {status}"));
        let body = response
            .text()
            .await
            .map_err(|e| Error::Http(format!("reading response body: {e}")))?;
        if !body.is_empty() && (self.config.log_body || status >= 400) {
            self.sink.info(&format!(
                "[HTTP] Response body: {}",
                truncate(&body, LOG_BODY_LIMIT)
            ));
        }
        Ok(ProviderResponse { status, body })
    }
}

impl Inbox for MailboxSession {
    fn ensure_session(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            if self.has_token() {
                return Ok(());
            }
            self.authenticate().await
        })
    }

    fn latest_message(&mut self) -> Pin<Box<dyn Future<Output = Option<MessageBody>> + Send + '_>> {
        Box::pin(self.fetch_latest_message())
    }
}

/// `(address, password)` for a new mailbox on `domain`.
///
/// Local part: `t` + last four digits of the unix time + random part.
/// Password: `Pwd` + the same random part + the same four digits.
fn generate_credentials(domain: &str) -> (String, String) {
    let mut rng = rand::rng();
    let random: String = (0..RANDOM_PART_LEN)
        .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
        .collect();
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let stamp = format!("{:04}", secs % 10_000);
    (
        format!("t{stamp}{random}@{domain}"),
        format!("Pwd{random}{stamp}"),
    )
}

fn truncate(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}
