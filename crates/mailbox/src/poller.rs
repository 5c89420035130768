//! Bounded polling for a verification code
//!
//! `timeout / interval` attempts (integer division), one fetch + extract per
//! attempt, a sleep between attempts and none after the last. A timeout
//! shorter than the interval therefore means zero attempts.

use std::time::Duration;

use common::LogSink;
use tokio::sync::watch;

use crate::Inbox;
use crate::extract::extract;

/// Polls an inbox until a code shows up or the time budget is spent.
#[derive(Debug, Clone)]
pub struct VerificationPoller {
    timeout: Duration,
    interval: Duration,
    sink: LogSink,
    shutdown: Option<watch::Receiver<bool>>,
}

impl VerificationPoller {
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self {
            timeout,
            interval,
            sink: LogSink::tracing(),
            shutdown: None,
        }
    }

    pub fn with_log_sink(mut self, sink: LogSink) -> Self {
        self.sink = sink;
        self
    }

    /// Stop polling once the watched value turns `true`.
    ///
    /// Checked before every attempt and raced against the inter-attempt sleep.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Number of fetch attempts the budget allows.
    pub fn max_attempts(&self) -> u32 {
        let interval = self.interval.as_millis();
        if interval == 0 {
            return 0;
        }
        u32::try_from(self.timeout.as_millis() / interval).unwrap_or(u32::MAX)
    }

    /// Poll `inbox` for a verification code.
    ///
    /// Returns `None` if the inbox cannot log in, the attempts run out, or
    /// shutdown is signalled.
    pub async fn poll_for_code<I: Inbox + ?Sized>(&self, inbox: &mut I) -> Option<String> {
        if let Err(e) = inbox.ensure_session().await {
            self.sink.error(&format!("Mailbox token missing: {e}"));
            return None;
        }

        let max_attempts = self.max_attempts();
        let mut shutdown = self.shutdown.clone();
        self.sink.info("Mailbox polling for code");

        for attempt in 1..=max_attempts {
            if shutdown.as_ref().is_some_and(|rx| *rx.borrow()) {
                self.sink.warn("Mailbox polling cancelled");
                return None;
            }

            self.sink
                .info(&format!("Mailbox attempt {attempt}/{max_attempts}"));
            metrics::counter!("mailbox_poll_attempts_total").increment(1);

            if let Some(message) = inbox.latest_message().await {
                match extract(message.content()) {
                    Some(code) => {
                        self.sink.info(&format!("Mailbox code found: {code}"));
                        return Some(code);
                    }
                    None => self.sink.warn("Mailbox no code found in message"),
                }
            }

            if attempt < max_attempts {
                match shutdown.as_mut() {
                    Some(rx) => {
                        tokio::select! {
                            _ = tokio::time::sleep(self.interval) => {}
                            _ = shutdown_requested(rx) => {
                                self.sink.warn("Mailbox polling cancelled");
                                return None;
                            }
                        }
                    }
                    None => tokio::time::sleep(self.interval).await,
                }
            }
        }

        self.sink.error("Mailbox code timeout");
        None
    }
}

/// Resolves once the flag is `true`; never resolves if the sender is gone.
async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Result};
    use crate::message::MessageBody;
    use std::collections::VecDeque;
    use std::future::Future;
    use std::pin::Pin;
    use tokio::time::Instant;

    /// Inbox returning scripted messages, one per fetch.
    #[derive(Default)]
    struct ScriptedInbox {
        login_fails: bool,
        logins: u32,
        fetches: u32,
        script: VecDeque<Option<MessageBody>>,
    }

    impl ScriptedInbox {
        fn with_messages(messages: Vec<Option<&str>>) -> Self {
            Self {
                script: messages
                    .into_iter()
                    .map(|m| m.map(|text| MessageBody::new("m", "subject", text)))
                    .collect(),
                ..Self::default()
            }
        }
    }

    impl Inbox for ScriptedInbox {
        fn ensure_session(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
            Box::pin(async move {
                self.logins += 1;
                if self.login_fails {
                    Err(Error::Status {
                        status: 401,
                        body: String::new(),
                    })
                } else {
                    Ok(())
                }
            })
        }

        fn latest_message(
            &mut self,
        ) -> Pin<Box<dyn Future<Output = Option<MessageBody>> + Send + '_>> {
            Box::pin(async move {
                self.fetches += 1;
                self.script.pop_front().flatten()
            })
        }
    }

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn attempts_use_integer_division() {
        assert_eq!(VerificationPoller::new(secs(120), secs(4)).max_attempts(), 30);
        assert_eq!(VerificationPoller::new(secs(10), secs(4)).max_attempts(), 2);
        assert_eq!(VerificationPoller::new(secs(3), secs(4)).max_attempts(), 0);
        assert_eq!(VerificationPoller::new(secs(3), Duration::ZERO).max_attempts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn no_code_exhausts_attempts_within_budget() {
        let mut inbox = ScriptedInbox::default();
        let poller = VerificationPoller::new(secs(8), secs(4));

        let start = Instant::now();
        let code = poller.poll_for_code(&mut inbox).await;
        let elapsed = start.elapsed();

        assert_eq!(code, None);
        assert_eq!(inbox.fetches, 2);
        assert!(elapsed >= secs(4), "elapsed {elapsed:?}");
        assert!(elapsed < secs(8) + Duration::from_millis(100), "elapsed {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn each_attempt_increments_counter() {
        let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let _guard = metrics::set_default_local_recorder(&recorder);

        let mut inbox = ScriptedInbox::default();
        let poller = VerificationPoller::new(secs(8), secs(4));
        assert_eq!(poller.poll_for_code(&mut inbox).await, None);

        let output = handle.render();
        assert!(output.contains("mailbox_poll_attempts_total 2"), "{output}");
    }

    #[tokio::test(start_paused = true)]
    async fn early_code_stops_counting() {
        let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let _guard = metrics::set_default_local_recorder(&recorder);

        let mut inbox = ScriptedInbox::with_messages(vec![Some("code: 123456")]);
        let poller = VerificationPoller::new(secs(120), secs(4));
        assert_eq!(poller.poll_for_code(&mut inbox).await.as_deref(), Some("123456"));

        let output = handle.render();
        assert!(output.contains("mailbox_poll_attempts_total 1"), "{output}");
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_below_interval_makes_zero_attempts() {
        let mut inbox = ScriptedInbox::with_messages(vec![Some("code: 123456")]);
        let poller = VerificationPoller::new(secs(3), secs(4));

        let start = Instant::now();
        let code = poller.poll_for_code(&mut inbox).await;

        assert_eq!(code, None);
        assert_eq!(inbox.fetches, 0);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn login_failure_returns_immediately() {
        let mut inbox = ScriptedInbox {
            login_fails: true,
            ..ScriptedInbox::default()
        };
        let poller = VerificationPoller::new(secs(120), secs(4));

        assert_eq!(poller.poll_for_code(&mut inbox).await, None);
        assert_eq!(inbox.logins, 1);
        assert_eq!(inbox.fetches, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn code_found_returns_without_further_sleep() {
        let mut inbox = ScriptedInbox::with_messages(vec![
            None,
            Some("Welcome! Your verification code: QW12ER"),
        ]);
        let poller = VerificationPoller::new(secs(40), secs(4));

        let start = Instant::now();
        let code = poller.poll_for_code(&mut inbox).await;

        assert_eq!(code.as_deref(), Some("QW12ER"));
        assert_eq!(inbox.fetches, 2);
        let elapsed = start.elapsed();
        assert!(elapsed >= secs(4) && elapsed < secs(8), "elapsed {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn message_without_code_keeps_polling() {
        let mut inbox = ScriptedInbox::with_messages(vec![
            Some("order ABCDEF shipped"),
            Some("OTP 123456 expires soon"),
        ]);
        let poller = VerificationPoller::new(secs(12), secs(4));

        assert_eq!(poller.poll_for_code(&mut inbox).await.as_deref(), Some("123456"));
        assert_eq!(inbox.fetches, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_interrupts_sleep() {
        let mut inbox = ScriptedInbox::default();
        let (tx, rx) = watch::channel(false);
        let poller = VerificationPoller::new(secs(120), secs(4)).with_shutdown(rx);

        tokio::spawn(async move {
            tokio::time::sleep(secs(6)).await;
            tx.send(true).unwrap();
        });

        let start = Instant::now();
        assert_eq!(poller.poll_for_code(&mut inbox).await, None);
        assert_eq!(inbox.fetches, 2);
        assert!(start.elapsed() < secs(8), "elapsed {:?}", start.elapsed());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_before_start_skips_attempts() {
        let mut inbox = ScriptedInbox::default();
        let (_tx, rx) = watch::channel(true);
        let poller = VerificationPoller::new(secs(120), secs(4)).with_shutdown(rx);

        assert_eq!(poller.poll_for_code(&mut inbox).await, None);
        assert_eq!(inbox.fetches, 0);
    }
}
