//! Mail dispatcher seam — the outbound transport collaborator.
//!
//! The engine never speaks SMTP itself; it hands a fully rendered message to
//! an implementation of [`MailDispatcher`] and interprets the result. The
//! transport must be safely callable once per (membership, step); the runner
//! guarantees it is not called again for the same pending step until the
//! prior attempt has resolved.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::info;

use crate::error::{DripError, DripResult};

/// A fully rendered outbound message.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub to: String,
    pub subject: String,
    pub body_html: String,
    pub body_text: String,
}

/// Trait for sending one message. Implementations route to SMTP providers,
/// API-based senders, or test doubles.
#[async_trait]
pub trait MailDispatcher: Send + Sync {
    async fn send(&self, message: &OutboundMessage) -> DripResult<()>;
}

/// Dispatcher that logs the send and reports success. Default wiring when no
/// real transport is configured.
pub struct LoggingDispatcher;

#[async_trait]
impl MailDispatcher for LoggingDispatcher {
    async fn send(&self, message: &OutboundMessage) -> DripResult<()> {
        info!(to = %message.to, subject = %message.subject, "Dispatching message");
        Ok(())
    }
}

/// In-memory dispatcher that captures messages for testing, with
/// programmable per-recipient failures and artificial latency.
#[derive(Default)]
pub struct CaptureDispatcher {
    sent: Mutex<Vec<OutboundMessage>>,
    fail_for: Mutex<HashSet<String>>,
    latency: Mutex<Option<Duration>>,
}

impl CaptureDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// All messages accepted so far, in dispatch order.
    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }

    /// Number of accepted messages addressed to `to`.
    pub fn sent_to(&self, to: &str) -> usize {
        self.sent.lock().iter().filter(|m| m.to == to).count()
    }

    /// Make every send to `to` fail until [`clear_failures`](Self::clear_failures).
    pub fn fail_for(&self, to: impl Into<String>) {
        self.fail_for.lock().insert(to.into());
    }

    pub fn clear_failures(&self) {
        self.fail_for.lock().clear();
    }

    /// Delay every send by `latency`, for exercising dispatch timeouts.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = Some(latency);
    }
}

#[async_trait]
impl MailDispatcher for CaptureDispatcher {
    async fn send(&self, message: &OutboundMessage) -> DripResult<()> {
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if self.fail_for.lock().contains(&message.to) {
            return Err(DripError::Dispatch(format!(
                "recipient {} rejected by transport",
                message.to
            )));
        }
        self.sent.lock().push(message.clone());
        Ok(())
    }
}

/// Convenience: dispatcher that logs and succeeds.
pub fn logging_dispatcher() -> Arc<dyn MailDispatcher> {
    Arc::new(LoggingDispatcher)
}

/// Convenience: capture dispatcher for tests.
pub fn capture_dispatcher() -> Arc<CaptureDispatcher> {
    Arc::new(CaptureDispatcher::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(to: &str) -> OutboundMessage {
        OutboundMessage {
            to: to.into(),
            subject: "Welcome".into(),
            body_html: "<p>Hi</p>".into(),
            body_text: "Hi".into(),
        }
    }

    #[tokio::test]
    async fn test_capture_dispatcher_records_sends() {
        let dispatcher = capture_dispatcher();
        dispatcher.send(&message("a@example.com")).await.unwrap();
        dispatcher.send(&message("b@example.com")).await.unwrap();

        assert_eq!(dispatcher.sent_count(), 2);
        assert_eq!(dispatcher.sent_to("a@example.com"), 1);
    }

    #[tokio::test]
    async fn test_capture_dispatcher_programmable_failure() {
        let dispatcher = capture_dispatcher();
        dispatcher.fail_for("bounce@example.com");

        let err = dispatcher.send(&message("bounce@example.com")).await;
        assert!(err.is_err());
        assert_eq!(dispatcher.sent_count(), 0);

        dispatcher.clear_failures();
        dispatcher.send(&message("bounce@example.com")).await.unwrap();
        assert_eq!(dispatcher.sent_count(), 1);
    }
}
