//! Counterparty notifications
//!
//! Sent after commit, fire-and-forget: the calling operation never waits on
//! delivery and never fails because of it. Delivery errors are split in two:
//! - [`NotifyError::Unreachable`]: the recipient cannot be reached (blocked
//!   the bot, deleted the chat). Logged and dropped.
//! - [`NotifyError::Transient`]: network blip or rate limit. Retried a bounded
//!   number of times with linear backoff, then dropped.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::config::NotifierConfig;
use crate::entity::ExternalId;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotifyError {
    #[error("Recipient unreachable: {0}")]
    Unreachable(String),

    #[error("Transient delivery failure: {0}")]
    Transient(String),
}

/// Outbound message channel to a participant
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Channel name for logging
    fn name(&self) -> &'static str;

    async fn notify(&self, recipient: ExternalId, text: &str) -> Result<(), NotifyError>;
}

/// Event worth telling a participant about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    ListingApproved { title: String },
    ListingRejected { title: String },
    ListingSold { title: String, amount: Decimal },
    WithdrawalPaid { amount: Decimal },
}

impl Notice {
    pub fn kind(&self) -> &'static str {
        match self {
            Notice::ListingApproved { .. } => "listing_approved",
            Notice::ListingRejected { .. } => "listing_rejected",
            Notice::ListingSold { .. } => "listing_sold",
            Notice::WithdrawalPaid { .. } => "withdrawal_paid",
        }
    }

    pub fn text(&self) -> String {
        match self {
            Notice::ListingApproved { title } => format!(
                "Your listing \"{}\" was approved and added to the catalogue.",
                title
            ),
            Notice::ListingRejected { title } => {
                format!("Your listing \"{}\" was rejected by moderation.", title)
            }
            Notice::ListingSold { title, amount } => format!(
                "Your listing \"{}\" was purchased. {:.2} was credited to your balance.",
                title, amount
            ),
            Notice::WithdrawalPaid { amount } => {
                format!("Your withdrawal of {:.2} has been paid out.", amount)
            }
        }
    }
}

/// Final state of one delivery task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered { attempts: u32 },
    /// Permanent failure, not retried
    Dropped,
    /// Transient failures exhausted every attempt
    GaveUp { attempts: u32 },
}

#[derive(Clone)]
pub struct NotificationDispatcher {
    notifier: Arc<dyn Notifier>,
    config: NotifierConfig,
}

impl NotificationDispatcher {
    pub fn new(notifier: Arc<dyn Notifier>, config: NotifierConfig) -> Self {
        Self { notifier, config }
    }

    /// Spawn delivery and return immediately
    ///
    /// The handle is only for callers that want to observe the outcome;
    /// dropping it does not cancel delivery.
    pub fn dispatch(&self, recipient: ExternalId, notice: Notice) -> JoinHandle<Delivery> {
        let this = self.clone();
        tokio::spawn(async move { this.deliver(recipient, notice).await })
    }

    async fn deliver(&self, recipient: ExternalId, notice: Notice) -> Delivery {
        let text = notice.text();
        let max_attempts = self.config.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            match self.notifier.notify(recipient, &text).await {
                Ok(()) => {
                    tracing::debug!(
                        channel = self.notifier.name(),
                        recipient,
                        notice = notice.kind(),
                        attempt,
                        "Notification delivered"
                    );
                    return Delivery::Delivered { attempts: attempt };
                }
                Err(NotifyError::Unreachable(reason)) => {
                    tracing::warn!(
                        channel = self.notifier.name(),
                        recipient,
                        notice = notice.kind(),
                        reason = %reason,
                        "Recipient unreachable, notification dropped"
                    );
                    return Delivery::Dropped;
                }
                Err(NotifyError::Transient(reason)) => {
                    tracing::warn!(
                        channel = self.notifier.name(),
                        recipient,
                        notice = notice.kind(),
                        attempt,
                        max_attempts,
                        reason = %reason,
                        "Notification attempt failed"
                    );
                    if attempt < max_attempts {
                        tokio::time::sleep(self.config.retry_backoff() * attempt).await;
                    }
                }
            }
        }

        tracing::error!(
            channel = self.notifier.name(),
            recipient,
            notice = notice.kind(),
            attempts = max_attempts,
            "Notification given up"
        );
        Delivery::GaveUp {
            attempts: max_attempts,
        }
    }
}

/// Writes notifications to the log; used when no front-end is attached
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn notify(&self, recipient: ExternalId, text: &str) -> Result<(), NotifyError> {
        tracing::info!(recipient, text, "Notification");
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::mock::ScriptedNotifier;
    use super::*;
    use std::sync::atomic::Ordering;

    fn config(max_attempts: u32) -> NotifierConfig {
        NotifierConfig {
            max_attempts,
            retry_backoff_ms: 1,
        }
    }

    #[test]
    fn test_notice_text() {
        let notice = Notice::ListingSold {
            title: "Bike".into(),
            amount: Decimal::new(40, 0),
        };
        assert_eq!(
            notice.text(),
            "Your listing \"Bike\" was purchased. 40.00 was credited to your balance."
        );
        assert_eq!(
            Notice::WithdrawalPaid {
                amount: Decimal::new(3000, 2)
            }
            .text(),
            "Your withdrawal of 30.00 has been paid out."
        );
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let notifier = Arc::new(ScriptedNotifier::failing_with(vec![
            NotifyError::Transient("timeout".into()),
            NotifyError::Transient("timeout".into()),
        ]));
        let dispatcher = NotificationDispatcher::new(notifier.clone(), config(3));

        let outcome = dispatcher
            .dispatch(5, Notice::ListingRejected { title: "Lamp".into() })
            .await
            .unwrap();

        assert_eq!(outcome, Delivery::Delivered { attempts: 3 });
        assert_eq!(notifier.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_is_not_retried() {
        let notifier = Arc::new(ScriptedNotifier::failing_with(vec![
            NotifyError::Unreachable("bot blocked".into()),
        ]));
        let dispatcher = NotificationDispatcher::new(notifier.clone(), config(5));

        let outcome = dispatcher
            .dispatch(5, Notice::ListingApproved { title: "Lamp".into() })
            .await
            .unwrap();

        assert_eq!(outcome, Delivery::Dropped);
        assert_eq!(notifier.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_log_notifier_always_delivers() {
        let dispatcher = NotificationDispatcher::new(Arc::new(LogNotifier), config(3));
        let outcome = dispatcher
            .dispatch(9, Notice::ListingApproved { title: "Desk".into() })
            .await
            .unwrap();
        assert_eq!(outcome, Delivery::Delivered { attempts: 1 });
    }

    #[tokio::test]
    async fn test_bounded_attempts() {
        let notifier = Arc::new(ScriptedNotifier::failing_with(vec![
            NotifyError::Transient("503".into());
            10
        ]));
        let dispatcher = NotificationDispatcher::new(notifier.clone(), config(2));

        let outcome = dispatcher
            .dispatch(5, Notice::WithdrawalPaid { amount: Decimal::ONE })
            .await
            .unwrap();

        assert_eq!(outcome, Delivery::GaveUp { attempts: 2 });
        assert_eq!(notifier.calls.load(Ordering::SeqCst), 2);
        assert!(notifier.sent.lock().unwrap().is_empty());
    }
}
