use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

pub use cinebook_shared::Notification;

use crate::repository::StoreError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    /// The strategy looked at the notification and chose not to send it.
    Declined(String),
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Queue publish failed: {0}")]
    Queue(String),

    #[error("Mail transport failed: {0}")]
    Mail(String),

    #[error("Lookup failed: {0}")]
    Store(#[from] StoreError),
}

/// One way of getting a notification to its recipients.
#[async_trait]
pub trait DeliveryStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn deliver(&self, notification: &Notification) -> Result<Delivery, NotifyError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), NotifyError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Delivered { strategy: &'static str },
    Declined { strategy: &'static str, reason: String },
    /// Every strategy errored (or none were configured).
    Failed,
}

/// Tries each strategy in order until one sends or declines. Never returns an error.
#[derive(Clone, Default)]
pub struct NotificationDispatcher {
    strategies: Vec<Arc<dyn DeliveryStrategy>>,
}

impl NotificationDispatcher {
    pub fn new(strategies: Vec<Arc<dyn DeliveryStrategy>>) -> Self {
        Self { strategies }
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    pub async fn dispatch(&self, notification: &Notification) -> DispatchOutcome {
        for strategy in &self.strategies {
            match strategy.deliver(notification).await {
                Ok(Delivery::Sent) => {
                    info!(kind = notification.kind(), strategy = strategy.name(), "Notification delivered");
                    return DispatchOutcome::Delivered { strategy: strategy.name() };
                }
                Ok(Delivery::Declined(reason)) => {
                    info!(kind = notification.kind(), strategy = strategy.name(), %reason, "Notification declined");
                    return DispatchOutcome::Declined {
                        strategy: strategy.name(),
                        reason,
                    };
                }
                Err(e) => {
                    warn!(kind = notification.kind(), strategy = strategy.name(), error = %e, "Delivery strategy failed, trying next");
                }
            }
        }

        warn!(kind = notification.kind(), key = %notification.key(), "All delivery strategies failed");
        DispatchOutcome::Failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    struct Scripted {
        name: &'static str,
        result: fn() -> Result<Delivery, NotifyError>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(name: &'static str, result: fn() -> Result<Delivery, NotifyError>) -> Arc<Self> {
            Arc::new(Self {
                name,
                result,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl DeliveryStrategy for Scripted {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn deliver(&self, _notification: &Notification) -> Result<Delivery, NotifyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.result)()
        }
    }

    fn confirmed() -> Notification {
        Notification::BookingConfirmed {
            booking_id: Uuid::new_v4(),
        }
    }

    #[tokio::test]
    async fn test_primary_success_skips_fallback() {
        let primary = Scripted::new("queue", || Ok(Delivery::Sent));
        let fallback = Scripted::new("direct", || Ok(Delivery::Sent));
        let dispatcher = NotificationDispatcher::new(vec![primary.clone(), fallback.clone()]);

        let outcome = dispatcher.dispatch(&confirmed()).await;
        assert_eq!(outcome, DispatchOutcome::Delivered { strategy: "queue" });
        assert_eq!(fallback.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_falls_back_when_primary_errors() {
        let primary = Scripted::new("queue", || Err(NotifyError::Queue("broker down".into())));
        let fallback = Scripted::new("direct", || Ok(Delivery::Sent));
        let dispatcher = NotificationDispatcher::new(vec![primary.clone(), fallback.clone()]);

        let outcome = dispatcher.dispatch(&confirmed()).await;
        assert_eq!(outcome, DispatchOutcome::Delivered { strategy: "direct" });
        assert_eq!(primary.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_decline_stops_the_chain() {
        let primary = Scripted::new("direct", || Ok(Delivery::Declined("not paid".into())));
        let fallback = Scripted::new("other", || Ok(Delivery::Sent));
        let dispatcher = NotificationDispatcher::new(vec![primary, fallback.clone()]);

        let outcome = dispatcher.dispatch(&confirmed()).await;
        assert!(matches!(outcome, DispatchOutcome::Declined { strategy: "direct", .. }));
        assert_eq!(fallback.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_all_failing_does_not_raise() {
        let a = Scripted::new("queue", || Err(NotifyError::Queue("down".into())));
        let b = Scripted::new("direct", || Err(NotifyError::Mail("smtp refused".into())));
        let dispatcher = NotificationDispatcher::new(vec![a, b]);
        assert_eq!(dispatcher.dispatch(&confirmed()).await, DispatchOutcome::Failed);

        let empty = NotificationDispatcher::default();
        assert_eq!(empty.dispatch(&confirmed()).await, DispatchOutcome::Failed);
    }
}
