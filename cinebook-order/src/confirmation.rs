use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use cinebook_core::notify::{Notification, NotificationDispatcher};
use cinebook_core::payment::PaymentProvider;
use cinebook_core::repository::BookingRepository;
use cinebook_core::webhook::{PaymentEvent, SignatureError, WebhookVerifier};
use cinebook_core::PaidTransition;

#[derive(Debug, thiserror::Error)]
pub enum ConfirmationError {
    #[error("Webhook Error: {0}")]
    BadSignature(#[from] SignatureError),

    #[error("Webhook Error: {0}")]
    MalformedEvent(String),

    /// The event was genuine but could not be applied; the provider should retry.
    #[error("Webhook processing failed: {0}")]
    Processing(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    Confirmed { booking_id: Uuid },
    AlreadyPaid { booking_id: Uuid },
    /// Expired and reaped before the payment landed.
    BookingMissing { booking_id: Uuid },
    NoBookingReference,
    Ignored { event_type: String },
}

/// Turns verified provider events into paid bookings.
pub struct PaymentConfirmationListener {
    verifier: WebhookVerifier,
    provider: Option<Arc<dyn PaymentProvider>>,
    bookings: Arc<dyn BookingRepository>,
    dispatcher: Arc<NotificationDispatcher>,
}

impl PaymentConfirmationListener {
    pub fn new(
        verifier: WebhookVerifier,
        provider: Option<Arc<dyn PaymentProvider>>,
        bookings: Arc<dyn BookingRepository>,
        dispatcher: Arc<NotificationDispatcher>,
    ) -> Self {
        Self {
            verifier,
            provider,
            bookings,
            dispatcher,
        }
    }

    pub async fn handle(
        &self,
        payload: &[u8],
        signature: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<WebhookOutcome, ConfirmationError> {
        if let Err(e) = self.verifier.verify(payload, signature, now) {
            warn!(error = %e, "Rejected webhook with bad signature");
            return Err(e.into());
        }

        let event = PaymentEvent::parse(payload).map_err(|e| ConfirmationError::MalformedEvent(e.to_string()))?;

        let booking_id = match event {
            PaymentEvent::PaymentIntentSucceeded { event_id, payment_intent } => {
                debug!(%event_id, %payment_intent, "payment_intent.succeeded received");
                self.booking_for_intent(&payment_intent).await?
            }
            PaymentEvent::CheckoutSessionCompleted { event_id, session_id, booking_id } => {
                debug!(%event_id, %session_id, "checkout.session.completed received");
                booking_id
            }
            PaymentEvent::Ignored { event_id, event_type } => {
                debug!(%event_id, %event_type, "Unhandled event type");
                return Ok(WebhookOutcome::Ignored { event_type });
            }
        };

        let Some(booking_id) = booking_id else {
            warn!("Payment event carries no booking reference");
            return Ok(WebhookOutcome::NoBookingReference);
        };

        self.apply_payment(booking_id).await
    }

    async fn booking_for_intent(&self, payment_intent: &str) -> Result<Option<Uuid>, ConfirmationError> {
        let Some(provider) = &self.provider else {
            warn!(%payment_intent, "Payment event received but no provider is configured");
            return Ok(None);
        };

        match provider.find_session_by_payment_intent(payment_intent).await {
            Ok(session) => Ok(session.and_then(|s| s.booking_id)),
            Err(e) => {
                error!(%payment_intent, error = %e, "Could not look up checkout session");
                Err(ConfirmationError::Processing(e.to_string()))
            }
        }
    }

    async fn apply_payment(&self, booking_id: Uuid) -> Result<WebhookOutcome, ConfirmationError> {
        let transition = self.bookings.mark_paid(booking_id).await.map_err(|e| {
            error!(%booking_id, error = %e, "Failed to mark booking paid");
            ConfirmationError::Processing(e.to_string())
        })?;

        match transition {
            Some(PaidTransition::Newly) => {
                info!(%booking_id, "Booking paid");
                let dispatcher = self.dispatcher.clone();
                tokio::spawn(async move {
                    dispatcher
                        .dispatch(&Notification::BookingConfirmed { booking_id })
                        .await;
                });
                Ok(WebhookOutcome::Confirmed { booking_id })
            }
            Some(PaidTransition::Already) => {
                debug!(%booking_id, "Duplicate payment event");
                Ok(WebhookOutcome::AlreadyPaid { booking_id })
            }
            None => {
                // The payment settled after the hold ran out; a refund is an operator decision.
                warn!(%booking_id, "Payment received for a booking that no longer exists");
                Ok(WebhookOutcome::BookingMissing { booking_id })
            }
        }
    }
}
