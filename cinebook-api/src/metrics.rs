use async_trait::async_trait;
use axum::{
    extract::State,
    http::{header::CONTENT_TYPE, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use prometheus::{Encoder, IntCounter, Opts, Registry, TextEncoder};
use std::sync::Arc;
use tracing::error;

use cinebook_core::notify::{Delivery, DeliveryStrategy, Notification, NotifyError};
use cinebook_core::BookingRecord;
use cinebook_order::ExpiryObserver;

use crate::state::AppState;

/// Booking lifecycle counters, exposed on `GET /metrics`.
pub struct Metrics {
    registry: Registry,
    pub bookings_created: IntCounter,
    pub bookings_paid: IntCounter,
    pub bookings_expired: IntCounter,
    pub webhook_rejections: IntCounter,
    pub notification_failures: IntCounter,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let counter = |name: &str, help: &str| -> Result<IntCounter, prometheus::Error> {
            let counter = IntCounter::with_opts(Opts::new(name, help))?;
            registry.register(Box::new(counter.clone()))?;
            Ok(counter)
        };

        Ok(Self {
            bookings_created: counter("cinebook_bookings_created_total", "Bookings created with seats held.")?,
            bookings_paid: counter("cinebook_bookings_paid_total", "Bookings that moved to paid.")?,
            bookings_expired: counter(
                "cinebook_bookings_expired_total",
                "Unpaid bookings released after their hold window.",
            )?,
            webhook_rejections: counter(
                "cinebook_webhook_rejections_total",
                "Payment webhooks rejected for a bad signature or body.",
            )?,
            notification_failures: counter(
                "cinebook_notification_failures_total",
                "Notifications no delivery strategy could send.",
            )?,
            registry,
        })
    }

    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

impl ExpiryObserver for Metrics {
    fn booking_expired(&self, _booking: &BookingRecord, _released: usize) {
        self.bookings_expired.inc();
    }
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(|| async { "ok" }))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match state.metrics.render() {
        Ok(body) => ([(CONTENT_TYPE, prometheus::TEXT_FORMAT)], body).into_response(),
        Err(e) => {
            error!("failed to encode metrics: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Last entry in the dispatcher chain: reached only when every real strategy
/// failed. Counts and logs the loss.
pub struct UndeliveredCounter {
    metrics: Arc<Metrics>,
}

impl UndeliveredCounter {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self { metrics }
    }
}

#[async_trait]
impl DeliveryStrategy for UndeliveredCounter {
    fn name(&self) -> &'static str {
        "undelivered"
    }

    async fn deliver(&self, notification: &Notification) -> Result<Delivery, NotifyError> {
        self.metrics.notification_failures.inc();
        error!(kind = notification.kind(), key = %notification.key(), "Notification could not be delivered");
        Ok(Delivery::Declined("no delivery strategy succeeded".into()))
    }
}
