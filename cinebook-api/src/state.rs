use std::sync::Arc;

use cinebook_catalog::ShowCatalog;
use cinebook_core::repository::{BookingRepository, UserDirectory};
use cinebook_order::{BookingWorkflow, PaymentConfirmationListener};

use crate::metrics::Metrics;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
}

#[derive(Clone)]
pub struct AppState {
    pub workflow: Arc<BookingWorkflow>,
    pub confirmations: Arc<PaymentConfirmationListener>,
    pub catalog: Arc<ShowCatalog>,
    pub bookings: Arc<dyn BookingRepository>,
    pub users: Arc<dyn UserDirectory>,
    pub metrics: Arc<Metrics>,
    pub auth: AuthConfig,
    /// Used for payment redirects when the request names no origin.
    pub frontend_url: String,
}
