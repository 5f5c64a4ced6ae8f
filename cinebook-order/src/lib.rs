pub mod confirmation;
pub mod delivery;
pub mod expiry;
pub mod reminders;
pub mod scheduler;
pub mod workflow;

pub use confirmation::{ConfirmationError, PaymentConfirmationListener, WebhookOutcome};
pub use delivery::DirectDelivery;
pub use expiry::{ExpirationReaper, ExpiryObserver, ExpiryOutcome, SweepReport};
pub use reminders::{ReminderReport, ReminderScanner};
pub use scheduler::{ExpiryScheduler, ScheduleError, TokioExpiryScheduler};
pub use workflow::{BookingCreated, BookingRequest, BookingSettings, BookingWorkflow, PaymentMode};

use cinebook_core::repository::{LockError, StoreError};
use cinebook_core::SeatId;

/// Failures surfaced to whoever asked for a booking.
#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("Authentication required. Please login to proceed.")]
    Unauthenticated,

    #[error("Selected Seats are not available.")]
    SeatsUnavailable(Vec<SeatId>),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    ConfigError(String),

    #[error("{0}")]
    InvalidState(String),

    #[error("{0}")]
    UpstreamError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for BookingError {
    fn from(err: StoreError) -> Self {
        BookingError::Internal(err.to_string())
    }
}

impl From<LockError> for BookingError {
    fn from(err: LockError) -> Self {
        BookingError::Internal(err.to_string())
    }
}
