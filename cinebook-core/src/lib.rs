pub mod availability;
pub mod booking;
pub mod notify;
pub mod payment;
pub mod repository;
pub mod seat;
pub mod show;
pub mod user;
pub mod webhook;

pub use availability::{Availability, AvailabilityChecker};
pub use booking::{BookingRecord, PaidTransition};
pub use seat::{SeatId, SeatMap};
pub use show::Show;
pub use user::User;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Invalid seat: {0}")]
    InvalidSeat(String),
    #[error("Seat {0} selected more than once")]
    DuplicateSeat(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
