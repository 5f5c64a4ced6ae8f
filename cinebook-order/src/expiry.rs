use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use cinebook_core::repository::{BookingRepository, ShowLock, ShowRepository, StoreResult};
use cinebook_core::{BookingRecord, SeatId};

const RELEASE_ATTEMPTS: u32 = 3;
const RELEASE_BACKOFF: std::time::Duration = std::time::Duration::from_millis(200);

/// Told about every booking the reaper expires, whether the delayed check or
/// the sweep got there first.
pub trait ExpiryObserver: Send + Sync {
    fn booking_expired(&self, booking: &BookingRecord, released: usize);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpiryOutcome {
    /// Already deleted by an earlier run.
    Missing,
    /// Paid bookings are never touched.
    Paid,
    /// Still inside its hold window.
    NotYetDue,
    Expired { released: usize },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub examined: usize,
    pub expired: usize,
    pub seats_released: usize,
    pub errors: usize,
}

/// Releases seats and deletes bookings left unpaid past the hold window.
///
/// Both the per-booking delayed check and the periodic sweep call
/// [`ExpirationReaper::expire_if_unpaid`], so either may run first, or twice.
pub struct ExpirationReaper {
    bookings: Arc<dyn BookingRepository>,
    shows: Arc<dyn ShowRepository>,
    lock: Arc<dyn ShowLock>,
    hold: Duration,
    observer: Option<Arc<dyn ExpiryObserver>>,
}

impl ExpirationReaper {
    pub fn new(
        bookings: Arc<dyn BookingRepository>,
        shows: Arc<dyn ShowRepository>,
        lock: Arc<dyn ShowLock>,
        hold: Duration,
    ) -> Self {
        Self {
            bookings,
            shows,
            lock,
            hold,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn ExpiryObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub async fn expire_if_unpaid(&self, booking_id: Uuid, now: DateTime<Utc>) -> StoreResult<ExpiryOutcome> {
        let booking = match self.bookings.get_booking(booking_id).await? {
            Some(booking) => booking,
            None => return Ok(ExpiryOutcome::Missing),
        };
        if booking.is_paid {
            return Ok(ExpiryOutcome::Paid);
        }
        if booking.created_at + self.hold > now {
            return Ok(ExpiryOutcome::NotYetDue);
        }

        // The delete only succeeds while the record is unpaid, so a payment
        // landing between the read above and here keeps its seats.
        let deleted = match self.bookings.delete_if_unpaid(booking_id).await? {
            Some(deleted) => deleted,
            None => {
                let outcome = match self.bookings.get_booking(booking_id).await? {
                    Some(b) if b.is_paid => ExpiryOutcome::Paid,
                    _ => ExpiryOutcome::Missing,
                };
                return Ok(outcome);
            }
        };

        let released = self.release_seats(&deleted).await?;
        info!(
            %booking_id,
            show_id = %deleted.show_id,
            released,
            "Expired unpaid booking"
        );
        if let Some(observer) = &self.observer {
            observer.booking_expired(&deleted, released);
        }
        Ok(ExpiryOutcome::Expired { released })
    }

    /// Frees the booking's seats under the show lock, retrying transient
    /// failures. Also used to compensate a booking that could not be handed to
    /// the payment provider.
    ///
    /// Callers have already deleted the record, so a final failure leaves seats
    /// no sweep can find again; they are logged in full for manual release.
    pub async fn release_seats(&self, booking: &BookingRecord) -> StoreResult<usize> {
        let mut attempt = 1;
        loop {
            match self.release_once(booking).await {
                Ok(released) => return Ok(released),
                Err(e) if attempt < RELEASE_ATTEMPTS => {
                    warn!(booking_id = %booking.id, attempt, error = %e, "Seat release failed, retrying");
                    tokio::time::sleep(RELEASE_BACKOFF * attempt).await;
                    attempt += 1;
                }
                Err(e) => {
                    let seats: Vec<String> = booking.booked_seats.iter().map(SeatId::to_string).collect();
                    error!(
                        booking_id = %booking.id,
                        show_id = %booking.show_id,
                        holder = %booking.user_id,
                        seats = %seats.join(","),
                        error = %e,
                        "Seats left held for a deleted booking"
                    );
                    return Err(e);
                }
            }
        }
    }

    async fn release_once(&self, booking: &BookingRecord) -> StoreResult<usize> {
        let guard = match self.lock.acquire(booking.show_id).await {
            Ok(token) => Some(token),
            Err(e) => {
                warn!(show_id = %booking.show_id, error = %e, "Releasing seats without show lock");
                None
            }
        };

        let released = self
            .shows
            .release_seats(booking.show_id, &booking.booked_seats, &booking.user_id)
            .await;

        if let Some(token) = guard {
            if let Err(e) = self.lock.release(token).await {
                warn!(show_id = %booking.show_id, error = %e, "Failed to release show lock");
            }
        }
        released
    }

    /// One pass over every unpaid booking older than the hold window.
    pub async fn sweep(&self, now: DateTime<Utc>) -> StoreResult<SweepReport> {
        let cutoff = now - self.hold;
        let stale = self.bookings.find_unpaid_created_before(cutoff).await?;
        let mut report = SweepReport {
            examined: stale.len(),
            ..SweepReport::default()
        };

        for booking in stale {
            match self.expire_if_unpaid(booking.id, now).await {
                Ok(ExpiryOutcome::Expired { released }) => {
                    report.expired += 1;
                    report.seats_released += released;
                }
                Ok(outcome) => debug!(booking_id = %booking.id, ?outcome, "Sweep skipped booking"),
                Err(e) => {
                    report.errors += 1;
                    error!(booking_id = %booking.id, error = %e, "Sweep failed to expire booking");
                }
            }
        }

        if report.examined > 0 {
            info!(
                examined = report.examined,
                expired = report.expired,
                errors = report.errors,
                "Expiry sweep finished"
            );
        }
        Ok(report)
    }
}
