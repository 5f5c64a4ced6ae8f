use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};
use uuid::Uuid;

use crate::expiry::{ExpirationReaper, ExpiryOutcome};

#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("No async runtime available to run the delayed check")]
    NoRuntime,
}

/// Runs a one-off expiry check for a booking at a given instant.
pub trait ExpiryScheduler: Send + Sync {
    fn schedule(&self, booking_id: Uuid, fire_at: DateTime<Utc>) -> Result<(), ScheduleError>;
}

/// Delayed checks as detached tokio tasks. They do not survive a restart; the
/// periodic sweep picks up whatever they miss.
pub struct TokioExpiryScheduler {
    reaper: Arc<ExpirationReaper>,
}

impl TokioExpiryScheduler {
    pub fn new(reaper: Arc<ExpirationReaper>) -> Self {
        Self { reaper }
    }

    pub fn spawn_check(
        &self,
        booking_id: Uuid,
        fire_at: DateTime<Utc>,
    ) -> Result<JoinHandle<Option<ExpiryOutcome>>, ScheduleError> {
        let handle = tokio::runtime::Handle::try_current().map_err(|_| ScheduleError::NoRuntime)?;
        let reaper = self.reaper.clone();

        Ok(handle.spawn(async move {
            let delay = (fire_at - Utc::now()).to_std().unwrap_or_default();
            tokio::time::sleep(delay).await;

            // Never evaluate earlier than the deadline the check was scheduled for.
            let now = Utc::now().max(fire_at);
            match reaper.expire_if_unpaid(booking_id, now).await {
                Ok(outcome) => {
                    info!(%booking_id, ?outcome, "Delayed expiry check ran");
                    Some(outcome)
                }
                Err(e) => {
                    error!(%booking_id, error = %e, "Delayed expiry check failed");
                    None
                }
            }
        }))
    }
}

impl ExpiryScheduler for TokioExpiryScheduler {
    fn schedule(&self, booking_id: Uuid, fire_at: DateTime<Utc>) -> Result<(), ScheduleError> {
        self.spawn_check(booking_id, fire_at).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use cinebook_core::repository::{BookingRepository, ShowRepository};
    use cinebook_core::{BookingRecord, SeatId, Show};
    use cinebook_store::{InMemoryBookingRepository, InMemoryShowLock, InMemoryShowRepository};
    use rust_decimal::Decimal;

    #[tokio::test(start_paused = true)]
    async fn test_delayed_check_expires_unpaid_booking() {
        let bookings = Arc::new(InMemoryBookingRepository::new());
        let shows = Arc::new(InMemoryShowRepository::new());
        let show = Show::new("m1".into(), "Dune".into(), Utc::now() + Duration::days(1), Decimal::from(200));
        shows.create_shows(&[show.clone()]).await.unwrap();

        let seat: SeatId = "A4".parse().unwrap();
        let created_at = Utc::now();
        let record = BookingRecord::new("user_1".into(), show.id, Decimal::from(200), vec![seat], "BK-T-1".into(), created_at);
        bookings.create_booking(&record).await.unwrap();
        shows.hold_seats(show.id, &[seat], "user_1").await.unwrap();

        let reaper = Arc::new(ExpirationReaper::new(
            bookings.clone(),
            shows.clone(),
            Arc::new(InMemoryShowLock::default()),
            Duration::minutes(10),
        ));
        let scheduler = TokioExpiryScheduler::new(reaper);
        let handle = scheduler
            .spawn_check(record.id, created_at + Duration::minutes(10))
            .unwrap();

        let outcome = handle.await.unwrap();
        assert_eq!(outcome, Some(ExpiryOutcome::Expired { released: 1 }));
        assert!(bookings.get_booking(record.id).await.unwrap().is_none());
    }

    #[test]
    fn test_schedule_outside_runtime_fails() {
        let reaper = Arc::new(ExpirationReaper::new(
            Arc::new(InMemoryBookingRepository::new()),
            Arc::new(InMemoryShowRepository::new()),
            Arc::new(InMemoryShowLock::default()),
            Duration::minutes(10),
        ));
        let scheduler = TokioExpiryScheduler::new(reaper);
        assert!(matches!(
            scheduler.schedule(Uuid::new_v4(), Utc::now()),
            Err(ScheduleError::NoRuntime)
        ));
    }
}
