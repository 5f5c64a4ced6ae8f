use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use cinebook_core::booking::{booking_amount, generate_booking_token};
use cinebook_core::notify::{Notification, NotificationDispatcher};
use cinebook_core::payment::{currency_code, CheckoutRequest, PaymentError, PaymentProvider};
use cinebook_core::repository::{BookingRepository, ShowLock, ShowRepository, StoreError};
use cinebook_core::seat::parse_seats;
use cinebook_core::{Availability, AvailabilityChecker, BookingRecord, SeatId, Show};
use rust_decimal::Decimal;

use crate::expiry::ExpirationReaper;
use crate::scheduler::ExpiryScheduler;
use crate::BookingError;

const TOKEN_ATTEMPTS: usize = 3;
const GENERIC_UPSTREAM_MESSAGE: &str = "Payment gateway error. Please try again.";
const CONFIRMED_MESSAGE: &str = "Booking%20confirmed%20successfully!";

/// How bookings get paid for.
#[derive(Clone)]
pub enum PaymentMode {
    /// No provider configured: bookings are confirmed on the spot.
    Disabled,
    /// A key was configured but is not usable; every booking fails with this message.
    Misconfigured(String),
    Provider(Arc<dyn PaymentProvider>),
}

#[derive(Debug, Clone)]
pub struct BookingSettings {
    pub hold: Duration,
    pub max_seats: usize,
    pub session_ttl: Duration,
    pub currency: String,
}

impl Default for BookingSettings {
    fn default() -> Self {
        Self {
            hold: Duration::minutes(10),
            max_seats: cinebook_core::booking::MAX_SEATS_PER_BOOKING,
            session_ttl: Duration::minutes(30),
            currency: "inr".into(),
        }
    }
}

/// Raw booking input as it arrives from a client.
#[derive(Debug, Clone, Default)]
pub struct BookingRequest {
    pub show_id: Option<String>,
    pub selected_seats: Option<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct BookingCreated {
    pub booking: BookingRecord,
    /// Where the client goes next: the hosted checkout, or straight to "my bookings".
    pub redirect_url: String,
}

/// Create, reserve, then either confirm or hand off to payment.
pub struct BookingWorkflow {
    shows: Arc<dyn ShowRepository>,
    bookings: Arc<dyn BookingRepository>,
    availability: AvailabilityChecker,
    lock: Arc<dyn ShowLock>,
    payments: PaymentMode,
    scheduler: Arc<dyn ExpiryScheduler>,
    reaper: Arc<ExpirationReaper>,
    dispatcher: Arc<NotificationDispatcher>,
    settings: BookingSettings,
}

impl BookingWorkflow {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        shows: Arc<dyn ShowRepository>,
        bookings: Arc<dyn BookingRepository>,
        lock: Arc<dyn ShowLock>,
        payments: PaymentMode,
        scheduler: Arc<dyn ExpiryScheduler>,
        reaper: Arc<ExpirationReaper>,
        dispatcher: Arc<NotificationDispatcher>,
        settings: BookingSettings,
    ) -> Self {
        Self {
            availability: AvailabilityChecker::new(shows.clone()),
            shows,
            bookings,
            lock,
            payments,
            scheduler,
            reaper,
            dispatcher,
            settings,
        }
    }

    pub async fn create_booking(
        &self,
        user_id: &str,
        request: BookingRequest,
        origin: &str,
    ) -> Result<BookingCreated, BookingError> {
        if user_id.trim().is_empty() {
            return Err(BookingError::Unauthenticated);
        }
        let (show_id, seats) = self.validate(request)?;

        if let PaymentMode::Misconfigured(reason) = &self.payments {
            error!(%reason, "Payment provider key is malformed");
            return Err(BookingError::ConfigError(
                "Payment gateway configuration error. Please contact support.".into(),
            ));
        }

        let now = Utc::now();
        let token = self.lock.acquire(show_id).await?;
        let reserved = self.reserve(user_id, show_id, &seats, now).await;
        if let Err(e) = self.lock.release(token).await {
            warn!(%show_id, error = %e, "Failed to release show lock");
        }
        let (mut booking, show) = reserved?;

        info!(
            booking_id = %booking.id,
            %show_id,
            seats = booking.booked_seats.len(),
            amount = %booking.amount,
            "Booking created, seats held"
        );

        let provider = match &self.payments {
            PaymentMode::Provider(provider) => provider.clone(),
            _ => return self.confirm_without_payment(booking, origin).await,
        };

        let session = match self.open_checkout(provider.as_ref(), &booking, &show, origin, now).await {
            Ok(session) => session,
            Err(message) => {
                self.abandon(&booking).await;
                return Err(BookingError::UpstreamError(message));
            }
        };

        self.bookings.set_payment_link(booking.id, &session).await?;
        booking.payment_link = session.clone();

        let fire_at = booking.created_at + self.settings.hold;
        if let Err(e) = self.scheduler.schedule(booking.id, fire_at) {
            warn!(booking_id = %booking.id, error = %e, "Could not schedule expiry check; sweep will cover it");
        }

        Ok(BookingCreated {
            booking,
            redirect_url: session,
        })
    }

    fn validate(&self, request: BookingRequest) -> Result<(Uuid, Vec<SeatId>), BookingError> {
        let raw_show = request
            .show_id
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| BookingError::InvalidInput("Show ID is required".into()))?;

        let raw_seats = request
            .selected_seats
            .filter(|s| !s.is_empty())
            .ok_or_else(|| BookingError::InvalidInput("At least one seat must be selected".into()))?;
        if raw_seats.len() > self.settings.max_seats {
            return Err(BookingError::InvalidInput(format!(
                "Maximum {} seats can be booked at once",
                self.settings.max_seats
            )));
        }

        let show_id = Uuid::parse_str(&raw_show)
            .map_err(|_| BookingError::InvalidInput("Invalid show ID".into()))?;
        let seats = parse_seats(&raw_seats).map_err(|e| BookingError::InvalidInput(e.to_string()))?;

        Ok((show_id, seats))
    }

    /// Check, price, record, hold. Runs while the show lock is held.
    async fn reserve(
        &self,
        user_id: &str,
        show_id: Uuid,
        seats: &[SeatId],
        now: DateTime<Utc>,
    ) -> Result<(BookingRecord, Show), BookingError> {
        match self.availability.check(show_id, seats).await? {
            Availability::Available => {}
            Availability::Unavailable(taken) => return Err(BookingError::SeatsUnavailable(taken)),
            Availability::ShowMissing => return Err(BookingError::NotFound("Show not found".into())),
        }

        let show = self
            .shows
            .get_show(show_id)
            .await?
            .ok_or_else(|| BookingError::NotFound("Show not found".into()))?;
        if !show.has_valid_price() {
            return Err(BookingError::InvalidState("Invalid show price".into()));
        }

        let amount = booking_amount(show.price, seats.len())
            .filter(|a| *a > Decimal::ZERO)
            .ok_or_else(|| BookingError::InvalidState("Invalid booking amount".into()))?;

        let booking = self.insert_with_fresh_token(user_id, show_id, amount, seats, now).await?;

        match self.shows.hold_seats(show_id, seats, user_id).await {
            Ok(()) => Ok((booking, show)),
            Err(e) => {
                if let Err(cleanup) = self.bookings.delete_if_unpaid(booking.id).await {
                    error!(booking_id = %booking.id, error = %cleanup, "Failed to remove booking after seat hold failed");
                }
                match e {
                    StoreError::Conflict(_) => Err(BookingError::SeatsUnavailable(seats.to_vec())),
                    other => Err(other.into()),
                }
            }
        }
    }

    async fn insert_with_fresh_token(
        &self,
        user_id: &str,
        show_id: Uuid,
        amount: Decimal,
        seats: &[SeatId],
        now: DateTime<Utc>,
    ) -> Result<BookingRecord, BookingError> {
        let mut booking = BookingRecord::new(
            user_id.to_string(),
            show_id,
            amount,
            seats.to_vec(),
            generate_booking_token(now),
            now,
        );

        for attempt in 1..=TOKEN_ATTEMPTS {
            match self.bookings.create_booking(&booking).await {
                Ok(()) => return Ok(booking),
                Err(StoreError::Conflict(what)) if attempt < TOKEN_ATTEMPTS => {
                    warn!(attempt, %what, "Booking token collision, regenerating");
                    booking.booking_token = generate_booking_token(Utc::now());
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(BookingError::Internal("could not allocate a unique booking token".into()))
    }

    async fn confirm_without_payment(
        &self,
        mut booking: BookingRecord,
        origin: &str,
    ) -> Result<BookingCreated, BookingError> {
        self.bookings.mark_paid(booking.id).await?;
        booking.is_paid = true;
        booking.payment_link.clear();
        info!(booking_id = %booking.id, "Booking confirmed without payment");

        let dispatcher = self.dispatcher.clone();
        let notification = Notification::BookingConfirmed { booking_id: booking.id };
        tokio::spawn(async move {
            dispatcher.dispatch(&notification).await;
        });

        Ok(BookingCreated {
            booking,
            redirect_url: format!(
                "{}/loading/my-bookings?success=true&message={}",
                origin, CONFIRMED_MESSAGE
            ),
        })
    }

    /// Opens the hosted checkout, returning its URL or a message fit for the client.
    async fn open_checkout(
        &self,
        provider: &dyn PaymentProvider,
        booking: &BookingRecord,
        show: &Show,
        origin: &str,
        now: DateTime<Utc>,
    ) -> Result<String, String> {
        let request = CheckoutRequest {
            booking_id: booking.id,
            amount: booking.amount,
            currency: currency_code(&self.settings.currency).to_string(),
            product_name: show.movie_title.clone(),
            success_url: format!("{}/loading/my-bookings", origin),
            cancel_url: format!("{}/my-bookings", origin),
            expires_at: now + self.settings.session_ttl,
        };

        match provider.create_checkout_session(&request).await {
            Ok(session) => session.url.filter(|u| !u.is_empty()).ok_or_else(|| {
                error!(booking_id = %booking.id, session_id = %session.id, "Checkout session has no URL");
                GENERIC_UPSTREAM_MESSAGE.to_string()
            }),
            Err(PaymentError::Upstream(message)) => {
                error!(booking_id = %booking.id, %message, "Checkout session creation failed");
                Err(message)
            }
            Err(e) => {
                error!(booking_id = %booking.id, error = %e, "Checkout session creation failed");
                Err(GENERIC_UPSTREAM_MESSAGE.to_string())
            }
        }
    }

    /// Undo a booking that can never be paid: drop the record, free the seats.
    async fn abandon(&self, booking: &BookingRecord) {
        match self.bookings.delete_if_unpaid(booking.id).await {
            Ok(Some(deleted)) => {
                if let Err(e) = self.reaper.release_seats(&deleted).await {
                    error!(booking_id = %booking.id, error = %e, "Failed to release seats of abandoned booking");
                }
            }
            Ok(None) => {}
            Err(e) => error!(booking_id = %booking.id, error = %e, "Failed to delete abandoned booking"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::ScheduleError;
    use async_trait::async_trait;
    use cinebook_core::notify::{Delivery, DeliveryStrategy, NotifyError};
    use cinebook_store::{InMemoryBookingRepository, InMemoryShowLock, InMemoryShowRepository, MockPaymentProvider};
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<Notification>>,
    }

    #[async_trait]
    impl DeliveryStrategy for Recorder {
        fn name(&self) -> &'static str {
            "recorder"
        }

        async fn deliver(&self, notification: &Notification) -> Result<Delivery, NotifyError> {
            self.seen.lock().await.push(notification.clone());
            Ok(Delivery::Sent)
        }
    }

    /// Records delayed checks instead of running them.
    #[derive(Default)]
    struct ScheduleLog {
        calls: std::sync::Mutex<Vec<(Uuid, DateTime<Utc>)>>,
    }

    impl ExpiryScheduler for ScheduleLog {
        fn schedule(&self, booking_id: Uuid, fire_at: DateTime<Utc>) -> Result<(), ScheduleError> {
            self.calls.lock().unwrap().push((booking_id, fire_at));
            Ok(())
        }
    }

    struct Fixture {
        shows: Arc<InMemoryShowRepository>,
        bookings: Arc<InMemoryBookingRepository>,
        recorder: Arc<Recorder>,
        schedules: Arc<ScheduleLog>,
        show_id: Uuid,
    }

    async fn fixture() -> Fixture {
        let shows = Arc::new(InMemoryShowRepository::new());
        let show = Show::new("m1".into(), "Dune".into(), Utc::now() + Duration::days(1), Decimal::from(200));
        let show_id = show.id;
        shows.create_shows(&[show]).await.unwrap();
        Fixture {
            shows,
            bookings: Arc::new(InMemoryBookingRepository::new()),
            recorder: Arc::new(Recorder::default()),
            schedules: Arc::new(ScheduleLog::default()),
            show_id,
        }
    }

    async fn wait_for_notifications(recorder: &Recorder, n: usize) -> Vec<Notification> {
        for _ in 0..50 {
            let seen = recorder.seen.lock().await.clone();
            if seen.len() >= n {
                return seen;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        recorder.seen.lock().await.clone()
    }

    fn workflow(f: &Fixture, payments: PaymentMode) -> BookingWorkflow {
        let lock: Arc<dyn ShowLock> = Arc::new(InMemoryShowLock::default());
        let reaper = Arc::new(ExpirationReaper::new(
            f.bookings.clone(),
            f.shows.clone(),
            lock.clone(),
            Duration::minutes(10),
        ));
        BookingWorkflow::new(
            f.shows.clone(),
            f.bookings.clone(),
            lock,
            payments,
            f.schedules.clone(),
            reaper,
            Arc::new(NotificationDispatcher::new(vec![f.recorder.clone()])),
            BookingSettings::default(),
        )
    }

    fn request(show_id: Uuid, seats: &[&str]) -> BookingRequest {
        BookingRequest {
            show_id: Some(show_id.to_string()),
            selected_seats: Some(seats.iter().map(|s| s.to_string()).collect()),
        }
    }

    async fn occupied(f: &Fixture) -> Vec<String> {
        f.shows
            .get_show(f.show_id)
            .await
            .unwrap()
            .unwrap()
            .occupied_seats
            .occupied()
            .iter()
            .map(SeatId::to_string)
            .collect()
    }

    #[tokio::test]
    async fn test_validation_messages() {
        let f = fixture().await;
        let wf = workflow(&f, PaymentMode::Disabled);
        let origin = "http://localhost:5173";

        let err = wf.create_booking("user_1", BookingRequest::default(), origin).await.unwrap_err();
        assert_eq!(err.to_string(), "Show ID is required");

        let req = BookingRequest { show_id: Some(f.show_id.to_string()), selected_seats: Some(vec![]) };
        let err = wf.create_booking("user_1", req, origin).await.unwrap_err();
        assert_eq!(err.to_string(), "At least one seat must be selected");

        let eleven: Vec<String> = (1..=11).map(|c| format!("A{}", c)).collect();
        let req = BookingRequest { show_id: Some(f.show_id.to_string()), selected_seats: Some(eleven) };
        let err = wf.create_booking("user_1", req, origin).await.unwrap_err();
        assert_eq!(err.to_string(), "Maximum 10 seats can be booked at once");

        let err = wf.create_booking("user_1", request(f.show_id, &["A1", "A1"]), origin).await.unwrap_err();
        assert!(matches!(err, BookingError::InvalidInput(_)));

        let err = wf.create_booking("", request(f.show_id, &["A1"]), origin).await.unwrap_err();
        assert!(matches!(err, BookingError::Unauthenticated));
    }

    #[tokio::test]
    async fn test_booking_without_provider_is_paid_immediately() {
        let f = fixture().await;
        let wf = workflow(&f, PaymentMode::Disabled);

        let created = wf
            .create_booking("user_1", request(f.show_id, &["A1", "A2"]), "http://localhost:5173")
            .await
            .unwrap();
        assert!(created.booking.is_paid);
        assert_eq!(created.booking.amount.to_string(), "400.00");
        assert!(created.booking.payment_link.is_empty());
        assert!(created.redirect_url.starts_with("http://localhost:5173/loading/my-bookings?success=true"));
        assert!(f.bookings.get_booking(created.booking.id).await.unwrap().unwrap().is_paid);
        assert_eq!(occupied(&f).await, vec!["A1", "A2"]);
    }

    #[tokio::test]
    async fn test_booking_without_provider_sends_confirmation() {
        let f = fixture().await;
        let wf = workflow(&f, PaymentMode::Disabled);

        let created = wf.create_booking("user_1", request(f.show_id, &["B1"]), "o").await.unwrap();
        let seen = wait_for_notifications(&f.recorder, 1).await;
        assert_eq!(seen, vec![Notification::BookingConfirmed { booking_id: created.booking.id }]);
        assert!(f.schedules.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_provider_path_schedules_one_expiry_check() {
        let f = fixture().await;
        let wf = workflow(&f, PaymentMode::Provider(Arc::new(MockPaymentProvider::new())));

        let created = wf.create_booking("user_1", request(f.show_id, &["B2"]), "o").await.unwrap();
        let calls = f.schedules.calls.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec![(created.booking.id, created.booking.created_at + Duration::minutes(10))]
        );
        assert!(f.recorder.seen.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_unpriceable_show_fails_and_frees_the_lock() {
        let f = fixture().await;
        let show = Show::new("m2".into(), "Tenet".into(), Utc::now() + Duration::days(1), Decimal::MAX);
        let show_id = show.id;
        f.shows.create_shows(&[show]).await.unwrap();
        let wf = workflow(&f, PaymentMode::Disabled);

        for _ in 0..2 {
            let err = wf
                .create_booking("user_1", request(show_id, &["A1", "A2"]), "o")
                .await
                .unwrap_err();
            assert!(matches!(err, BookingError::InvalidState(_)), "unexpected error: {err:?}");
        }
        assert_eq!(f.bookings.len().await, 0);
    }

    #[tokio::test]
    async fn test_conflict_leaves_no_partial_reservation() {
        let f = fixture().await;
        let wf = workflow(&f, PaymentMode::Disabled);
        wf.create_booking("user_1", request(f.show_id, &["A1", "A2"]), "o").await.unwrap();

        let err = wf
            .create_booking("user_2", request(f.show_id, &["A1", "A3"]), "o")
            .await
            .unwrap_err();
        match err {
            BookingError::SeatsUnavailable(taken) => assert_eq!(taken, vec!["A1".parse::<SeatId>().unwrap()]),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(occupied(&f).await, vec!["A1", "A2"]);
        assert_eq!(f.bookings.len().await, 1);
    }

    #[tokio::test]
    async fn test_unknown_show_is_not_found() {
        let f = fixture().await;
        let wf = workflow(&f, PaymentMode::Disabled);
        let err = wf.create_booking("user_1", request(Uuid::new_v4(), &["A1"]), "o").await.unwrap_err();
        assert!(matches!(err, BookingError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_provider_path_returns_checkout_url() {
        let f = fixture().await;
        let provider = Arc::new(MockPaymentProvider::new());
        let wf = workflow(&f, PaymentMode::Provider(provider.clone()));

        let created = wf
            .create_booking("user_1", request(f.show_id, &["A3"]), "https://cine.example")
            .await
            .unwrap();
        assert!(!created.booking.is_paid);
        assert!(!created.booking.payment_link.is_empty());
        assert_eq!(created.redirect_url, created.booking.payment_link);

        let stored = f.bookings.get_booking(created.booking.id).await.unwrap().unwrap();
        assert_eq!(stored.payment_link, created.redirect_url);
        assert_eq!(occupied(&f).await, vec!["A3"]);

        let sent = provider.requests().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].product_name, "Dune");
        assert_eq!(sent[0].currency, "inr");
        assert_eq!(sent[0].success_url, "https://cine.example/loading/my-bookings");
        assert_eq!(sent[0].cancel_url, "https://cine.example/my-bookings");
        assert_eq!(sent[0].amount.to_string(), "200.00");
    }

    #[tokio::test]
    async fn test_abandoned_checkout_is_swept_after_hold() {
        let f = fixture().await;
        let wf = workflow(&f, PaymentMode::Provider(Arc::new(MockPaymentProvider::new())));
        let created = wf.create_booking("user_1", request(f.show_id, &["A4"]), "o").await.unwrap();
        assert_eq!(occupied(&f).await, vec!["A4"]);

        let reaper = ExpirationReaper::new(
            f.bookings.clone(),
            f.shows.clone(),
            Arc::new(InMemoryShowLock::default()),
            Duration::minutes(10),
        );
        let later = created.booking.created_at + Duration::minutes(10) + Duration::seconds(1);
        let first = reaper.sweep(later).await.unwrap();
        assert_eq!(first.expired, 1);
        assert!(occupied(&f).await.is_empty());
        assert!(f.bookings.get_booking(created.booking.id).await.unwrap().is_none());

        let second = reaper.sweep(later).await.unwrap();
        assert_eq!(second.expired, 0);
    }

    #[tokio::test]
    async fn test_provider_failure_rolls_back() {
        let f = fixture().await;
        let provider = Arc::new(MockPaymentProvider::failing("Your card was declined"));
        let wf = workflow(&f, PaymentMode::Provider(provider));

        let err = wf
            .create_booking("user_1", request(f.show_id, &["A5"]), "o")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Your card was declined");
        assert!(matches!(err, BookingError::UpstreamError(_)));
        assert!(occupied(&f).await.is_empty());
        assert_eq!(f.bookings.len().await, 0);
    }

    #[tokio::test]
    async fn test_malformed_key_fails_before_anything_is_written() {
        let f = fixture().await;
        let wf = workflow(&f, PaymentMode::Misconfigured("bad prefix".into()));

        let err = wf
            .create_booking("user_1", request(f.show_id, &["A1"]), "o")
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::ConfigError(_)));
        assert!(occupied(&f).await.is_empty());
        assert_eq!(f.bookings.len().await, 0);
    }

    #[tokio::test]
    async fn test_concurrent_requests_for_same_seat_book_once() {
        let f = fixture().await;
        let wf = Arc::new(workflow(&f, PaymentMode::Disabled));

        let mut handles = Vec::new();
        for i in 0..8 {
            let wf = wf.clone();
            let show_id = f.show_id;
            handles.push(tokio::spawn(async move {
                wf.create_booking(&format!("user_{i}"), request(show_id, &["A7"]), "o").await
            }));
        }

        let mut won = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                won += 1;
            }
        }
        assert_eq!(won, 1);
        assert_eq!(f.bookings.len().await, 1);
    }
}
