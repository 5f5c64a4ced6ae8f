//! In-process adapters used when no external backend is configured, and by tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use cinebook_core::notify::{Mailer, NotifyError, OutgoingEmail};
use cinebook_core::payment::{CheckoutRequest, CheckoutSession, PaymentError, PaymentProvider};
use cinebook_core::repository::{
    BookingRepository, LockError, LockToken, ShowLock, ShowRepository, StoreError, StoreResult,
    UserDirectory,
};
use cinebook_core::{BookingRecord, PaidTransition, SeatId, Show, User};
use cinebook_shared::Masked;

// ============================================================================
// Shows
// ============================================================================

#[derive(Default)]
pub struct InMemoryShowRepository {
    shows: RwLock<HashMap<Uuid, Show>>,
}

impl InMemoryShowRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ShowRepository for InMemoryShowRepository {
    async fn get_show(&self, id: Uuid) -> StoreResult<Option<Show>> {
        Ok(self.shows.read().await.get(&id).cloned())
    }

    async fn create_shows(&self, shows: &[Show]) -> StoreResult<()> {
        let mut store = self.shows.write().await;
        for show in shows {
            store.insert(show.id, show.clone());
        }
        Ok(())
    }

    async fn upcoming_shows(&self, now: DateTime<Utc>) -> StoreResult<Vec<Show>> {
        let mut shows: Vec<Show> = self
            .shows
            .read()
            .await
            .values()
            .filter(|s| s.show_date_time >= now)
            .cloned()
            .collect();
        shows.sort_by_key(|s| s.show_date_time);
        Ok(shows)
    }

    async fn hold_seats(&self, show_id: Uuid, seats: &[SeatId], user_id: &str) -> StoreResult<()> {
        let mut store = self.shows.write().await;
        let show = store
            .get_mut(&show_id)
            .ok_or_else(|| StoreError::NotFound(format!("show {}", show_id)))?;
        show.occupied_seats.hold(seats, user_id).map_err(|taken| {
            let labels: Vec<String> = taken.iter().map(SeatId::to_string).collect();
            StoreError::Conflict(format!("seats already held: {}", labels.join(", ")))
        })
    }

    async fn release_seats(&self, show_id: Uuid, seats: &[SeatId], holder: &str) -> StoreResult<usize> {
        let mut store = self.shows.write().await;
        Ok(store
            .get_mut(&show_id)
            .map(|show| show.occupied_seats.release(seats, holder))
            .unwrap_or(0))
    }

    async fn shows_starting_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<Show>> {
        let mut shows: Vec<Show> = self
            .shows
            .read()
            .await
            .values()
            .filter(|s| s.show_date_time > from && s.show_date_time <= to)
            .cloned()
            .collect();
        shows.sort_by_key(|s| s.show_date_time);
        Ok(shows)
    }
}

// ============================================================================
// Bookings
// ============================================================================

#[derive(Default)]
pub struct InMemoryBookingRepository {
    bookings: RwLock<HashMap<Uuid, BookingRecord>>,
}

impl InMemoryBookingRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.bookings.read().await.len()
    }

    fn newest_first(mut bookings: Vec<BookingRecord>) -> Vec<BookingRecord> {
        bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        bookings
    }
}

#[async_trait]
impl BookingRepository for InMemoryBookingRepository {
    async fn create_booking(&self, booking: &BookingRecord) -> StoreResult<()> {
        let mut store = self.bookings.write().await;
        if store.values().any(|b| b.booking_token == booking.booking_token) {
            return Err(StoreError::Conflict(format!("booking token {}", booking.booking_token)));
        }
        if store.contains_key(&booking.id) {
            return Err(StoreError::Conflict(format!("booking id {}", booking.id)));
        }
        store.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn get_booking(&self, id: Uuid) -> StoreResult<Option<BookingRecord>> {
        Ok(self.bookings.read().await.get(&id).cloned())
    }

    async fn set_payment_link(&self, id: Uuid, link: &str) -> StoreResult<()> {
        let mut store = self.bookings.write().await;
        match store.get_mut(&id) {
            Some(booking) if !booking.is_paid => {
                booking.payment_link = link.to_string();
                Ok(())
            }
            _ => Err(StoreError::NotFound(format!("unpaid booking {}", id))),
        }
    }

    async fn mark_paid(&self, id: Uuid) -> StoreResult<Option<PaidTransition>> {
        let mut store = self.bookings.write().await;
        Ok(store.get_mut(&id).map(|booking| {
            if booking.is_paid {
                PaidTransition::Already
            } else {
                booking.is_paid = true;
                booking.payment_link.clear();
                PaidTransition::Newly
            }
        }))
    }

    async fn delete_if_unpaid(&self, id: Uuid) -> StoreResult<Option<BookingRecord>> {
        let mut store = self.bookings.write().await;
        match store.get(&id) {
            Some(booking) if !booking.is_paid => Ok(store.remove(&id)),
            _ => Ok(None),
        }
    }

    async fn find_unpaid_created_before(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<BookingRecord>> {
        let mut unpaid: Vec<BookingRecord> = self
            .bookings
            .read()
            .await
            .values()
            .filter(|b| !b.is_paid && b.is_older_than(cutoff))
            .cloned()
            .collect();
        unpaid.sort_by_key(|b| b.created_at);
        Ok(unpaid)
    }

    async fn list_for_user(&self, user_id: &str) -> StoreResult<Vec<BookingRecord>> {
        let mine = self
            .bookings
            .read()
            .await
            .values()
            .filter(|b| b.user_id == user_id)
            .cloned()
            .collect();
        Ok(Self::newest_first(mine))
    }

    async fn list_all(&self) -> StoreResult<Vec<BookingRecord>> {
        let all = self.bookings.read().await.values().cloned().collect();
        Ok(Self::newest_first(all))
    }
}

// ============================================================================
// Users
// ============================================================================

#[derive(Default)]
pub struct InMemoryUserDirectory {
    users: RwLock<HashMap<String, User>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn get_user(&self, id: &str) -> StoreResult<Option<User>> {
        Ok(self.users.read().await.get(id).cloned())
    }

    async fn users_by_ids(&self, ids: &[String]) -> StoreResult<Vec<User>> {
        let users = self.users.read().await;
        Ok(ids.iter().filter_map(|id| users.get(id).cloned()).collect())
    }

    async fn list_users(&self) -> StoreResult<Vec<User>> {
        let mut users: Vec<User> = self.users.read().await.values().cloned().collect();
        users.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(users)
    }

    async fn upsert_user(&self, user: &User) -> StoreResult<()> {
        self.users.write().await.insert(user.id.clone(), user.clone());
        Ok(())
    }
}

// ============================================================================
// Show lock
// ============================================================================

const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(10);

struct Lease {
    token: String,
    expires_at: Instant,
}

/// Single-process show lock with the same lease semantics as the Redis one:
/// a holder that never releases loses the lock once `ttl` passes.
pub struct InMemoryShowLock {
    wait: Duration,
    ttl: Duration,
    leases: Mutex<HashMap<Uuid, Lease>>,
}

impl InMemoryShowLock {
    pub fn new(wait: Duration, ttl: Duration) -> Self {
        Self {
            wait,
            ttl,
            leases: Mutex::new(HashMap::new()),
        }
    }

    /// Tries once; lapsed leases on any show are dropped along the way.
    async fn try_lock(&self, show_id: Uuid, token: &str) -> bool {
        let mut leases = self.leases.lock().await;
        let now = Instant::now();
        leases.retain(|id, lease| {
            if lease.expires_at > now {
                return true;
            }
            warn!(show_id = %id, "Show lock lease lapsed without release");
            false
        });

        if leases.contains_key(&show_id) {
            return false;
        }
        leases.insert(
            show_id,
            Lease {
                token: token.to_string(),
                expires_at: now + self.ttl,
            },
        );
        true
    }
}

impl Default for InMemoryShowLock {
    fn default() -> Self {
        Self::new(Duration::from_secs(5), Duration::from_secs(30))
    }
}

#[async_trait]
impl ShowLock for InMemoryShowLock {
    async fn acquire(&self, show_id: Uuid) -> Result<LockToken, LockError> {
        let token = Uuid::new_v4().to_string();
        let deadline = Instant::now() + self.wait;

        loop {
            if self.try_lock(show_id, &token).await {
                return Ok(LockToken { show_id, token });
            }
            if Instant::now() >= deadline {
                return Err(LockError::Timeout(self.wait, show_id));
            }
            tokio::time::sleep(LOCK_RETRY_INTERVAL).await;
        }
    }

    async fn release(&self, token: LockToken) -> Result<(), LockError> {
        let mut leases = self.leases.lock().await;
        match leases.get(&token.show_id) {
            Some(lease) if lease.token == token.token => {
                leases.remove(&token.show_id);
            }
            _ => warn!(show_id = %token.show_id, "Show lock had already expired before release"),
        }
        Ok(())
    }
}

// ============================================================================
// Payment provider
// ============================================================================

/// Stands in for the hosted checkout: records sessions and can be told to fail.
#[derive(Default)]
pub struct MockPaymentProvider {
    sessions: Mutex<Vec<CheckoutSession>>,
    requests: Mutex<Vec<CheckoutRequest>>,
    failure: Option<String>,
}

impl MockPaymentProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call to create a session fails with this upstream message.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::default()
        }
    }

    pub async fn requests(&self) -> Vec<CheckoutRequest> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl PaymentProvider for MockPaymentProvider {
    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, PaymentError> {
        self.requests.lock().await.push(request.clone());
        if let Some(message) = &self.failure {
            return Err(PaymentError::Upstream(message.clone()));
        }

        let suffix = Uuid::new_v4().simple().to_string();
        let session = CheckoutSession {
            id: format!("cs_test_{}", suffix),
            url: Some(format!("https://checkout.stripe.test/c/pay/cs_test_{}", suffix)),
            payment_intent: Some(format!("pi_test_{}", suffix)),
            booking_id: Some(request.booking_id),
            expires_at: Some(request.expires_at),
        };
        self.sessions.lock().await.push(session.clone());
        Ok(session)
    }

    async fn find_session_by_payment_intent(
        &self,
        payment_intent: &str,
    ) -> Result<Option<CheckoutSession>, PaymentError> {
        Ok(self
            .sessions
            .lock()
            .await
            .iter()
            .find(|s| s.payment_intent.as_deref() == Some(payment_intent))
            .cloned())
    }
}

// ============================================================================
// Mail
// ============================================================================

/// Keeps outgoing mail in memory and logs it instead of talking to SMTP.
#[derive(Default)]
pub struct OutboxMailer {
    sent: Mutex<Vec<OutgoingEmail>>,
    fail: bool,
}

impl OutboxMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub async fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Mailer for OutboxMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), NotifyError> {
        if self.fail {
            return Err(NotifyError::Mail("outbox configured to fail".into()));
        }
        info!(to = %Masked(email.to.as_str()), subject = %email.subject, "Email captured in outbox");
        self.sent.lock().await.push(email.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn seat(s: &str) -> SeatId {
        s.parse().unwrap()
    }

    fn booking(token: &str) -> BookingRecord {
        BookingRecord::new(
            "user_1".into(),
            Uuid::new_v4(),
            Decimal::new(20000, 2),
            vec![seat("A1")],
            token.into(),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_duplicate_token_conflicts() {
        let repo = InMemoryBookingRepository::new();
        repo.create_booking(&booking("BK-1-AAAAAA")).await.unwrap();
        let err = repo.create_booking(&booking("BK-1-AAAAAA")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_paid_booking_is_never_deleted() {
        let repo = InMemoryBookingRepository::new();
        let record = booking("BK-1-BBBBBB");
        repo.create_booking(&record).await.unwrap();

        assert_eq!(repo.mark_paid(record.id).await.unwrap(), Some(PaidTransition::Newly));
        assert_eq!(repo.mark_paid(record.id).await.unwrap(), Some(PaidTransition::Already));
        assert!(repo.delete_if_unpaid(record.id).await.unwrap().is_none());
        assert!(repo.get_booking(record.id).await.unwrap().unwrap().is_paid);
        assert_eq!(repo.mark_paid(Uuid::new_v4()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_hold_conflict_leaves_map_untouched() {
        let repo = InMemoryShowRepository::new();
        let show = Show::new("m1".into(), "Dune".into(), Utc::now(), Decimal::from(200));
        repo.create_shows(&[show.clone()]).await.unwrap();

        repo.hold_seats(show.id, &[seat("A1")], "user_1").await.unwrap();
        let err = repo.hold_seats(show.id, &[seat("A1"), seat("A3")], "user_2").await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        let stored = repo.get_show(show.id).await.unwrap().unwrap();
        assert_eq!(stored.occupied_seats.occupied(), vec![seat("A1")]);
    }

    #[tokio::test]
    async fn test_release_on_missing_show_is_noop() {
        let repo = InMemoryShowRepository::new();
        assert_eq!(repo.release_seats(Uuid::new_v4(), &[seat("A1")], "user_1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_show_lock_serializes_holders() {
        let lock = InMemoryShowLock::new(Duration::from_millis(50), Duration::from_secs(30));
        let show_id = Uuid::new_v4();

        let first = lock.acquire(show_id).await.unwrap();
        assert!(matches!(lock.acquire(show_id).await, Err(LockError::Timeout(..))));

        // Other shows are independent
        let other = lock.acquire(Uuid::new_v4()).await.unwrap();
        lock.release(other).await.unwrap();

        lock.release(first).await.unwrap();
        let again = lock.acquire(show_id).await.unwrap();
        lock.release(again).await.unwrap();
        assert!(lock.leases.lock().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreleased_show_lock_lapses_after_ttl() {
        let lock = InMemoryShowLock::new(Duration::from_millis(100), Duration::from_secs(2));
        let show_id = Uuid::new_v4();

        let abandoned = lock.acquire(show_id).await.unwrap();
        assert!(matches!(lock.acquire(show_id).await, Err(LockError::Timeout(..))));

        tokio::time::advance(Duration::from_secs(3)).await;
        let taken_over = lock.acquire(show_id).await.unwrap();

        // A stale token must not free the new holder's lease
        lock.release(abandoned).await.unwrap();
        assert!(matches!(lock.acquire(show_id).await, Err(LockError::Timeout(..))));

        lock.release(taken_over).await.unwrap();
        assert!(lock.leases.lock().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_lapsed_leases_do_not_accumulate() {
        let lock = InMemoryShowLock::new(Duration::from_millis(100), Duration::from_secs(1));
        for _ in 0..5 {
            lock.acquire(Uuid::new_v4()).await.unwrap();
        }
        assert_eq!(lock.leases.lock().await.len(), 5);

        tokio::time::advance(Duration::from_secs(2)).await;
        let fresh = lock.acquire(Uuid::new_v4()).await.unwrap();
        assert_eq!(lock.leases.lock().await.len(), 1);
        lock.release(fresh).await.unwrap();
    }
}
