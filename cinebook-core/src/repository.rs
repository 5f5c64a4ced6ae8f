use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use uuid::Uuid;

use crate::booking::{BookingRecord, PaidTransition};
use crate::seat::SeatId;
use crate::show::Show;
use crate::user::User;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Conflicting record: {0}")]
    Conflict(String),

    #[error("Storage backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    pub fn backend<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        StoreError::Backend(Box::new(err))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Repository trait for shows and their seat maps
#[async_trait]
pub trait ShowRepository: Send + Sync {
    async fn get_show(&self, id: Uuid) -> StoreResult<Option<Show>>;

    async fn create_shows(&self, shows: &[Show]) -> StoreResult<()>;

    /// Shows starting at or after `now`, earliest first.
    async fn upcoming_shows(&self, now: DateTime<Utc>) -> StoreResult<Vec<Show>>;

    /// Marks every seat as held by `user_id`. Fails with `Conflict` if any is already held.
    async fn hold_seats(&self, show_id: Uuid, seats: &[SeatId], user_id: &str) -> StoreResult<()>;

    /// Frees the seats still held by `holder`. A missing show releases nothing.
    async fn release_seats(&self, show_id: Uuid, seats: &[SeatId], holder: &str) -> StoreResult<usize>;

    /// Shows whose start time lies in `(from, to]`, so back-to-back windows never overlap.
    async fn shows_starting_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<Show>>;
}

/// Repository trait for booking records
#[async_trait]
pub trait BookingRepository: Send + Sync {
    /// Inserts a new record. Fails with `Conflict` when the token is already taken.
    async fn create_booking(&self, booking: &BookingRecord) -> StoreResult<()>;

    async fn get_booking(&self, id: Uuid) -> StoreResult<Option<BookingRecord>>;

    async fn set_payment_link(&self, id: Uuid, link: &str) -> StoreResult<()>;

    /// Flags the booking paid and clears its payment link. `None` if it no longer exists.
    async fn mark_paid(&self, id: Uuid) -> StoreResult<Option<PaidTransition>>;

    /// Deletes the booking only while it is unpaid, returning what was deleted.
    async fn delete_if_unpaid(&self, id: Uuid) -> StoreResult<Option<BookingRecord>>;

    async fn find_unpaid_created_before(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<BookingRecord>>;

    /// A user's bookings, newest first.
    async fn list_for_user(&self, user_id: &str) -> StoreResult<Vec<BookingRecord>>;

    /// Every booking, newest first.
    async fn list_all(&self) -> StoreResult<Vec<BookingRecord>>;
}

/// Read access to users mirrored from the identity provider
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get_user(&self, id: &str) -> StoreResult<Option<User>>;

    async fn users_by_ids(&self, ids: &[String]) -> StoreResult<Vec<User>>;

    async fn list_users(&self) -> StoreResult<Vec<User>>;

    async fn upsert_user(&self, user: &User) -> StoreResult<()>;
}

/// Proof of holding a show lock; hand it back to release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockToken {
    pub show_id: Uuid,
    pub token: String,
}

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("Timed out after {0:?} waiting for show {1}")]
    Timeout(Duration, Uuid),

    #[error("Lock backend error: {0}")]
    Backend(String),
}

/// Per-show mutual exclusion around seat-map read/modify/write sequences.
#[async_trait]
pub trait ShowLock: Send + Sync {
    async fn acquire(&self, show_id: Uuid) -> Result<LockToken, LockError>;

    async fn release(&self, token: LockToken) -> Result<(), LockError>;
}
