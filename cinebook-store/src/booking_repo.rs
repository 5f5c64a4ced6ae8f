use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use cinebook_core::repository::{BookingRepository, StoreError, StoreResult};
use cinebook_core::{BookingRecord, PaidTransition, SeatId};

use crate::database::store_error;

pub struct PgBookingRepository {
    pool: PgPool,
}

impl PgBookingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    user_id: String,
    show_id: Uuid,
    amount: Decimal,
    booked_seats: Vec<String>,
    is_paid: bool,
    payment_link: String,
    booking_token: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<BookingRow> for BookingRecord {
    type Error = StoreError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        let booked_seats = row
            .booked_seats
            .iter()
            .map(|s| s.parse::<SeatId>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::backend)?;

        Ok(BookingRecord {
            id: row.id,
            user_id: row.user_id,
            show_id: row.show_id,
            amount: row.amount,
            booked_seats,
            is_paid: row.is_paid,
            payment_link: row.payment_link,
            booking_token: row.booking_token,
            created_at: row.created_at,
        })
    }
}

fn into_records(rows: Vec<BookingRow>) -> StoreResult<Vec<BookingRecord>> {
    rows.into_iter().map(BookingRecord::try_from).collect()
}

const BOOKING_COLUMNS: &str =
    "id, user_id, show_id, amount, booked_seats, is_paid, payment_link, booking_token, created_at";

#[async_trait]
impl BookingRepository for PgBookingRepository {
    async fn create_booking(&self, booking: &BookingRecord) -> StoreResult<()> {
        let seats: Vec<String> = booking.booked_seats.iter().map(SeatId::to_string).collect();

        sqlx::query(
            r#"
            INSERT INTO bookings (id, user_id, show_id, amount, booked_seats, is_paid, payment_link, booking_token, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(booking.id)
        .bind(&booking.user_id)
        .bind(booking.show_id)
        .bind(booking.amount)
        .bind(&seats)
        .bind(booking.is_paid)
        .bind(&booking.payment_link)
        .bind(&booking.booking_token)
        .bind(booking.created_at)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(())
    }

    async fn get_booking(&self, id: Uuid) -> StoreResult<Option<BookingRecord>> {
        let row = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {} FROM bookings WHERE id = $1",
            BOOKING_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        row.map(BookingRecord::try_from).transpose()
    }

    async fn set_payment_link(&self, id: Uuid, link: &str) -> StoreResult<()> {
        let updated = sqlx::query("UPDATE bookings SET payment_link = $2 WHERE id = $1 AND is_paid = FALSE")
            .bind(id)
            .bind(link)
            .execute(&self.pool)
            .await
            .map_err(store_error)?
            .rows_affected();

        if updated == 0 {
            return Err(StoreError::NotFound(format!("unpaid booking {}", id)));
        }
        Ok(())
    }

    async fn mark_paid(&self, id: Uuid) -> StoreResult<Option<PaidTransition>> {
        let updated = sqlx::query(
            "UPDATE bookings SET is_paid = TRUE, payment_link = '' WHERE id = $1 AND is_paid = FALSE",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(store_error)?
        .rows_affected();

        if updated == 1 {
            return Ok(Some(PaidTransition::Newly));
        }

        let exists: Option<(bool,)> = sqlx::query_as("SELECT is_paid FROM bookings WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;

        Ok(exists.map(|_| PaidTransition::Already))
    }

    async fn delete_if_unpaid(&self, id: Uuid) -> StoreResult<Option<BookingRecord>> {
        let row = sqlx::query_as::<_, BookingRow>(&format!(
            "DELETE FROM bookings WHERE id = $1 AND is_paid = FALSE RETURNING {}",
            BOOKING_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        row.map(BookingRecord::try_from).transpose()
    }

    async fn find_unpaid_created_before(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<BookingRecord>> {
        let rows = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {} FROM bookings WHERE is_paid = FALSE AND created_at < $1 ORDER BY created_at",
            BOOKING_COLUMNS
        ))
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        into_records(rows)
    }

    async fn list_for_user(&self, user_id: &str) -> StoreResult<Vec<BookingRecord>> {
        let rows = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {} FROM bookings WHERE user_id = $1 ORDER BY created_at DESC",
            BOOKING_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        into_records(rows)
    }

    async fn list_all(&self) -> StoreResult<Vec<BookingRecord>> {
        let rows = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {} FROM bookings ORDER BY created_at DESC",
            BOOKING_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        into_records(rows)
    }
}
