use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use std::collections::HashMap;
use uuid::Uuid;

use cinebook_core::repository::{ShowRepository, StoreError, StoreResult};
use cinebook_core::{SeatId, SeatMap, Show};

use crate::database::store_error;

pub struct PgShowRepository {
    pool: PgPool,
}

impl PgShowRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load(&self, rows: Vec<ShowRow>) -> StoreResult<Vec<Show>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let seats = sqlx::query_as::<_, SeatRow>(
            "SELECT show_id, seat_id, user_id FROM show_seats WHERE show_id = ANY($1)",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        let mut by_show: HashMap<Uuid, Vec<(SeatId, String)>> = HashMap::new();
        for seat in seats {
            let id: SeatId = seat.seat_id.parse().map_err(StoreError::backend)?;
            by_show.entry(seat.show_id).or_default().push((id, seat.user_id));
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let occupied: SeatMap = by_show.remove(&row.id).unwrap_or_default().into_iter().collect();
                Show {
                    id: row.id,
                    movie_id: row.movie_id,
                    movie_title: row.movie_title,
                    show_date_time: row.show_date_time,
                    price: row.price,
                    occupied_seats: occupied,
                }
            })
            .collect())
    }
}

#[derive(sqlx::FromRow)]
struct ShowRow {
    id: Uuid,
    movie_id: String,
    movie_title: String,
    show_date_time: DateTime<Utc>,
    price: Decimal,
}

#[derive(sqlx::FromRow)]
struct SeatRow {
    show_id: Uuid,
    seat_id: String,
    user_id: String,
}

const SHOW_COLUMNS: &str = r#"
    SELECT s.id, s.movie_id, m.title AS movie_title, s.show_date_time, s.price
    FROM shows s
    JOIN movies m ON m.id = s.movie_id
"#;

#[async_trait]
impl ShowRepository for PgShowRepository {
    async fn get_show(&self, id: Uuid) -> StoreResult<Option<Show>> {
        let row = sqlx::query_as::<_, ShowRow>(&format!("{} WHERE s.id = $1", SHOW_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;

        match row {
            Some(row) => Ok(self.load(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn create_shows(&self, shows: &[Show]) -> StoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(store_error)?;

        for show in shows {
            sqlx::query(
                r#"
                INSERT INTO movies (id, title) VALUES ($1, $2)
                ON CONFLICT (id) DO UPDATE SET title = EXCLUDED.title
                "#,
            )
            .bind(&show.movie_id)
            .bind(&show.movie_title)
            .execute(&mut *tx)
            .await
            .map_err(store_error)?;

            sqlx::query(
                "INSERT INTO shows (id, movie_id, show_date_time, price) VALUES ($1, $2, $3, $4)",
            )
            .bind(show.id)
            .bind(&show.movie_id)
            .bind(show.show_date_time)
            .bind(show.price)
            .execute(&mut *tx)
            .await
            .map_err(store_error)?;
        }

        tx.commit().await.map_err(store_error)
    }

    async fn upcoming_shows(&self, now: DateTime<Utc>) -> StoreResult<Vec<Show>> {
        let rows = sqlx::query_as::<_, ShowRow>(&format!(
            "{} WHERE s.show_date_time >= $1 ORDER BY s.show_date_time",
            SHOW_COLUMNS
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        self.load(rows).await
    }

    async fn hold_seats(&self, show_id: Uuid, seats: &[SeatId], user_id: &str) -> StoreResult<()> {
        let labels: Vec<String> = seats.iter().map(SeatId::to_string).collect();
        let mut tx = self.pool.begin().await.map_err(store_error)?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO show_seats (show_id, seat_id, user_id)
            SELECT $1, seat, $3 FROM UNNEST($2::text[]) AS seat
            ON CONFLICT (show_id, seat_id) DO NOTHING
            "#,
        )
        .bind(show_id)
        .bind(&labels)
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .map_err(store_error)?
        .rows_affected();

        if inserted as usize != labels.len() {
            tx.rollback().await.map_err(store_error)?;
            return Err(StoreError::Conflict(format!("seats already held on show {}", show_id)));
        }

        tx.commit().await.map_err(store_error)
    }

    async fn release_seats(&self, show_id: Uuid, seats: &[SeatId], holder: &str) -> StoreResult<usize> {
        let labels: Vec<String> = seats.iter().map(SeatId::to_string).collect();
        let released = sqlx::query(
            "DELETE FROM show_seats WHERE show_id = $1 AND seat_id = ANY($2) AND user_id = $3",
        )
        .bind(show_id)
        .bind(&labels)
        .bind(holder)
        .execute(&self.pool)
        .await
        .map_err(store_error)?
        .rows_affected();

        Ok(released as usize)
    }

    async fn shows_starting_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<Show>> {
        let rows = sqlx::query_as::<_, ShowRow>(&format!(
            "{} WHERE s.show_date_time > $1 AND s.show_date_time <= $2 ORDER BY s.show_date_time",
            SHOW_COLUMNS
        ))
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        self.load(rows).await
    }
}
