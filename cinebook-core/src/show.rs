use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::seat::SeatMap;

/// Largest per-seat price a show may carry: 99,999,999.99, the `NUMERIC(10, 2)` ceiling.
pub const MAX_SHOW_PRICE: Decimal = Decimal::from_parts(1_410_065_407, 2, 0, false, 2);

/// One screening of a movie at a fixed time and per-seat price.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Show {
    pub id: Uuid,
    pub movie_id: String,
    pub movie_title: String,
    pub show_date_time: DateTime<Utc>,
    pub price: Decimal,
    pub occupied_seats: SeatMap,
}

impl Show {
    pub fn new(movie_id: String, movie_title: String, show_date_time: DateTime<Utc>, price: Decimal) -> Self {
        Self {
            id: Uuid::new_v4(),
            movie_id,
            movie_title,
            show_date_time,
            price,
            occupied_seats: SeatMap::new(),
        }
    }

    pub fn has_valid_price(&self) -> bool {
        is_valid_price(self.price)
    }
}

pub fn is_valid_price(price: Decimal) -> bool {
    price > Decimal::ZERO && price <= MAX_SHOW_PRICE
}
