use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::seat::SeatId;

/// Hard ceiling on seats per booking.
pub const MAX_SEATS_PER_BOOKING: usize = 10;

const BASE36: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const TOKEN_SUFFIX_LEN: usize = 6;

/// A reservation of seats on one show.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BookingRecord {
    pub id: Uuid,
    pub user_id: String,
    pub show_id: Uuid,
    pub amount: Decimal,
    pub booked_seats: Vec<SeatId>,
    pub is_paid: bool,
    pub payment_link: String,
    pub booking_token: String,
    pub created_at: DateTime<Utc>,
}

impl BookingRecord {
    pub fn new(
        user_id: String,
        show_id: Uuid,
        amount: Decimal,
        booked_seats: Vec<SeatId>,
        booking_token: String,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            show_id,
            amount,
            booked_seats,
            is_paid: false,
            payment_link: String::new(),
            booking_token,
            created_at,
        }
    }

    /// Seats in ascending order, for display.
    pub fn sorted_seats(&self) -> Vec<SeatId> {
        let mut seats = self.booked_seats.clone();
        seats.sort();
        seats
    }

    pub fn is_older_than(&self, cutoff: DateTime<Utc>) -> bool {
        self.created_at < cutoff
    }
}

/// Outcome of marking a booking paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaidTransition {
    /// The booking moved from unpaid to paid just now.
    Newly,
    /// It was already paid; nothing changed.
    Already,
}

/// `price * seats`, fixed to two decimal places. `None` when the product overflows.
pub fn booking_amount(price: Decimal, seat_count: usize) -> Option<Decimal> {
    let mut amount = price.checked_mul(Decimal::from(seat_count as u64))?.round_dp(2);
    amount.rescale(2);
    Some(amount)
}

/// Builds a human-readable confirmation token: `BK-<millis base36>-<6 random base36>`.
pub fn generate_booking_token(now: DateTime<Utc>) -> String {
    let millis = now.timestamp_millis().max(0) as u64;
    let mut rng = rand::thread_rng();
    let suffix: String = (0..TOKEN_SUFFIX_LEN)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();
    format!("BK-{}-{}", to_base36(millis), suffix)
}

fn to_base36(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while value > 0 {
        digits.push(BASE36[(value % 36) as usize]);
        value /= 36;
    }
    digits.reverse();
    String::from_utf8_lossy(&digits).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::HashSet;
    use std::str::FromStr;

    #[test]
    fn test_amount_is_exact_to_two_places() {
        let amount = booking_amount(Decimal::from(200), 2).unwrap();
        assert_eq!(amount.to_string(), "400.00");

        let amount = booking_amount(Decimal::from_str("149.99").unwrap(), 3).unwrap();
        assert_eq!(amount.to_string(), "449.97");
    }

    #[test]
    fn test_amount_overflow_is_none() {
        assert_eq!(booking_amount(Decimal::MAX, 2), None);
        assert_eq!(
            booking_amount(Decimal::from_str("99999999.99").unwrap(), 10).unwrap().to_string(),
            "999999999.90"
        );
    }

    #[test]
    fn test_token_format() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let token = generate_booking_token(now);
        let parts: Vec<&str> = token.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "BK");
        assert_eq!(parts[1], to_base36(now.timestamp_millis() as u64));
        assert_eq!(parts[2].len(), TOKEN_SUFFIX_LEN);
        assert!(parts[2].chars().all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
    }

    #[test]
    fn test_tokens_do_not_repeat() {
        let now = Utc::now();
        let tokens: HashSet<String> = (0..200).map(|_| generate_booking_token(now)).collect();
        assert_eq!(tokens.len(), 200);
    }

    #[test]
    fn test_base36() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "Z");
        assert_eq!(to_base36(36), "10");
    }
}
