use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::CoreError;

const MAX_COLUMN: u16 = 99;

/// A seat on a screen: row letter followed by a column number, e.g. `A3`.
///
/// Ordering is row first, then numeric column, so `A2 < A10 < B1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SeatId {
    row: char,
    column: u16,
}

impl SeatId {
    pub fn new(row: char, column: u16) -> Result<Self, CoreError> {
        let row = row.to_ascii_uppercase();
        if !row.is_ascii_uppercase() || column == 0 || column > MAX_COLUMN {
            return Err(CoreError::InvalidSeat(format!("{}{}", row, column)));
        }
        Ok(Self { row, column })
    }
}

impl fmt::Display for SeatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.row, self.column)
    }
}

impl FromStr for SeatId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let mut chars = trimmed.chars();
        let row = chars
            .next()
            .ok_or_else(|| CoreError::InvalidSeat(s.to_string()))?;
        let digits = chars.as_str();
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(CoreError::InvalidSeat(s.to_string()));
        }
        let column: u16 = digits
            .parse()
            .map_err(|_| CoreError::InvalidSeat(s.to_string()))?;
        SeatId::new(row, column).map_err(|_| CoreError::InvalidSeat(s.to_string()))
    }
}

impl Serialize for SeatId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SeatId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Which user holds which seat for one show. A missing key means the seat is free.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeatMap {
    seats: BTreeMap<SeatId, String>,
}

impl SeatMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_held(&self, seat: &SeatId) -> bool {
        self.seats.contains_key(seat)
    }

    pub fn holder(&self, seat: &SeatId) -> Option<&str> {
        self.seats.get(seat).map(String::as_str)
    }

    /// Requested seats that somebody already holds, in seat order.
    pub fn conflicts(&self, requested: &[SeatId]) -> Vec<SeatId> {
        let mut taken: Vec<SeatId> = requested
            .iter()
            .filter(|seat| self.is_held(seat))
            .copied()
            .collect();
        taken.sort();
        taken.dedup();
        taken
    }

    /// Assigns every seat to `user_id`. Fails without mutating if any seat is taken.
    pub fn hold(&mut self, requested: &[SeatId], user_id: &str) -> Result<(), Vec<SeatId>> {
        let taken = self.conflicts(requested);
        if !taken.is_empty() {
            return Err(taken);
        }
        for seat in requested {
            self.seats.insert(*seat, user_id.to_string());
        }
        Ok(())
    }

    /// Frees the seats currently held by `holder` and returns how many were freed.
    /// Seats that are free, or held by someone else, are left alone.
    pub fn release(&mut self, seats: &[SeatId], holder: &str) -> usize {
        let mut released = 0;
        for seat in seats {
            if self.holder(seat) == Some(holder) {
                self.seats.remove(seat);
                released += 1;
            }
        }
        released
    }

    /// Held seats in ascending order.
    pub fn occupied(&self) -> Vec<SeatId> {
        self.seats.keys().copied().collect()
    }

    /// Distinct users holding at least one seat.
    pub fn holders(&self) -> Vec<String> {
        let mut users: Vec<String> = self.seats.values().cloned().collect();
        users.sort();
        users.dedup();
        users
    }

    pub fn len(&self) -> usize {
        self.seats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seats.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SeatId, &String)> {
        self.seats.iter()
    }
}

impl FromIterator<(SeatId, String)> for SeatMap {
    fn from_iter<I: IntoIterator<Item = (SeatId, String)>>(iter: I) -> Self {
        Self {
            seats: iter.into_iter().collect(),
        }
    }
}

/// Parses a list of raw seat labels, rejecting duplicates.
pub fn parse_seats(raw: &[String]) -> Result<Vec<SeatId>, CoreError> {
    let mut seats = Vec::with_capacity(raw.len());
    for label in raw {
        let seat: SeatId = label.parse()?;
        if seats.contains(&seat) {
            return Err(CoreError::DuplicateSeat(seat.to_string()));
        }
        seats.push(seat);
    }
    Ok(seats)
}
