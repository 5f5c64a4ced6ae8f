use std::sync::Arc;
use uuid::Uuid;

use crate::repository::{ShowRepository, StoreResult};
use crate::seat::SeatId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Availability {
    Available,
    /// Requested seats that are already held.
    Unavailable(Vec<SeatId>),
    ShowMissing,
}

/// Checks a requested seat set against the show's current seat map. Read only.
pub struct AvailabilityChecker {
    shows: Arc<dyn ShowRepository>,
}

impl AvailabilityChecker {
    pub fn new(shows: Arc<dyn ShowRepository>) -> Self {
        Self { shows }
    }

    pub async fn check(&self, show_id: Uuid, seats: &[SeatId]) -> StoreResult<Availability> {
        let show = match self.shows.get_show(show_id).await? {
            Some(show) => show,
            None => return Ok(Availability::ShowMissing),
        };

        let taken = show.occupied_seats.conflicts(seats);
        if taken.is_empty() {
            Ok(Availability::Available)
        } else {
            Ok(Availability::Unavailable(taken))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::StoreError;
    use crate::show::Show;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use rust_decimal::Decimal;

    struct OneShow(Show);

    #[async_trait]
    impl ShowRepository for OneShow {
        async fn get_show(&self, id: Uuid) -> StoreResult<Option<Show>> {
            Ok((id == self.0.id).then(|| self.0.clone()))
        }
        async fn create_shows(&self, _shows: &[Show]) -> StoreResult<()> {
            Ok(())
        }
        async fn upcoming_shows(&self, _now: DateTime<Utc>) -> StoreResult<Vec<Show>> {
            Ok(vec![self.0.clone()])
        }
        async fn hold_seats(&self, _show_id: Uuid, _seats: &[SeatId], _user_id: &str) -> StoreResult<()> {
            Err(StoreError::Conflict("read only".into()))
        }
        async fn release_seats(&self, _show_id: Uuid, _seats: &[SeatId], _holder: &str) -> StoreResult<usize> {
            Ok(0)
        }
        async fn shows_starting_between(&self, _from: DateTime<Utc>, _to: DateTime<Utc>) -> StoreResult<Vec<Show>> {
            Ok(vec![])
        }
    }

    fn seat(s: &str) -> SeatId {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_check_against_seat_map() {
        let mut show = Show::new("m1".into(), "Dune".into(), Utc::now(), Decimal::from(200));
        show.occupied_seats.hold(&[seat("A1")], "user_1").unwrap();
        let show_id = show.id;
        let checker = AvailabilityChecker::new(Arc::new(OneShow(show)));

        assert_eq!(
            checker.check(show_id, &[seat("A2"), seat("A3")]).await.unwrap(),
            Availability::Available
        );
        assert_eq!(
            checker.check(show_id, &[seat("A1"), seat("A3")]).await.unwrap(),
            Availability::Unavailable(vec![seat("A1")])
        );
        assert_eq!(
            checker.check(Uuid::new_v4(), &[seat("A1")]).await.unwrap(),
            Availability::ShowMissing
        );
    }
}
