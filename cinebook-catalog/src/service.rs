use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use cinebook_core::notify::{Notification, NotificationDispatcher};
use cinebook_core::repository::ShowRepository;
use cinebook_core::{SeatId, Show};

use crate::schedule::AddShowsRequest;
use crate::CatalogError;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Showtime {
    pub show_id: Uuid,
    pub time: DateTime<Utc>,
}

/// Upcoming screenings of one movie, keyed by local calendar date.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MovieShowtimes {
    pub movie_id: String,
    pub movie_title: String,
    pub date_time: BTreeMap<String, Vec<Showtime>>,
}

/// Show scheduling and lookups.
pub struct ShowCatalog {
    shows: Arc<dyn ShowRepository>,
    dispatcher: Arc<NotificationDispatcher>,
    timezone: Tz,
}

impl ShowCatalog {
    pub fn new(shows: Arc<dyn ShowRepository>, dispatcher: Arc<NotificationDispatcher>, timezone: Tz) -> Self {
        Self {
            shows,
            dispatcher,
            timezone,
        }
    }

    /// Creates the requested shows, then announces the movie to every user.
    pub async fn add_shows(&self, request: AddShowsRequest) -> Result<Vec<Show>, CatalogError> {
        let scheduled = request.into_shows(self.timezone)?;
        self.shows.create_shows(&scheduled.shows).await?;

        info!(
            movie_id = %scheduled.movie_id,
            movie_title = %scheduled.movie_title,
            count = scheduled.shows.len(),
            "Shows added"
        );

        let dispatcher = self.dispatcher.clone();
        let notification = Notification::ShowAdded {
            movie_title: scheduled.movie_title,
        };
        tokio::spawn(async move {
            dispatcher.dispatch(&notification).await;
        });

        Ok(scheduled.shows)
    }

    pub async fn upcoming(&self, now: DateTime<Utc>) -> Result<Vec<Show>, CatalogError> {
        Ok(self.shows.upcoming_shows(now).await?)
    }

    pub async fn showtimes_for_movie(
        &self,
        movie_id: &str,
        now: DateTime<Utc>,
    ) -> Result<MovieShowtimes, CatalogError> {
        let shows: Vec<Show> = self
            .upcoming(now)
            .await?
            .into_iter()
            .filter(|s| s.movie_id == movie_id)
            .collect();

        let Some(first) = shows.first() else {
            return Err(CatalogError::NotFound("Movie not found".into()));
        };
        let movie_title = first.movie_title.clone();

        let mut date_time: BTreeMap<String, Vec<Showtime>> = BTreeMap::new();
        for show in &shows {
            let day = show
                .show_date_time
                .with_timezone(&self.timezone)
                .format("%Y-%m-%d")
                .to_string();
            date_time.entry(day).or_default().push(Showtime {
                show_id: show.id,
                time: show.show_date_time,
            });
        }

        Ok(MovieShowtimes {
            movie_id: movie_id.to_string(),
            movie_title,
            date_time,
        })
    }

    /// Seats already taken on a show, in seat order.
    pub async fn occupied_seats(&self, show_id: Uuid) -> Result<Vec<SeatId>, CatalogError> {
        let show = self
            .shows
            .get_show(show_id)
            .await?
            .ok_or_else(|| CatalogError::NotFound("Show not found".into()))?;
        Ok(show.occupied_seats.occupied())
    }
}
