use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use rust_decimal::Decimal;
use serde::Deserialize;

use cinebook_core::show::is_valid_price;
use cinebook_core::Show;

use crate::CatalogError;

/// One calendar day and the start times screened on it.
#[derive(Debug, Clone, Deserialize)]
pub struct ShowSlotInput {
    pub date: String,
    #[serde(default)]
    pub time: Vec<String>,
}

/// Admin request body for `POST /api/show/add`. Every field is optional so
/// validation, not deserialization, decides the error message.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddShowsRequest {
    pub movie_id: Option<String>,
    pub movie_title: Option<String>,
    pub shows_input: Option<Vec<ShowSlotInput>>,
    pub show_price: Option<Decimal>,
}

#[derive(Debug, Clone)]
pub struct ScheduledShows {
    pub movie_id: String,
    pub movie_title: String,
    pub shows: Vec<Show>,
}

impl AddShowsRequest {
    /// Validates the request and expands every (date, time) pair into a show.
    /// Dates and times are wall-clock values in `tz`.
    pub fn into_shows(self, tz: Tz) -> Result<ScheduledShows, CatalogError> {
        let movie_id = self
            .movie_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .ok_or_else(|| CatalogError::InvalidInput("Movie ID is required".into()))?;

        let slots = self.shows_input.filter(|s| !s.is_empty()).ok_or_else(|| {
            CatalogError::InvalidInput("Shows input is required and must be a non-empty array".into())
        })?;

        let price = self
            .show_price
            .filter(|p| is_valid_price(*p))
            .ok_or_else(|| CatalogError::InvalidInput("Valid show price is required".into()))?
            .round_dp(2);

        let movie_title = self
            .movie_title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| movie_id.clone());

        let mut shows = Vec::new();
        for slot in &slots {
            let date = NaiveDate::parse_from_str(slot.date.trim(), "%Y-%m-%d")
                .map_err(|_| CatalogError::InvalidInput(format!("Invalid show date: {}", slot.date)))?;
            for raw_time in &slot.time {
                let time = parse_time(raw_time)?;
                let local = tz
                    .from_local_datetime(&NaiveDateTime::new(date, time))
                    .earliest()
                    .ok_or_else(|| {
                        CatalogError::InvalidInput(format!("Show time {} {} does not exist", slot.date, raw_time))
                    })?;
                shows.push(Show::new(
                    movie_id.clone(),
                    movie_title.clone(),
                    local.with_timezone(&Utc),
                    price,
                ));
            }
        }

        if shows.is_empty() {
            return Err(CatalogError::InvalidInput(
                "Shows input is required and must be a non-empty array".into(),
            ));
        }

        Ok(ScheduledShows {
            movie_id,
            movie_title,
            shows,
        })
    }
}

fn parse_time(raw: &str) -> Result<NaiveTime, CatalogError> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .map_err(|_| CatalogError::InvalidInput(format!("Invalid show time: {}", raw)))
}
