pub mod schedule;
pub mod service;

pub use schedule::{AddShowsRequest, ScheduledShows, ShowSlotInput};
pub use service::{MovieShowtimes, ShowCatalog, Showtime};

use cinebook_core::repository::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Catalog store failed: {0}")]
    Store(#[from] StoreError),
}
