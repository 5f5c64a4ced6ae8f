pub mod models;
pub mod pii;

pub use models::events::{Notification, QueuedNotification};
pub use pii::Masked;
