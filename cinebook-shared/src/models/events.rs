use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Something a user should be told about. Also the payload published on the
/// notifications topic, so the variants are tagged for JSON.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    BookingConfirmed { booking_id: Uuid },
    ShowAdded { movie_title: String },
    ShowReminder { show_id: Uuid, user_id: String },
}

impl Notification {
    /// Partition key for the queue; keeps all messages for one booking or show in order.
    pub fn key(&self) -> String {
        match self {
            Notification::BookingConfirmed { booking_id } => booking_id.to_string(),
            Notification::ShowAdded { movie_title } => movie_title.clone(),
            Notification::ShowReminder { show_id, .. } => show_id.to_string(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Notification::BookingConfirmed { .. } => "booking_confirmed",
            Notification::ShowAdded { .. } => "show_added",
            Notification::ShowReminder { .. } => "show_reminder",
        }
    }
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct QueuedNotification {
    pub id: Uuid,
    pub notification: Notification,
    pub enqueued_at: DateTime<Utc>,
}

impl QueuedNotification {
    pub fn new(notification: Notification) -> Self {
        Self {
            id: Uuid::new_v4(),
            notification,
            enqueued_at: Utc::now(),
        }
    }
}
