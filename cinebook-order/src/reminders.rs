use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::info;

use cinebook_core::notify::{DispatchOutcome, Notification, NotificationDispatcher};
use cinebook_core::repository::{ShowRepository, StoreResult};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReminderReport {
    pub shows: usize,
    pub sent: usize,
    pub failed: usize,
}

/// Finds shows starting roughly `lead` from now and reminds everyone holding a seat.
///
/// Meant to run every `window`; each run covers `(now + lead - window, now + lead]`.
pub struct ReminderScanner {
    shows: Arc<dyn ShowRepository>,
    dispatcher: Arc<NotificationDispatcher>,
    lead: Duration,
    window: Duration,
}

impl ReminderScanner {
    pub fn new(
        shows: Arc<dyn ShowRepository>,
        dispatcher: Arc<NotificationDispatcher>,
        lead: Duration,
        window: Duration,
    ) -> Self {
        Self {
            shows,
            dispatcher,
            lead,
            window,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub async fn scan(&self, now: DateTime<Utc>) -> StoreResult<ReminderReport> {
        let to = now + self.lead;
        let from = to - self.window;
        let shows = self.shows.shows_starting_between(from, to).await?;

        let mut report = ReminderReport {
            shows: shows.len(),
            ..ReminderReport::default()
        };

        for show in &shows {
            for user_id in show.occupied_seats.holders() {
                let notification = Notification::ShowReminder {
                    show_id: show.id,
                    user_id,
                };
                match self.dispatcher.dispatch(&notification).await {
                    DispatchOutcome::Delivered { .. } => report.sent += 1,
                    _ => report.failed += 1,
                }
            }
        }

        if report.shows > 0 {
            info!(
                shows = report.shows,
                sent = report.sent,
                failed = report.failed,
                "Sent reminders"
            );
        }
        Ok(report)
    }
}
