use chrono::Utc;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::message::Message;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use cinebook_core::notify::{Delivery, DeliveryStrategy};
use cinebook_order::{DirectDelivery, ExpirationReaper, ReminderScanner};
use cinebook_shared::QueuedNotification;

/// Releases unpaid bookings past their hold, on a fixed interval. Catches
/// whatever the per-booking delayed checks missed, e.g. across a restart.
/// Expiries are counted by the reaper's observer, not here.
pub async fn run_expiry_sweep(reaper: Arc<ExpirationReaper>, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(interval_secs = every.as_secs(), "Expiry sweep started");

    loop {
        ticker.tick().await;
        if let Err(e) = reaper.sweep(Utc::now()).await {
            error!("Expiry sweep failed: {}", e);
        }
    }
}

pub async fn run_reminder_scan(scanner: Arc<ReminderScanner>) {
    let every = scanner.window().to_std().unwrap_or(Duration::from_secs(600));
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(interval_secs = every.as_secs(), "Reminder scan started");

    loop {
        ticker.tick().await;
        match scanner.scan(Utc::now()).await {
            Ok(report) if report.shows > 0 => info!(
                shows = report.shows,
                sent = report.sent,
                failed = report.failed,
                "Reminder scan finished"
            ),
            Ok(_) => {}
            Err(e) => error!("Reminder scan failed: {}", e),
        }
    }
}

/// Consumes queued notifications and sends them directly.
pub async fn start_notification_worker(
    brokers: String,
    group_id: String,
    topic: String,
    direct: Arc<DirectDelivery>,
) -> Result<(), KafkaError> {
    let consumer: StreamConsumer = ClientConfig::new()
        .set("bootstrap.servers", &brokers)
        .set("group.id", &group_id)
        .set("enable.auto.commit", "true")
        .set("auto.offset.reset", "earliest")
        .create()?;

    consumer.subscribe(&[topic.as_str()])?;

    info!(%topic, "Notification worker started");

    loop {
        match consumer.recv().await {
            Err(e) => error!("Kafka error: {}", e),
            Ok(m) => {
                let Some(payload) = m.payload() else {
                    continue;
                };
                let queued = match serde_json::from_slice::<QueuedNotification>(payload) {
                    Ok(queued) => queued,
                    Err(e) => {
                        warn!("Skipping unreadable notification: {}", e);
                        continue;
                    }
                };

                match direct.deliver(&queued.notification).await {
                    Ok(Delivery::Sent) => {
                        info!(id = %queued.id, kind = queued.notification.kind(), "Queued notification sent")
                    }
                    Ok(Delivery::Declined(reason)) => {
                        info!(id = %queued.id, kind = queued.notification.kind(), %reason, "Queued notification declined")
                    }
                    Err(e) => {
                        error!(id = %queued.id, kind = queued.notification.kind(), error = %e, "Queued notification failed")
                    }
                }
            }
        }
    }
}
