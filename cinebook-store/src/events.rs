use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::time::Duration;
use tracing::{info, error};

use cinebook_core::notify::{Delivery, DeliveryStrategy, Notification, NotifyError};
use cinebook_shared::QueuedNotification;

#[derive(Clone)]
pub struct EventProducer {
    producer: FutureProducer,
}

impl EventProducer {
    pub fn new(brokers: &str) -> Result<Self, rdkafka::error::KafkaError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()?;

        Ok(Self { producer })
    }

    pub async fn publish(&self, topic: &str, key: &str, payload: &str) -> Result<(), rdkafka::error::KafkaError> {
        let record = FutureRecord::to(topic)
            .key(key)
            .payload(payload);

        match self.producer.send(record, Timeout::After(Duration::from_secs(0))).await {
            Ok(delivery) => {
                info!("Sent message to {}/{}: partition {} offset {}", topic, key, delivery.partition, delivery.offset);
                Ok(())
            }
            Err((e, _msg)) => {
                error!("Failed to send message to {}: {}", topic, e);
                Err(e)
            }
        }
    }
}

/// Hands notifications to the queue; a worker picks them up and sends mail.
pub struct QueuedDelivery {
    producer: EventProducer,
    topic: String,
}

impl QueuedDelivery {
    pub fn new(producer: EventProducer, topic: impl Into<String>) -> Self {
        Self {
            producer,
            topic: topic.into(),
        }
    }
}

#[async_trait]
impl DeliveryStrategy for QueuedDelivery {
    fn name(&self) -> &'static str {
        "queue"
    }

    async fn deliver(&self, notification: &Notification) -> Result<Delivery, NotifyError> {
        let envelope = QueuedNotification::new(notification.clone());
        let payload = serde_json::to_string(&envelope).map_err(|e| NotifyError::Queue(e.to_string()))?;

        self.producer
            .publish(&self.topic, &notification.key(), &payload)
            .await
            .map_err(|e| NotifyError::Queue(e.to_string()))?;

        Ok(Delivery::Sent)
    }
}
