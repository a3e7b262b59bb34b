use rdkafka::config::ClientConfig;
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use serde::Serialize;
use std::time::Duration;
use tourdesk_shared::models::events::{BookingConfirmedEvent, BookingCreatedEvent};
use tracing::{error, info};

pub const BOOKING_CREATED_TOPIC: &str = "booking.created";
pub const BOOKING_CONFIRMED_TOPIC: &str = "booking.confirmed";

/// An event with a fixed topic, partitioned by booking number so a booking's
/// events stay ordered.
pub trait BookingEvent: Serialize {
    const TOPIC: &'static str;

    fn key(&self) -> &str;
}

impl BookingEvent for BookingCreatedEvent {
    const TOPIC: &'static str = BOOKING_CREATED_TOPIC;

    fn key(&self) -> &str {
        &self.booking_number
    }
}

impl BookingEvent for BookingConfirmedEvent {
    const TOPIC: &'static str = BOOKING_CONFIRMED_TOPIC;

    fn key(&self) -> &str {
        &self.booking_number
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Kafka delivery failed: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),
}

fn encode<E: BookingEvent>(event: &E) -> Result<String, PublishError> {
    Ok(serde_json::to_string(event)?)
}

#[derive(Clone)]
pub struct EventProducer {
    producer: FutureProducer,
}

impl EventProducer {
    pub fn new(brokers: &str) -> Result<Self, rdkafka::error::KafkaError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .set("enable.idempotence", "true")
            .create()?;

        Ok(Self { producer })
    }

    pub async fn publish<E: BookingEvent>(&self, event: &E) -> Result<(), PublishError> {
        let payload = encode(event)?;
        let headers = OwnedHeaders::new().insert(Header {
            key: "event_type",
            value: Some(E::TOPIC),
        });
        let record = FutureRecord::to(E::TOPIC)
            .key(event.key())
            .payload(&payload)
            .headers(headers);

        match self.producer.send(record, Timeout::After(Duration::ZERO)).await {
            Ok(delivery) => {
                info!(
                    "Published {} for {}: partition {} offset {}",
                    E::TOPIC,
                    event.key(),
                    delivery.partition,
                    delivery.offset
                );
                Ok(())
            }
            Err((e, _msg)) => {
                error!("Failed to publish {} for {}: {}", E::TOPIC, event.key(), e);
                Err(e.into())
            }
        }
    }
}
