//! Kafka-backed implementation of the `EventPublisher` trait.

use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use uuid::Uuid;

use payflow_core::error::DomainError;
use payflow_core::publisher::EventPublisher;

use crate::message::{CORRELATION_ID_HEADER, SUBJECT_HEADER};

/// Publishes domain events to a single Kafka-compatible topic.
///
/// The aggregate id is the partition key, which keeps each aggregate's
/// events in order; the subject and correlation id travel as headers so
/// consumers can route and trace without touching the body.
pub struct KafkaEventPublisher {
    producer: FutureProducer,
    topic: String,
    timeout: Duration,
}

impl KafkaEventPublisher {
    /// Creates a publisher for the given brokers and topic.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::Transport`] when the producer cannot be
    /// created from the configuration.
    pub fn new(brokers: &str, topic: impl Into<String>) -> Result<Self, DomainError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .set("acks", "all")
            .create()
            .map_err(|e| DomainError::Transport(format!("failed to create producer: {e}")))?;

        Ok(Self {
            producer,
            topic: topic.into(),
            timeout: Duration::from_secs(5),
        })
    }
}

#[async_trait]
impl EventPublisher for KafkaEventPublisher {
    async fn publish(
        &self,
        subject: &str,
        payload: &serde_json::Value,
        aggregate_id: Uuid,
        correlation_id: Uuid,
    ) -> Result<(), DomainError> {
        let body = serde_json::to_vec(payload)
            .map_err(|e| DomainError::Transport(format!("failed to serialize payload: {e}")))?;
        let key = aggregate_id.to_string();
        let correlation = correlation_id.to_string();

        let headers = OwnedHeaders::new()
            .insert(Header {
                key: SUBJECT_HEADER,
                value: Some(subject),
            })
            .insert(Header {
                key: CORRELATION_ID_HEADER,
                value: Some(correlation.as_str()),
            });

        let record = FutureRecord::to(&self.topic)
            .payload(&body)
            .key(&key)
            .headers(headers);

        match self
            .producer
            .send(record, Timeout::After(self.timeout))
            .await
        {
            Ok((partition, offset)) => {
                tracing::debug!(
                    topic = %self.topic,
                    subject = %subject,
                    aggregate_id = %aggregate_id,
                    correlation_id = %correlation_id,
                    partition,
                    offset,
                    "event published"
                );
                Ok(())
            }
            Err((kafka_error, _)) => {
                tracing::error!(
                    topic = %self.topic,
                    subject = %subject,
                    aggregate_id = %aggregate_id,
                    error = %kafka_error,
                    "failed to publish event"
                );
                Err(DomainError::Transport(kafka_error.to_string()))
            }
        }
    }
}
