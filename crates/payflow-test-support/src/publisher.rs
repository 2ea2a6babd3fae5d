//! Test publishers — mock `EventPublisher` implementations for tests.

use async_trait::async_trait;
use payflow_core::error::DomainError;
use payflow_core::publisher::EventPublisher;
use uuid::Uuid;

/// An event publisher that accepts and discards everything.
#[derive(Debug)]
pub struct NullEventPublisher;

#[async_trait]
impl EventPublisher for NullEventPublisher {
    async fn publish(
        &self,
        _subject: &str,
        _payload: &serde_json::Value,
        _aggregate_id: Uuid,
        _correlation_id: Uuid,
    ) -> Result<(), DomainError> {
        Ok(())
    }
}

/// An event publisher that always reports a transport failure. Useful for
/// testing broker-outage paths.
#[derive(Debug)]
pub struct FailingEventPublisher;

#[async_trait]
impl EventPublisher for FailingEventPublisher {
    async fn publish(
        &self,
        _subject: &str,
        _payload: &serde_json::Value,
        _aggregate_id: Uuid,
        _correlation_id: Uuid,
    ) -> Result<(), DomainError> {
        Err(DomainError::Transport("broker unreachable".into()))
    }
}
