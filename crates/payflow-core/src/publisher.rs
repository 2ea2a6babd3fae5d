//! Outbound event publisher abstraction.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::DomainError;

/// Publishes domain events to the message broker.
///
/// Messages carry a JSON body, a subject tag for consumer-side routing, and
/// the correlation ID as a transport property. The aggregate ID is handed to
/// the transport as the partitioning key so events for one aggregate keep
/// their order. Delivery is at-least-once; consumers must be idempotent.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish one event under the given subject.
    async fn publish(
        &self,
        subject: &str,
        payload: &serde_json::Value,
        aggregate_id: Uuid,
        correlation_id: Uuid,
    ) -> Result<(), DomainError>;
}
