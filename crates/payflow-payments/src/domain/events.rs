//! Domain events for the Payments context.
//!
//! The event type names double as message subjects on the broker, so they
//! keep the PascalCase spelling shared with the other services.

use payflow_core::event::{DomainEvent, EventMetadata};
use payflow_core::repository::StoredEvent;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::aggregates::{PaymentStatus, PaymentType};

/// Subject of the event emitted when a payment is created.
pub const PAYMENT_CREATED_SUBJECT: &str = "PaymentCreated";
/// Subject of the event emitted when a payment attempt is executed.
pub const PAYMENT_PROCESSED_SUBJECT: &str = "PaymentProcessed";
/// Subject of the deletion fact appended when a payment is cancelled.
pub const PAYMENT_DELETED_SUBJECT: &str = "PaymentDeleted";
/// Inbound subject announcing a new upstream order.
pub const ORDER_CREATED_SUBJECT: &str = "OrderCreated";
/// Inbound subject announcing an upstream payment cancellation.
pub const PAYMENT_CANCELLED_SUBJECT: &str = "PaymentCancelledEvent";

/// Emitted when a payment is created for a set of order items.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentCreated {
    /// The payment identifier.
    pub payment_id: Uuid,
    /// The order items this payment covers.
    pub item_ids: Vec<Uuid>,
    /// The payment method chosen at creation.
    pub payment_type: PaymentType,
    /// The status at creation (always Pending).
    pub status: PaymentStatus,
    /// Sum of the authoritative item prices.
    pub price: Decimal,
}

/// Emitted when a payment attempt is executed, approved or not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentProcessed {
    /// The payment identifier.
    pub payment_id: Uuid,
    /// The payment method that was executed.
    pub payment_type: PaymentType,
    /// Approved or Failed, matching the capability result.
    pub status: PaymentStatus,
}

/// Deletion fact recorded when an upstream cancellation removes a payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentDeleted {
    /// The payment identifier.
    pub payment_id: Uuid,
}

/// Event payload variants for the Payments context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PaymentEventKind {
    /// A payment has been created.
    PaymentCreated(PaymentCreated),
    /// A payment attempt has been executed.
    PaymentProcessed(PaymentProcessed),
    /// A payment has been deleted.
    PaymentDeleted(PaymentDeleted),
}

impl PaymentEventKind {
    /// The bare payload published to the broker. The subject header already
    /// identifies the event, so the wire body carries the inner struct
    /// without the enum tag used for event-store persistence.
    #[must_use]
    pub fn wire_body(&self) -> serde_json::Value {
        // Serialization of derived Serialize types to Value is infallible.
        match self {
            Self::PaymentCreated(payload) => serde_json::to_value(payload),
            Self::PaymentProcessed(payload) => serde_json::to_value(payload),
            Self::PaymentDeleted(payload) => serde_json::to_value(payload),
        }
        .expect("payment event payload serialization is infallible")
    }
}

/// Domain event envelope for the Payments context.
#[derive(Debug, Clone)]
pub struct PaymentEvent {
    /// Event metadata.
    pub metadata: EventMetadata,
    /// Event-specific payload.
    pub kind: PaymentEventKind,
}

impl PaymentEvent {
    /// Converts the event into its event-store representation.
    #[must_use]
    pub fn to_stored(&self) -> StoredEvent {
        StoredEvent {
            event_id: self.metadata.event_id,
            aggregate_id: self.metadata.aggregate_id,
            event_type: self.event_type().to_owned(),
            payload: self.to_payload(),
            sequence_number: self.metadata.sequence_number,
            correlation_id: self.metadata.correlation_id,
            causation_id: self.metadata.causation_id,
            occurred_at: self.metadata.occurred_at,
        }
    }
}

impl DomainEvent for PaymentEvent {
    fn event_type(&self) -> &'static str {
        match &self.kind {
            PaymentEventKind::PaymentCreated(_) => PAYMENT_CREATED_SUBJECT,
            PaymentEventKind::PaymentProcessed(_) => PAYMENT_PROCESSED_SUBJECT,
            PaymentEventKind::PaymentDeleted(_) => PAYMENT_DELETED_SUBJECT,
        }
    }

    fn to_payload(&self) -> serde_json::Value {
        // Serialization of derived Serialize types to Value is infallible.
        serde_json::to_value(&self.kind).expect("PaymentEventKind serialization is infallible")
    }

    fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }
}
