//! Payment orchestration service.
//!
//! Coordinates the aggregate, the event store, the broker publisher, the
//! read model, and the upstream order catalog to implement the create and
//! pay use cases. Append and publish form one logical unit: when the append
//! fails the publish never happens, and in-memory state only changes after
//! the corresponding event is durably appended.

use std::sync::Arc;

use payflow_core::aggregate::AggregateRoot;
use payflow_core::clock::Clock;
use payflow_core::error::DomainError;
use payflow_core::event::{DomainEvent, EventMetadata};
use payflow_core::publisher::EventPublisher;
use payflow_core::repository::{EventRepository, StoredEvent};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::aggregates::{Payment, PaymentStatus, PaymentType};
use crate::domain::events::{PaymentEvent, PaymentEventKind};
use crate::domain::repository::PaymentRepository;
use crate::domain::strategy::ResolvePayment;

use super::orders::{OrderCatalog, OrderItem, OrderItemStatus};

/// Request to create a payment for a set of upstream order items.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePaymentRequest {
    /// The order items the payment covers.
    pub item_ids: Vec<Uuid>,
    /// The payment method chosen at creation.
    pub payment_type: PaymentType,
}

/// Projection of a payment returned to API callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentView {
    /// The payment identifier.
    pub id: Uuid,
    /// The order items the payment covers.
    pub item_ids: Vec<Uuid>,
    /// Current payment method.
    pub payment_type: PaymentType,
    /// Current lifecycle status.
    pub status: PaymentStatus,
    /// Total price.
    pub price: Decimal,
}

impl From<&Payment> for PaymentView {
    fn from(payment: &Payment) -> Self {
        Self {
            id: payment.id,
            item_ids: payment.item_ids.clone(),
            payment_type: payment.payment_type,
            status: payment.status,
            price: payment.price,
        }
    }
}

/// Coordinates payment use cases. Exclusively owns lifecycle transitions;
/// consumers translate and deduplicate but never bypass these rules.
pub struct PaymentService {
    payments: Arc<dyn PaymentRepository>,
    events: Arc<dyn EventRepository>,
    publisher: Arc<dyn EventPublisher>,
    catalog: Arc<dyn OrderCatalog>,
    resolver: Arc<dyn ResolvePayment>,
    clock: Arc<dyn Clock>,
}

impl PaymentService {
    /// Wires the service to its collaborators.
    #[must_use]
    pub fn new(
        payments: Arc<dyn PaymentRepository>,
        events: Arc<dyn EventRepository>,
        publisher: Arc<dyn EventPublisher>,
        catalog: Arc<dyn OrderCatalog>,
        resolver: Arc<dyn ResolvePayment>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            payments,
            events,
            publisher,
            catalog,
            resolver,
            clock,
        }
    }

    /// Creates a Pending payment over the requested order items.
    ///
    /// Prices come from the upstream catalog, never from the caller. Exactly
    /// one `PaymentCreated` event is appended (at expected version 0) and
    /// one message published, both carrying `correlation_id`.
    ///
    /// # Errors
    ///
    /// `Validation` for malformed item sets or already-owned items,
    /// `NotFound` for unknown items, plus infrastructure errors.
    pub async fn create_payment(
        &self,
        request: CreatePaymentRequest,
        correlation_id: Uuid,
    ) -> Result<PaymentView, DomainError> {
        Payment::validate_item_ids(&request.item_ids)?;

        let mut items = Vec::with_capacity(request.item_ids.len());
        for item_id in &request.item_ids {
            let item = self
                .catalog
                .item(*item_id)
                .await?
                .ok_or(DomainError::NotFound(*item_id))?;
            if item.status == OrderItemStatus::Owned {
                return Err(DomainError::Validation(format!(
                    "order item {item_id} is already owned and not pending payment"
                )));
            }
            items.push(item);
        }
        let total = item_total(&items);

        let mut payment = Payment::create(
            request.item_ids,
            request.payment_type,
            total,
            correlation_id,
            self.clock.as_ref(),
        )?;

        let stored: Vec<StoredEvent> = payment
            .uncommitted_events()
            .iter()
            .map(PaymentEvent::to_stored)
            .collect();
        let wire_bodies: Vec<serde_json::Value> = payment
            .uncommitted_events()
            .iter()
            .map(|event| event.kind.wire_body())
            .collect();

        self.events.append_events(payment.id, 0, &stored).await?;

        for (event, body) in payment.uncommitted_events().to_vec().iter().zip(wire_bodies) {
            self.publisher
                .publish(event.event_type(), &body, payment.id, correlation_id)
                .await?;
            payment.apply(event);
        }
        payment.clear_uncommitted_events();

        tracing::info!(
            payment_id = %payment.id,
            correlation_id = %correlation_id,
            price = %payment.price,
            "payment created"
        );
        Ok(PaymentView::from(&payment))
    }

    /// Executes a settlement attempt for an existing payment.
    ///
    /// The stored price is re-checked against the authoritative item prices
    /// before execution; the outcome event (`Approved` or `Failed`) is
    /// appended at the current stream version and published. A declined
    /// capability surfaces as `PaymentDeclined` only after the Failed event
    /// is durably recorded.
    ///
    /// # Errors
    ///
    /// `NotFound` when the payment or its items are gone, `AlreadyProcessed`
    /// for an Approved payment, `Validation` on price drift,
    /// `PaymentDeclined` on a declined settlement, `VersionConflict` when a
    /// concurrent attempt won the append.
    pub async fn pay_order(
        &self,
        payment_id: Uuid,
        payment_type: PaymentType,
        correlation_id: Uuid,
    ) -> Result<PaymentView, DomainError> {
        let row = self
            .payments
            .get(payment_id)
            .await?
            .ok_or(DomainError::NotFound(payment_id))?;
        if row.status == PaymentStatus::Approved {
            return Err(DomainError::AlreadyProcessed(payment_id));
        }

        let items = self.catalog.items_for_payment(payment_id).await?;
        if items.is_empty() {
            return Err(DomainError::NotFound(payment_id));
        }
        let total = item_total(&items);
        if total != row.price {
            return Err(DomainError::Validation(format!(
                "payment {payment_id} price {} does not match the current item total {total}",
                row.price
            )));
        }

        // The event log leads the read model: replaying the stream catches an
        // approval the projection has not caught up with yet.
        let history = self.events.load_events(payment_id).await?;
        let mut payment = reconstitute(row, &history)?;
        if payment.status == PaymentStatus::Approved {
            return Err(DomainError::AlreadyProcessed(payment_id));
        }

        let processor = self.resolver.resolve(payment_type);
        let approved = processor.pay(&payment).await?;

        payment.process(payment_type, approved, correlation_id, self.clock.as_ref())?;
        let stored: Vec<StoredEvent> = payment
            .uncommitted_events()
            .iter()
            .map(PaymentEvent::to_stored)
            .collect();
        self.events
            .append_events(payment_id, payment.version(), &stored)
            .await?;

        for event in payment.uncommitted_events().to_vec() {
            self.publisher
                .publish(
                    event.event_type(),
                    &event.kind.wire_body(),
                    payment_id,
                    correlation_id,
                )
                .await?;
            payment.apply(&event);
        }
        payment.clear_uncommitted_events();

        if approved {
            tracing::info!(
                payment_id = %payment_id,
                correlation_id = %correlation_id,
                processor = processor.name(),
                "payment approved"
            );
            Ok(PaymentView::from(&payment))
        } else {
            tracing::warn!(
                payment_id = %payment_id,
                correlation_id = %correlation_id,
                processor = processor.name(),
                "payment declined"
            );
            Err(DomainError::PaymentDeclined(payment_id))
        }
    }

    /// Fetches a payment projection by identifier.
    ///
    /// # Errors
    ///
    /// `NotFound` when no such payment exists.
    pub async fn get_payment(&self, payment_id: Uuid) -> Result<PaymentView, DomainError> {
        let payment = self
            .payments
            .get(payment_id)
            .await?
            .ok_or(DomainError::NotFound(payment_id))?;
        Ok(PaymentView::from(&payment))
    }

    /// All payments currently in the given status.
    ///
    /// # Errors
    ///
    /// Propagates read-model infrastructure errors.
    pub async fn payments_with_status(
        &self,
        status: PaymentStatus,
    ) -> Result<Vec<PaymentView>, DomainError> {
        let payments = self.payments.with_status(status).await?;
        Ok(payments.iter().map(PaymentView::from).collect())
    }

    /// All payments.
    ///
    /// # Errors
    ///
    /// Propagates read-model infrastructure errors.
    pub async fn all_payments(&self) -> Result<Vec<PaymentView>, DomainError> {
        let payments = self.payments.all().await?;
        Ok(payments.iter().map(PaymentView::from).collect())
    }
}

fn item_total(items: &[OrderItem]) -> Decimal {
    items
        .iter()
        .map(|item| item.price_paid.unwrap_or(Decimal::ZERO))
        .sum()
}

/// Replays the stored stream over the read-model row. Where the stream has
/// events they are authoritative; a row created through the simplified
/// order-created path may legitimately have an empty stream.
fn reconstitute(row: Payment, history: &[StoredEvent]) -> Result<Payment, DomainError> {
    let mut payment = Payment::from_parts(
        row.id,
        row.item_ids.clone(),
        row.payment_type,
        row.status,
        row.price,
        row.last_changed_at,
        0,
    );
    for stored in history {
        let kind: PaymentEventKind = serde_json::from_value(stored.payload.clone())
            .map_err(|e| DomainError::Infrastructure(format!("event deserialization failed: {e}")))?;
        let event = PaymentEvent {
            metadata: EventMetadata {
                event_id: stored.event_id,
                event_type: stored.event_type.clone(),
                aggregate_id: stored.aggregate_id,
                sequence_number: stored.sequence_number,
                correlation_id: stored.correlation_id,
                causation_id: stored.causation_id,
                occurred_at: stored.occurred_at,
            },
            kind,
        };
        payment.apply(&event);
    }
    Ok(payment)
}
