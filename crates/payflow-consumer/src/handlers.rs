//! Idempotent message handlers.
//!
//! Every handler tolerates redelivery: it re-reads current state before
//! mutating anything and turns confirmed duplicates into no-ops. These are
//! plain functions over the repository traits so the logic tests without a
//! database or broker.

use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use payflow_core::clock::Clock;
use payflow_core::error::DomainError;
use payflow_core::event::EventMetadata;
use payflow_core::repository::EventRepository;
use payflow_payments::domain::aggregates::{Payment, PaymentType};
use payflow_payments::domain::events::{
    PAYMENT_DELETED_SUBJECT, PaymentCreated, PaymentDeleted, PaymentEvent, PaymentEventKind,
    PaymentProcessed,
};
use payflow_payments::domain::repository::PaymentRepository;

/// Upstream order payload announcing an order item awaiting payment.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderCreatedPayload {
    /// The order item to pay for; doubles as the payment identifier so
    /// redelivery maps onto the same aggregate.
    pub item_id: Uuid,
    /// The payment method the buyer chose at checkout.
    pub payment_type: PaymentType,
    /// The price the upstream charged for the item.
    pub price_paid: Option<Decimal>,
}

/// Creates a Pending payment for a new upstream order.
///
/// The payment id is the upstream item id, so a redelivered message finds
/// the existing row and becomes a no-op.
///
/// # Errors
///
/// `Validation` when the payload has no positive price, plus repository
/// errors.
pub async fn apply_order_created(
    payments: &dyn PaymentRepository,
    payload: OrderCreatedPayload,
    correlation_id: Uuid,
    clock: &dyn Clock,
) -> Result<(), DomainError> {
    if payments.get(payload.item_id).await?.is_some() {
        tracing::debug!(
            payment_id = %payload.item_id,
            correlation_id = %correlation_id,
            "payment already exists for order item, skipping"
        );
        return Ok(());
    }

    let price = payload.price_paid.ok_or_else(|| {
        DomainError::Validation(format!(
            "order item {} carries no price to pay",
            payload.item_id
        ))
    })?;
    let payment = Payment::create_with_id(
        payload.item_id,
        vec![payload.item_id],
        payload.payment_type,
        price,
        correlation_id,
        clock,
    )?;
    payments.add(&payment).await?;

    tracing::info!(
        payment_id = %payment.id,
        correlation_id = %correlation_id,
        price = %payment.price,
        "payment created from upstream order"
    );
    Ok(())
}

/// Projects a `PaymentCreated` event into the read model.
///
/// # Errors
///
/// Propagates repository errors; an existing row is a confirmed duplicate
/// and succeeds without side effects.
pub async fn apply_payment_created(
    payments: &dyn PaymentRepository,
    payload: PaymentCreated,
    clock: &dyn Clock,
) -> Result<(), DomainError> {
    if payments.get(payload.payment_id).await?.is_some() {
        tracing::debug!(payment_id = %payload.payment_id, "payment row already projected");
        return Ok(());
    }

    let payment = Payment::from_parts(
        payload.payment_id,
        payload.item_ids,
        payload.payment_type,
        payload.status,
        payload.price,
        clock.now(),
        0,
    );
    payments.add(&payment).await?;
    tracing::info!(payment_id = %payment.id, "payment row projected");
    Ok(())
}

/// Overwrites the read-model status and payment type from a
/// `PaymentProcessed` event. The event is authoritative; a row already
/// matching it is a duplicate and an absent row is logged and acknowledged.
///
/// # Errors
///
/// Propagates repository errors.
pub async fn apply_payment_processed(
    payments: &dyn PaymentRepository,
    payload: PaymentProcessed,
    clock: &dyn Clock,
) -> Result<(), DomainError> {
    let Some(row) = payments.get(payload.payment_id).await? else {
        tracing::warn!(
            payment_id = %payload.payment_id,
            "processed event for unknown payment, acknowledging"
        );
        return Ok(());
    };

    if row.status == payload.status && row.payment_type == payload.payment_type {
        tracing::debug!(payment_id = %row.id, "payment row already up to date");
        return Ok(());
    }

    let updated = Payment::from_parts(
        row.id,
        row.item_ids.clone(),
        payload.payment_type,
        payload.status,
        row.price,
        clock.now(),
        0,
    );
    payments.update(&updated).await?;
    tracing::info!(
        payment_id = %row.id,
        status = payload.status.as_str(),
        "payment row updated from processed event"
    );
    Ok(())
}

/// Handles an upstream cancellation: records a `PaymentDeleted` fact at the
/// stream head, then removes the read-model row. A payment that is already
/// gone is a confirmed duplicate.
///
/// # Errors
///
/// `VersionConflict` when a concurrent writer moved the stream head first
/// (the redelivery retries against the new head), plus repository errors.
pub async fn apply_payment_cancelled(
    payments: &dyn PaymentRepository,
    events: &dyn EventRepository,
    payload: PaymentDeleted,
    correlation_id: Uuid,
    clock: &dyn Clock,
) -> Result<(), DomainError> {
    let payment_id = payload.payment_id;
    if payments.get(payment_id).await?.is_none() {
        tracing::debug!(payment_id = %payment_id, "payment already removed, skipping");
        return Ok(());
    }

    let history = events.load_events(payment_id).await?;
    let head = history.last().map_or(0, |event| event.sequence_number);
    let event = PaymentEvent {
        metadata: EventMetadata::new(
            PAYMENT_DELETED_SUBJECT,
            payment_id,
            head + 1,
            correlation_id,
            clock.now(),
        ),
        kind: PaymentEventKind::PaymentDeleted(payload),
    };
    events
        .append_events(payment_id, head, &[event.to_stored()])
        .await?;
    payments.delete(payment_id).await?;

    tracing::info!(
        payment_id = %payment_id,
        correlation_id = %correlation_id,
        "payment cancelled and removed"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use payflow_payments::domain::aggregates::PaymentStatus;
    use payflow_test_support::{FixedClock, RecordingEventRepository};
    use rust_decimal_macros::dec;
    use std::collections::HashMap;
    use std::sync::Mutex;

    fn fixed_clock() -> FixedClock {
        FixedClock(chrono::Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap())
    }

    #[derive(Debug, Default)]
    struct InMemoryPayments {
        rows: Mutex<HashMap<Uuid, Payment>>,
    }

    impl InMemoryPayments {
        fn with_payment(payment: Payment) -> Self {
            let repo = Self::default();
            repo.rows.lock().unwrap().insert(payment.id, payment);
            repo
        }

        fn row(&self, id: Uuid) -> Option<Payment> {
            self.rows.lock().unwrap().get(&id).cloned()
        }
    }

    #[async_trait]
    impl PaymentRepository for InMemoryPayments {
        async fn get(&self, payment_id: Uuid) -> Result<Option<Payment>, DomainError> {
            Ok(self.rows.lock().unwrap().get(&payment_id).cloned())
        }

        async fn add(&self, payment: &Payment) -> Result<(), DomainError> {
            self.rows.lock().unwrap().insert(payment.id, payment.clone());
            Ok(())
        }

        async fn update(&self, payment: &Payment) -> Result<(), DomainError> {
            self.rows.lock().unwrap().insert(payment.id, payment.clone());
            Ok(())
        }

        async fn delete(&self, payment_id: Uuid) -> Result<(), DomainError> {
            self.rows.lock().unwrap().remove(&payment_id);
            Ok(())
        }

        async fn with_status(&self, status: PaymentStatus) -> Result<Vec<Payment>, DomainError> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .values()
                .filter(|p| p.status == status)
                .cloned()
                .collect())
        }

        async fn all(&self) -> Result<Vec<Payment>, DomainError> {
            Ok(self.rows.lock().unwrap().values().cloned().collect())
        }
    }

    fn existing_payment(id: Uuid, status: PaymentStatus) -> Payment {
        Payment::from_parts(
            id,
            vec![Uuid::new_v4()],
            PaymentType::Pix,
            status,
            dec!(49.90),
            fixed_clock().0,
            0,
        )
    }

    #[tokio::test]
    async fn test_order_created_creates_pending_payment() {
        // Arrange
        let payments = InMemoryPayments::default();
        let item_id = Uuid::new_v4();
        let payload = OrderCreatedPayload {
            item_id,
            payment_type: PaymentType::CreditCard,
            price_paid: Some(dec!(59.90)),
        };

        // Act
        apply_order_created(&payments, payload, Uuid::new_v4(), &fixed_clock())
            .await
            .unwrap();

        // Assert
        let row = payments.row(item_id).unwrap();
        assert_eq!(row.id, item_id);
        assert_eq!(row.status, PaymentStatus::Pending);
        assert_eq!(row.price, dec!(59.90));
        assert_eq!(row.item_ids, vec![item_id]);
    }

    #[tokio::test]
    async fn test_order_created_redelivery_is_a_noop() {
        let item_id = Uuid::new_v4();
        let payments = InMemoryPayments::with_payment(existing_payment(item_id, PaymentStatus::Approved));
        let payload = OrderCreatedPayload {
            item_id,
            payment_type: PaymentType::CreditCard,
            price_paid: Some(dec!(59.90)),
        };

        apply_order_created(&payments, payload, Uuid::new_v4(), &fixed_clock())
            .await
            .unwrap();

        // The existing Approved row survives untouched.
        let row = payments.row(item_id).unwrap();
        assert_eq!(row.status, PaymentStatus::Approved);
        assert_eq!(row.price, dec!(49.90));
    }

    #[tokio::test]
    async fn test_order_created_without_price_is_a_validation_error() {
        let payments = InMemoryPayments::default();
        let payload = OrderCreatedPayload {
            item_id: Uuid::new_v4(),
            payment_type: PaymentType::Pix,
            price_paid: None,
        };

        let result = apply_order_created(&payments, payload, Uuid::new_v4(), &fixed_clock()).await;

        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[tokio::test]
    async fn test_payment_created_projects_row() {
        let payments = InMemoryPayments::default();
        let payment_id = Uuid::new_v4();
        let item_ids = vec![Uuid::new_v4(), Uuid::new_v4()];
        let payload = PaymentCreated {
            payment_id,
            item_ids: item_ids.clone(),
            payment_type: PaymentType::PayPal,
            status: PaymentStatus::Pending,
            price: dec!(120.00),
        };

        apply_payment_created(&payments, payload, &fixed_clock())
            .await
            .unwrap();

        let row = payments.row(payment_id).unwrap();
        assert_eq!(row.item_ids, item_ids);
        assert_eq!(row.price, dec!(120.00));
    }

    #[tokio::test]
    async fn test_payment_created_duplicate_keeps_existing_row() {
        let payment_id = Uuid::new_v4();
        let payments =
            InMemoryPayments::with_payment(existing_payment(payment_id, PaymentStatus::Approved));
        let payload = PaymentCreated {
            payment_id,
            item_ids: vec![Uuid::new_v4()],
            payment_type: PaymentType::PayPal,
            status: PaymentStatus::Pending,
            price: dec!(1.00),
        };

        apply_payment_created(&payments, payload, &fixed_clock())
            .await
            .unwrap();

        let row = payments.row(payment_id).unwrap();
        assert_eq!(row.status, PaymentStatus::Approved);
        assert_eq!(row.price, dec!(49.90));
    }

    #[tokio::test]
    async fn test_payment_processed_overwrites_status_and_type() {
        let payment_id = Uuid::new_v4();
        let payments =
            InMemoryPayments::with_payment(existing_payment(payment_id, PaymentStatus::Pending));
        let payload = PaymentProcessed {
            payment_id,
            payment_type: PaymentType::CreditCard,
            status: PaymentStatus::Approved,
        };

        apply_payment_processed(&payments, payload, &fixed_clock())
            .await
            .unwrap();

        let row = payments.row(payment_id).unwrap();
        assert_eq!(row.status, PaymentStatus::Approved);
        assert_eq!(row.payment_type, PaymentType::CreditCard);
    }

    #[tokio::test]
    async fn test_payment_processed_for_unknown_payment_is_acknowledged() {
        let payments = InMemoryPayments::default();
        let payload = PaymentProcessed {
            payment_id: Uuid::new_v4(),
            payment_type: PaymentType::Pix,
            status: PaymentStatus::Approved,
        };

        let result = apply_payment_processed(&payments, payload, &fixed_clock()).await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_payment_cancelled_appends_fact_and_deletes_row() {
        let payment_id = Uuid::new_v4();
        let correlation_id = Uuid::new_v4();
        let payments =
            InMemoryPayments::with_payment(existing_payment(payment_id, PaymentStatus::Pending));
        let events = RecordingEventRepository::new(Ok(Vec::new()));
        let payload = PaymentDeleted { payment_id };

        apply_payment_cancelled(&payments, &events, payload, correlation_id, &fixed_clock())
            .await
            .unwrap();

        assert!(payments.row(payment_id).is_none());
        let appended = events.appended_events();
        assert_eq!(appended.len(), 1);
        let (aggregate_id, expected_version, stored) = &appended[0];
        assert_eq!(*aggregate_id, payment_id);
        assert_eq!(*expected_version, 0);
        assert_eq!(stored[0].event_type, PAYMENT_DELETED_SUBJECT);
        assert_eq!(stored[0].sequence_number, 1);
        assert_eq!(stored[0].correlation_id, correlation_id);
    }

    #[tokio::test]
    async fn test_payment_cancelled_appends_after_existing_history() {
        let payment_id = Uuid::new_v4();
        let payments =
            InMemoryPayments::with_payment(existing_payment(payment_id, PaymentStatus::Pending));
        let history = vec![payflow_core::repository::StoredEvent {
            event_id: Uuid::new_v4(),
            aggregate_id: payment_id,
            event_type: "PaymentCreated".to_owned(),
            payload: serde_json::json!({}),
            sequence_number: 1,
            correlation_id: Uuid::new_v4(),
            causation_id: Uuid::new_v4(),
            occurred_at: fixed_clock().0,
        }];
        let events = RecordingEventRepository::new(Ok(history));
        let payload = PaymentDeleted { payment_id };

        apply_payment_cancelled(&payments, &events, payload, Uuid::new_v4(), &fixed_clock())
            .await
            .unwrap();

        let appended = events.appended_events();
        let (_, expected_version, stored) = &appended[0];
        assert_eq!(*expected_version, 1);
        assert_eq!(stored[0].sequence_number, 2);
    }

    #[tokio::test]
    async fn test_payment_cancelled_for_absent_payment_is_a_noop() {
        let payments = InMemoryPayments::default();
        let events = RecordingEventRepository::new(Ok(Vec::new()));
        let payload = PaymentDeleted {
            payment_id: Uuid::new_v4(),
        };

        apply_payment_cancelled(&payments, &events, payload, Uuid::new_v4(), &fixed_clock())
            .await
            .unwrap();

        assert!(events.appended_events().is_empty());
    }
}
