//! The Payment aggregate root.

use payflow_core::aggregate::AggregateRoot;
use payflow_core::clock::Clock;
use payflow_core::error::DomainError;
use payflow_core::event::{DomainEvent, EventMetadata};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::str::FromStr;
use uuid::Uuid;

use super::events::{
    PAYMENT_CREATED_SUBJECT, PAYMENT_DELETED_SUBJECT, PAYMENT_PROCESSED_SUBJECT, PaymentCreated,
    PaymentDeleted, PaymentEvent, PaymentEventKind, PaymentProcessed,
};

/// The closed set of supported payment methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentType {
    /// Credit card.
    CreditCard,
    /// Debit card.
    DebitCard,
    /// PayPal.
    PayPal,
    /// Bank transfer.
    BankTransfer,
    /// Pix instant transfer.
    Pix,
    /// Zero-cost settlement (promotions, vouchers).
    Free,
}

impl PaymentType {
    /// Canonical wire/storage spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CreditCard => "CreditCard",
            Self::DebitCard => "DebitCard",
            Self::PayPal => "PayPal",
            Self::BankTransfer => "BankTransfer",
            Self::Pix => "Pix",
            Self::Free => "Free",
        }
    }
}

impl FromStr for PaymentType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CreditCard" => Ok(Self::CreditCard),
            "DebitCard" => Ok(Self::DebitCard),
            "PayPal" => Ok(Self::PayPal),
            "BankTransfer" => Ok(Self::BankTransfer),
            "Pix" => Ok(Self::Pix),
            "Free" => Ok(Self::Free),
            other => Err(DomainError::UnsupportedPaymentType(other.to_owned())),
        }
    }
}

/// Lifecycle status of a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentStatus {
    /// Created, awaiting settlement.
    Pending,
    /// Settled successfully. Terminal.
    Approved,
    /// The last settlement attempt was declined. A retry may still approve.
    Failed,
}

impl PaymentStatus {
    /// Canonical wire/storage spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Approved => "Approved",
            Self::Failed => "Failed",
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Approved" => Ok(Self::Approved),
            "Failed" => Ok(Self::Failed),
            other => Err(DomainError::Validation(format!(
                "unknown payment status: {other}"
            ))),
        }
    }
}

/// The aggregate root for a payment.
///
/// Identity is generated at creation and immutable; the price is fixed after
/// creation; status moves Pending → Approved/Failed, and a Failed payment may
/// be retried into Approved. Re-processing an Approved payment is refused.
#[derive(Debug, Clone)]
pub struct Payment {
    /// Aggregate identifier.
    pub id: Uuid,
    /// The order items this payment covers.
    pub item_ids: Vec<Uuid>,
    /// Current payment method.
    pub payment_type: PaymentType,
    /// Current lifecycle status.
    pub status: PaymentStatus,
    /// Total price, fixed at creation.
    pub price: Decimal,
    /// Timestamp of the last state change.
    pub last_changed_at: chrono::DateTime<chrono::Utc>,
    version: i64,
    uncommitted_events: Vec<PaymentEvent>,
}

impl Payment {
    /// Creates a new Pending payment and stages a `PaymentCreated` event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` when `item_ids` is empty, contains
    /// duplicates or nil identifiers, or when `price` is not positive.
    pub fn create(
        item_ids: Vec<Uuid>,
        payment_type: PaymentType,
        price: Decimal,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<Self, DomainError> {
        Self::create_with_id(
            Uuid::new_v4(),
            item_ids,
            payment_type,
            price,
            correlation_id,
            clock,
        )
    }

    /// Same as [`Payment::create`], but with a caller-chosen identifier.
    ///
    /// Message consumers derive the payment id from the triggering upstream
    /// id, so a redelivered message maps onto the same aggregate instead of
    /// minting a duplicate.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` under the same conditions as
    /// [`Payment::create`], plus when `id` is nil.
    pub fn create_with_id(
        id: Uuid,
        item_ids: Vec<Uuid>,
        payment_type: PaymentType,
        price: Decimal,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<Self, DomainError> {
        if id.is_nil() {
            return Err(DomainError::Validation(
                "payment identifier must not be nil".to_owned(),
            ));
        }
        Self::validate_item_ids(&item_ids)?;
        if price <= Decimal::ZERO {
            return Err(DomainError::Validation(
                "payment price must be positive".to_owned(),
            ));
        }

        let mut payment = Self {
            id,
            item_ids: item_ids.clone(),
            payment_type,
            status: PaymentStatus::Pending,
            price,
            last_changed_at: clock.now(),
            version: 0,
            uncommitted_events: Vec::new(),
        };

        let event = PaymentEvent {
            metadata: EventMetadata::new(
                PAYMENT_CREATED_SUBJECT,
                payment.id,
                payment.next_sequence_number(),
                correlation_id,
                clock.now(),
            ),
            kind: PaymentEventKind::PaymentCreated(PaymentCreated {
                payment_id: payment.id,
                item_ids,
                payment_type,
                status: PaymentStatus::Pending,
                price,
            }),
        };
        payment.uncommitted_events.push(event);

        Ok(payment)
    }

    /// Checks that a payment request references a well-formed set of items.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` when the list is empty or contains
    /// nil or duplicate identifiers.
    pub fn validate_item_ids(item_ids: &[Uuid]) -> Result<(), DomainError> {
        if item_ids.is_empty() {
            return Err(DomainError::Validation(
                "payment must reference at least one order item".to_owned(),
            ));
        }
        if item_ids.iter().any(Uuid::is_nil) {
            return Err(DomainError::Validation(
                "order item identifiers must not be nil".to_owned(),
            ));
        }
        let distinct: HashSet<&Uuid> = item_ids.iter().collect();
        if distinct.len() != item_ids.len() {
            return Err(DomainError::Validation(
                "order item identifiers must be unique".to_owned(),
            ));
        }
        Ok(())
    }

    /// Rehydrates a payment from stored read-model state without running
    /// creation validation. `version` is the current event-stream length.
    #[must_use]
    pub fn from_parts(
        id: Uuid,
        item_ids: Vec<Uuid>,
        payment_type: PaymentType,
        status: PaymentStatus,
        price: Decimal,
        last_changed_at: chrono::DateTime<chrono::Utc>,
        version: i64,
    ) -> Self {
        Self {
            id,
            item_ids,
            payment_type,
            status,
            price,
            last_changed_at,
            version,
            uncommitted_events: Vec::new(),
        }
    }

    fn next_sequence_number(&self) -> i64 {
        self.version + i64::try_from(self.uncommitted_events.len()).unwrap_or(i64::MAX) + 1
    }

    /// Stages a `PaymentProcessed` event for a settlement attempt. The status
    /// recorded in the event matches the capability result; in-memory state
    /// only changes once the event is durably appended and applied.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::AlreadyProcessed` when the payment is already
    /// Approved — a terminal state is never re-entered.
    pub fn process(
        &mut self,
        payment_type: PaymentType,
        approved: bool,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        if self.status == PaymentStatus::Approved {
            return Err(DomainError::AlreadyProcessed(self.id));
        }

        let status = if approved {
            PaymentStatus::Approved
        } else {
            PaymentStatus::Failed
        };
        let event = PaymentEvent {
            metadata: EventMetadata::new(
                PAYMENT_PROCESSED_SUBJECT,
                self.id,
                self.next_sequence_number(),
                correlation_id,
                clock.now(),
            ),
            kind: PaymentEventKind::PaymentProcessed(PaymentProcessed {
                payment_id: self.id,
                payment_type,
                status,
            }),
        };
        self.uncommitted_events.push(event);
        Ok(())
    }

    /// Stages a `PaymentDeleted` fact. Read-model removal is the caller's
    /// responsibility once the fact is appended.
    pub fn delete(&mut self, correlation_id: Uuid, clock: &dyn Clock) {
        let event = PaymentEvent {
            metadata: EventMetadata::new(
                PAYMENT_DELETED_SUBJECT,
                self.id,
                self.next_sequence_number(),
                correlation_id,
                clock.now(),
            ),
            kind: PaymentEventKind::PaymentDeleted(PaymentDeleted {
                payment_id: self.id,
            }),
        };
        self.uncommitted_events.push(event);
    }

    /// Replaces the status, enforcing legal transitions.
    ///
    /// Setting the current status again is a no-op. Pending may move to
    /// Approved or Failed; Failed may move to Approved (a later retry
    /// succeeded). Approved never changes.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::AlreadyProcessed` when the payment is Approved,
    /// or `DomainError::Validation` for a regression to Pending.
    pub fn update_status(
        &mut self,
        new_status: PaymentStatus,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        if new_status == self.status {
            return Ok(());
        }
        match (self.status, new_status) {
            (PaymentStatus::Pending, _) | (PaymentStatus::Failed, PaymentStatus::Approved) => {
                self.status = new_status;
                self.last_changed_at = clock.now();
                Ok(())
            }
            (PaymentStatus::Approved, _) => Err(DomainError::AlreadyProcessed(self.id)),
            (PaymentStatus::Failed, _) => Err(DomainError::Validation(format!(
                "payment {} cannot move from Failed back to {}",
                self.id,
                new_status.as_str()
            ))),
        }
    }

    /// Replaces the payment method and refreshes the change timestamp.
    pub fn update_payment_type(&mut self, payment_type: PaymentType, clock: &dyn Clock) {
        self.payment_type = payment_type;
        self.last_changed_at = clock.now();
    }
}

impl AggregateRoot for Payment {
    type Event = PaymentEvent;

    fn aggregate_id(&self) -> Uuid {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn apply(&mut self, event: &Self::Event) {
        match &event.kind {
            PaymentEventKind::PaymentCreated(payload) => {
                self.item_ids.clone_from(&payload.item_ids);
                self.payment_type = payload.payment_type;
                self.status = payload.status;
                self.price = payload.price;
                self.last_changed_at = event.metadata.occurred_at;
            }
            PaymentEventKind::PaymentProcessed(payload) => {
                self.payment_type = payload.payment_type;
                self.status = payload.status;
                self.last_changed_at = event.metadata.occurred_at;
            }
            // Row removal is a read-model concern; the stream just records it.
            PaymentEventKind::PaymentDeleted(_) => {}
        }
        self.version += 1;
    }

    fn uncommitted_events(&self) -> &[Self::Event] {
        &self.uncommitted_events
    }

    fn clear_uncommitted_events(&mut self) {
        self.uncommitted_events.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use payflow_test_support::FixedClock;
    use rust_decimal_macros::dec;

    fn clock() -> FixedClock {
        FixedClock(chrono::Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap())
    }

    #[test]
    fn test_create_stages_payment_created_event() {
        // Arrange
        let item_ids = vec![Uuid::new_v4(), Uuid::new_v4()];
        let correlation_id = Uuid::new_v4();
        let clock = clock();

        // Act
        let payment = Payment::create(
            item_ids.clone(),
            PaymentType::Pix,
            dec!(59.80),
            correlation_id,
            &clock,
        )
        .unwrap();

        // Assert
        assert_eq!(payment.status, PaymentStatus::Pending);
        assert_eq!(payment.price, dec!(59.80));
        let events = payment.uncommitted_events();
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.event_type(), PAYMENT_CREATED_SUBJECT);
        assert_eq!(event.metadata.sequence_number, 1);
        assert_eq!(event.metadata.correlation_id, correlation_id);
        match &event.kind {
            PaymentEventKind::PaymentCreated(payload) => {
                assert_eq!(payload.payment_id, payment.id);
                assert_eq!(payload.item_ids, item_ids);
                assert_eq!(payload.status, PaymentStatus::Pending);
            }
            other => panic!("expected PaymentCreated, got {other:?}"),
        }
    }

    #[test]
    fn test_payment_clones_with_staged_events_intact() {
        let payment = Payment::create(
            vec![Uuid::new_v4()],
            PaymentType::Pix,
            dec!(25.00),
            Uuid::new_v4(),
            &clock(),
        )
        .unwrap();

        let copy = payment.clone();

        assert_eq!(copy.id, payment.id);
        assert_eq!(copy.status, payment.status);
        assert_eq!(copy.version(), payment.version());
        assert_eq!(copy.uncommitted_events().len(), 1);
    }

    #[test]
    fn test_create_accepts_one_cent() {
        let payment = Payment::create(
            vec![Uuid::new_v4()],
            PaymentType::CreditCard,
            dec!(0.01),
            Uuid::new_v4(),
            &clock(),
        );
        assert!(payment.is_ok());
    }

    #[test]
    fn test_create_rejects_zero_and_negative_price() {
        for price in [dec!(0), dec!(-10.00)] {
            let result = Payment::create(
                vec![Uuid::new_v4()],
                PaymentType::Pix,
                price,
                Uuid::new_v4(),
                &clock(),
            );
            match result.unwrap_err() {
                DomainError::Validation(msg) => assert!(msg.contains("positive")),
                other => panic!("expected Validation, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_create_rejects_empty_duplicate_and_nil_items() {
        let dup = Uuid::new_v4();
        let cases: Vec<Vec<Uuid>> = vec![vec![], vec![dup, dup], vec![Uuid::nil()]];
        for item_ids in cases {
            let result = Payment::create(
                item_ids,
                PaymentType::Pix,
                dec!(10.00),
                Uuid::new_v4(),
                &clock(),
            );
            assert!(matches!(result, Err(DomainError::Validation(_))));
        }
    }

    #[test]
    fn test_process_stages_event_without_flipping_status() {
        // Arrange
        let mut payment = Payment::create(
            vec![Uuid::new_v4()],
            PaymentType::Pix,
            dec!(25.00),
            Uuid::new_v4(),
            &clock(),
        )
        .unwrap();
        payment.clear_uncommitted_events();

        // Act
        payment
            .process(PaymentType::CreditCard, true, Uuid::new_v4(), &clock())
            .unwrap();

        // Assert — status only flips when the appended event is applied.
        assert_eq!(payment.status, PaymentStatus::Pending);
        let events = payment.uncommitted_events();
        assert_eq!(events.len(), 1);
        match &events[0].kind {
            PaymentEventKind::PaymentProcessed(payload) => {
                assert_eq!(payload.status, PaymentStatus::Approved);
                assert_eq!(payload.payment_type, PaymentType::CreditCard);
            }
            other => panic!("expected PaymentProcessed, got {other:?}"),
        }
    }

    #[test]
    fn test_process_refuses_approved_payment() {
        let mut payment = Payment::from_parts(
            Uuid::new_v4(),
            vec![Uuid::new_v4()],
            PaymentType::Pix,
            PaymentStatus::Approved,
            dec!(25.00),
            clock().0,
            2,
        );
        let result = payment.process(PaymentType::Pix, true, Uuid::new_v4(), &clock());
        assert!(matches!(result, Err(DomainError::AlreadyProcessed(id)) if id == payment.id));
        assert!(payment.uncommitted_events().is_empty());
    }

    #[test]
    fn test_apply_processed_event_flips_status_and_bumps_version() {
        // Arrange
        let mut payment = Payment::create(
            vec![Uuid::new_v4()],
            PaymentType::Pix,
            dec!(25.00),
            Uuid::new_v4(),
            &clock(),
        )
        .unwrap();
        payment.clear_uncommitted_events();
        payment
            .process(PaymentType::Pix, true, Uuid::new_v4(), &clock())
            .unwrap();
        let event = payment.uncommitted_events()[0].clone();

        // Act
        payment.apply(&event);

        // Assert
        assert_eq!(payment.status, PaymentStatus::Approved);
        assert_eq!(payment.version(), 1);
    }

    #[test]
    fn test_update_status_transitions() {
        let clock = clock();
        let mut payment = Payment::from_parts(
            Uuid::new_v4(),
            vec![Uuid::new_v4()],
            PaymentType::Pix,
            PaymentStatus::Pending,
            dec!(10.00),
            clock.0,
            1,
        );

        // Pending -> Failed -> Approved is legal.
        payment
            .update_status(PaymentStatus::Failed, &clock)
            .unwrap();
        payment
            .update_status(PaymentStatus::Approved, &clock)
            .unwrap();

        // Repeating the terminal status is a no-op.
        payment
            .update_status(PaymentStatus::Approved, &clock)
            .unwrap();
        assert_eq!(payment.status, PaymentStatus::Approved);

        // Leaving Approved is refused.
        let result = payment.update_status(PaymentStatus::Pending, &clock);
        assert!(matches!(result, Err(DomainError::AlreadyProcessed(_))));
    }

    #[test]
    fn test_payment_type_round_trips_through_wire_spelling() {
        for payment_type in [
            PaymentType::CreditCard,
            PaymentType::DebitCard,
            PaymentType::PayPal,
            PaymentType::BankTransfer,
            PaymentType::Pix,
            PaymentType::Free,
        ] {
            assert_eq!(
                payment_type.as_str().parse::<PaymentType>().unwrap(),
                payment_type
            );
        }
        assert!(matches!(
            "Cash".parse::<PaymentType>(),
            Err(DomainError::UnsupportedPaymentType(_))
        ));
    }
}
