//! Read-model repository contract for payments.

use async_trait::async_trait;
use payflow_core::error::DomainError;
use uuid::Uuid;

use super::aggregates::{Payment, PaymentStatus};

/// CRUD plus status queries over the payment read model.
///
/// The read model trails the event log: projections maintained by the
/// consumers bring it up to date, so a row may briefly lag the stream head.
#[async_trait]
pub trait PaymentRepository: Send + Sync {
    /// Fetch a payment by identifier.
    async fn get(&self, payment_id: Uuid) -> Result<Option<Payment>, DomainError>;

    /// Insert a new payment row.
    async fn add(&self, payment: &Payment) -> Result<(), DomainError>;

    /// Update an existing payment row.
    async fn update(&self, payment: &Payment) -> Result<(), DomainError>;

    /// Delete a payment row; deleting an absent row is not an error.
    async fn delete(&self, payment_id: Uuid) -> Result<(), DomainError>;

    /// All payments currently in the given status.
    async fn with_status(&self, status: PaymentStatus) -> Result<Vec<Payment>, DomainError>;

    /// All payments.
    async fn all(&self) -> Result<Vec<Payment>, DomainError>;
}
