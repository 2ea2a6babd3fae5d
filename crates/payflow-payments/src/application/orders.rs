//! Upstream order-catalog collaborator contract.

use async_trait::async_trait;
use payflow_core::error::DomainError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Settlement status of an upstream order item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderItemStatus {
    /// Awaiting payment; eligible for a new payment.
    PendingPayment,
    /// Already fully paid and owned; must not be paid again.
    Owned,
}

/// An order item as reported by the upstream orders service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    /// The item identifier.
    pub item_id: Uuid,
    /// Current settlement status.
    pub status: OrderItemStatus,
    /// Price to be paid, when the upstream has priced the item.
    pub price_paid: Option<Decimal>,
}

/// Read access to the upstream orders service.
///
/// The catalog is authoritative for item existence, ownership, and price;
/// the orchestration service re-reads it at settlement time to detect drift.
#[async_trait]
pub trait OrderCatalog: Send + Sync {
    /// Fetch a single item; `None` when the upstream does not know it.
    async fn item(&self, item_id: Uuid) -> Result<Option<OrderItem>, DomainError>;

    /// Fetch the items covered by a payment; empty when none are known.
    async fn items_for_payment(&self, payment_id: Uuid) -> Result<Vec<OrderItem>, DomainError>;
}
