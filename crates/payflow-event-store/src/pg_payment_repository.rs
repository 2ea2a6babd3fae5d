//! `PostgreSQL` implementation of the payment read model.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use payflow_core::error::DomainError;
use payflow_payments::domain::aggregates::{Payment, PaymentStatus, PaymentType};
use payflow_payments::domain::repository::PaymentRepository;

/// PostgreSQL-backed payment read model.
///
/// Rows here are a projection of the event log maintained by the message
/// consumers; the log stays authoritative when the two disagree.
#[derive(Debug, Clone)]
pub struct PgPaymentRepository {
    pool: PgPool,
}

impl PgPaymentRepository {
    /// Creates a new `PgPaymentRepository`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn infra(err: sqlx::Error) -> DomainError {
    DomainError::Infrastructure(err.to_string())
}

fn row_to_payment(row: &PgRow) -> Result<Payment, DomainError> {
    let id: Uuid = row.try_get("payment_id").map_err(infra)?;
    let item_ids: Vec<Uuid> = row.try_get("item_ids").map_err(infra)?;
    let payment_type: String = row.try_get("payment_type").map_err(infra)?;
    let status: String = row.try_get("status").map_err(infra)?;
    let price: Decimal = row.try_get("price").map_err(infra)?;
    let last_changed_at: DateTime<Utc> = row.try_get("last_changed_at").map_err(infra)?;

    Ok(Payment::from_parts(
        id,
        item_ids,
        PaymentType::from_str(&payment_type)?,
        PaymentStatus::from_str(&status)?,
        price,
        last_changed_at,
        0,
    ))
}

#[async_trait]
impl PaymentRepository for PgPaymentRepository {
    async fn get(&self, payment_id: Uuid) -> Result<Option<Payment>, DomainError> {
        let row = sqlx::query(
            "SELECT payment_id, item_ids, payment_type, status, price, last_changed_at
             FROM payments
             WHERE payment_id = $1",
        )
        .bind(payment_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(infra)?;

        row.as_ref().map(row_to_payment).transpose()
    }

    async fn add(&self, payment: &Payment) -> Result<(), DomainError> {
        sqlx::query(
            "INSERT INTO payments
                 (payment_id, item_ids, payment_type, status, price, last_changed_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(payment.id)
        .bind(&payment.item_ids)
        .bind(payment.payment_type.as_str())
        .bind(payment.status.as_str())
        .bind(payment.price)
        .bind(payment.last_changed_at)
        .execute(&self.pool)
        .await
        .map_err(infra)?;
        Ok(())
    }

    async fn update(&self, payment: &Payment) -> Result<(), DomainError> {
        let result = sqlx::query(
            "UPDATE payments
             SET item_ids = $2, payment_type = $3, status = $4, price = $5,
                 last_changed_at = $6
             WHERE payment_id = $1",
        )
        .bind(payment.id)
        .bind(&payment.item_ids)
        .bind(payment.payment_type.as_str())
        .bind(payment.status.as_str())
        .bind(payment.price)
        .bind(payment.last_changed_at)
        .execute(&self.pool)
        .await
        .map_err(infra)?;

        if result.rows_affected() == 0 {
            return Err(DomainError::NotFound(payment.id));
        }
        Ok(())
    }

    async fn delete(&self, payment_id: Uuid) -> Result<(), DomainError> {
        // Deleting an absent row is not an error; cancellations may arrive
        // more than once.
        sqlx::query("DELETE FROM payments WHERE payment_id = $1")
            .bind(payment_id)
            .execute(&self.pool)
            .await
            .map_err(infra)?;
        Ok(())
    }

    async fn with_status(&self, status: PaymentStatus) -> Result<Vec<Payment>, DomainError> {
        let rows = sqlx::query(
            "SELECT payment_id, item_ids, payment_type, status, price, last_changed_at
             FROM payments
             WHERE status = $1
             ORDER BY last_changed_at ASC",
        )
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(infra)?;

        rows.iter().map(row_to_payment).collect()
    }

    async fn all(&self) -> Result<Vec<Payment>, DomainError> {
        let rows = sqlx::query(
            "SELECT payment_id, item_ids, payment_type, status, price, last_changed_at
             FROM payments
             ORDER BY last_changed_at ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(infra)?;

        rows.iter().map(row_to_payment).collect()
    }
}
