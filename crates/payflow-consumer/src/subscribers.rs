//! `MessageHandler` implementations binding the handlers to Postgres.
//!
//! Each handler holds the shared pool and builds short-lived repositories
//! per message, so one delivery is one unit of work.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;

use payflow_broker::{InboundMessage, MessageHandler};
use payflow_core::clock::Clock;
use payflow_core::error::DomainError;
use payflow_event_store::{PgEventRepository, PgPaymentRepository};
use payflow_payments::domain::events::{PaymentCreated, PaymentDeleted, PaymentProcessed};

use crate::handlers;

fn decode<T: serde::de::DeserializeOwned>(message: &InboundMessage) -> Result<T, DomainError> {
    serde_json::from_value(message.body.clone()).map_err(|e| {
        DomainError::Validation(format!(
            "malformed {} payload: {e}",
            message.subject
        ))
    })
}

/// Reacts to upstream `OrderCreated` messages.
pub struct OrderCreatedSubscriber {
    pool: PgPool,
    clock: Arc<dyn Clock>,
}

impl OrderCreatedSubscriber {
    pub fn new(pool: PgPool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }
}

#[async_trait]
impl MessageHandler for OrderCreatedSubscriber {
    async fn handle(&self, message: &InboundMessage) -> Result<(), DomainError> {
        let payload: handlers::OrderCreatedPayload = decode(message)?;
        let payments = PgPaymentRepository::new(self.pool.clone());
        handlers::apply_order_created(
            &payments,
            payload,
            message.correlation_id,
            self.clock.as_ref(),
        )
        .await
    }
}

/// Projects `PaymentCreated` events into the read model.
pub struct PaymentCreatedSubscriber {
    pool: PgPool,
    clock: Arc<dyn Clock>,
}

impl PaymentCreatedSubscriber {
    pub fn new(pool: PgPool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }
}

#[async_trait]
impl MessageHandler for PaymentCreatedSubscriber {
    async fn handle(&self, message: &InboundMessage) -> Result<(), DomainError> {
        let payload: PaymentCreated = decode(message)?;
        let payments = PgPaymentRepository::new(self.pool.clone());
        handlers::apply_payment_created(&payments, payload, self.clock.as_ref()).await
    }
}

/// Applies `PaymentProcessed` outcomes to the read model.
pub struct PaymentProcessedSubscriber {
    pool: PgPool,
    clock: Arc<dyn Clock>,
}

impl PaymentProcessedSubscriber {
    pub fn new(pool: PgPool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }
}

#[async_trait]
impl MessageHandler for PaymentProcessedSubscriber {
    async fn handle(&self, message: &InboundMessage) -> Result<(), DomainError> {
        let payload: PaymentProcessed = decode(message)?;
        let payments = PgPaymentRepository::new(self.pool.clone());
        handlers::apply_payment_processed(&payments, payload, self.clock.as_ref()).await
    }
}

/// Handles upstream `PaymentCancelledEvent` messages.
pub struct PaymentCancelledSubscriber {
    pool: PgPool,
    clock: Arc<dyn Clock>,
}

impl PaymentCancelledSubscriber {
    pub fn new(pool: PgPool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }
}

#[async_trait]
impl MessageHandler for PaymentCancelledSubscriber {
    async fn handle(&self, message: &InboundMessage) -> Result<(), DomainError> {
        let payload: PaymentDeleted = decode(message)?;
        let payments = PgPaymentRepository::new(self.pool.clone());
        let events = PgEventRepository::new(self.pool.clone());
        handlers::apply_payment_cancelled(
            &payments,
            &events,
            payload,
            message.correlation_id,
            self.clock.as_ref(),
        )
        .await
    }
}
