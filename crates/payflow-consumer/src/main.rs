//! Payflow consumer binary.
//!
//! Runs two consumer-group subscriptions: one on the orders topic for
//! upstream `OrderCreated` and `PaymentCancelledEvent` messages, one on the
//! payments topic projecting this service's own events into the read model.

use std::error::Error;
use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use payflow_broker::{Subscription, SubscriptionConfig};
use payflow_broker::router::SubjectRouter;
use payflow_core::clock::SystemClock;
use payflow_event_store::migrate;
use payflow_payments::domain::events::{
    ORDER_CREATED_SUBJECT, PAYMENT_CANCELLED_SUBJECT, PAYMENT_CREATED_SUBJECT,
    PAYMENT_PROCESSED_SUBJECT,
};

mod handlers;
mod subscribers;

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Initialize tracing subscriber.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting Payflow consumer");

    // Read configuration from environment.
    let database_url = std::env::var("DATABASE_URL")
        .map_err(|_| "DATABASE_URL environment variable must be set")?;
    let brokers = std::env::var("KAFKA_BROKERS")
        .map_err(|_| "KAFKA_BROKERS environment variable must be set")?;
    let orders_topic = env_or("ORDERS_TOPIC", "orders.events");
    let payments_topic = env_or("PAYMENTS_TOPIC", "payments.events");
    let dead_letter_topic = env_or("DEAD_LETTER_TOPIC", "payments.dead-letter");
    let max_concurrent: usize = env_or("MAX_CONCURRENT_HANDLERS", "4")
        .parse()
        .map_err(|e| format!("MAX_CONCURRENT_HANDLERS must be a positive integer: {e}"))?;
    let max_attempts: u32 = env_or("MAX_HANDLER_ATTEMPTS", "5")
        .parse()
        .map_err(|e| format!("MAX_HANDLER_ATTEMPTS must be a positive integer: {e}"))?;

    // Create database connection pool and bring the schema up.
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await?;
    migrate::run_with_retry(&pool, 10).await?;

    let clock = Arc::new(SystemClock);

    let orders_router = SubjectRouter::new()
        .with_handler(
            ORDER_CREATED_SUBJECT,
            Arc::new(subscribers::OrderCreatedSubscriber::new(
                pool.clone(),
                clock.clone(),
            )),
        )
        .with_handler(
            PAYMENT_CANCELLED_SUBJECT,
            Arc::new(subscribers::PaymentCancelledSubscriber::new(
                pool.clone(),
                clock.clone(),
            )),
        );

    let payments_router = SubjectRouter::new()
        .with_handler(
            PAYMENT_CREATED_SUBJECT,
            Arc::new(subscribers::PaymentCreatedSubscriber::new(
                pool.clone(),
                clock.clone(),
            )),
        )
        .with_handler(
            PAYMENT_PROCESSED_SUBJECT,
            Arc::new(subscribers::PaymentProcessedSubscriber::new(
                pool.clone(),
                clock.clone(),
            )),
        );

    let orders_subscription = Subscription::new(
        SubscriptionConfig {
            brokers: brokers.clone(),
            topic: orders_topic,
            group_id: "payflow-consumer-orders".to_string(),
            max_concurrent,
            max_attempts,
            dead_letter_topic: dead_letter_topic.clone(),
        },
        orders_router,
    );
    let payments_subscription = Subscription::new(
        SubscriptionConfig {
            brokers,
            topic: payments_topic,
            group_id: "payflow-consumer-payments".to_string(),
            max_concurrent,
            max_attempts,
            dead_letter_topic,
        },
        payments_router,
    );

    // Flip the shutdown flag on SIGINT; both subscriptions drain and stop.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for shutdown signal");
        }
        tracing::info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    let (orders_result, payments_result) = tokio::join!(
        orders_subscription.run(shutdown_rx.clone()),
        payments_subscription.run(shutdown_rx),
    );
    orders_result?;
    payments_result?;

    tracing::info!("Payflow consumer stopped");
    Ok(())
}
