//! Payflow API server entry point.

use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use payflow_broker::KafkaEventPublisher;
use payflow_core::clock::SystemClock;
use payflow_event_store::{PgEventRepository, PgPaymentRepository, migrate};
use payflow_payments::application::service::PaymentService;
use payflow_payments::domain::strategy::StaticResolver;

use payflow_api::orders_client::HttpOrderCatalog;
use payflow_api::routes;
use payflow_api::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Initialize tracing subscriber.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting Payflow API server");

    // Read configuration from environment.
    let database_url = std::env::var("DATABASE_URL")
        .map_err(|_| "DATABASE_URL environment variable must be set")?;
    let kafka_brokers = std::env::var("KAFKA_BROKERS")
        .map_err(|_| "KAFKA_BROKERS environment variable must be set")?;
    let orders_base_url = std::env::var("ORDERS_BASE_URL")
        .map_err(|_| "ORDERS_BASE_URL environment variable must be set")?;
    let payments_topic =
        std::env::var("PAYMENTS_TOPIC").unwrap_or_else(|_| "payments.events".to_string());
    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = std::env::var("PORT")
        .unwrap_or_else(|_| "3000".to_string())
        .parse()
        .map_err(|e| format!("PORT must be a valid u16: {e}"))?;

    // Create database connection pool and bring the schema up.
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await?;
    migrate::run_with_retry(&pool, 10).await?;

    // Wire the orchestration service.
    let service = PaymentService::new(
        Arc::new(PgPaymentRepository::new(pool.clone())),
        Arc::new(PgEventRepository::new(pool)),
        Arc::new(KafkaEventPublisher::new(&kafka_brokers, payments_topic)?),
        Arc::new(HttpOrderCatalog::new(orders_base_url)?),
        Arc::new(StaticResolver::new()),
        Arc::new(SystemClock),
    );
    let app_state = AppState::new(Arc::new(service));

    // Build router.
    let app = Router::new()
        .merge(routes::health::router())
        .nest("/api/v1/payments", routes::payments::router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    // Start server.
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .map_err(|e| format!("invalid HOST:PORT combination: {e}"))?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app).await?;

    Ok(())
}
