//! Shared test helpers for API integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use rust_decimal::Decimal;
use sqlx::PgPool;
use tower::ServiceExt;
use uuid::Uuid;

use payflow_core::clock::Clock;
use payflow_core::error::DomainError;
use payflow_event_store::{PgEventRepository, PgPaymentRepository};
use payflow_payments::application::orders::{OrderCatalog, OrderItem, OrderItemStatus};
use payflow_payments::application::service::PaymentService;
use payflow_payments::domain::aggregates::{Payment, PaymentType};
use payflow_payments::domain::strategy::{PaymentProcessor, ResolvePayment, StaticResolver};
use payflow_test_support::{FixedClock, NullEventPublisher};

use payflow_api::routes;
use payflow_api::state::AppState;

/// Fixed timestamp used across all integration tests.
pub fn fixed_clock() -> Arc<dyn Clock> {
    Arc::new(FixedClock(
        chrono::TimeZone::with_ymd_and_hms(&chrono::Utc, 2026, 3, 1, 12, 0, 0).unwrap(),
    ))
}

/// In-memory stand-in for the upstream orders service.
///
/// `items_for_payment` returns every seeded item: integration tests seed
/// exactly the items that belong to the payment under test.
pub struct TestCatalog {
    items: HashMap<Uuid, OrderItem>,
}

impl TestCatalog {
    pub fn new(items: Vec<OrderItem>) -> Self {
        Self {
            items: items.into_iter().map(|item| (item.item_id, item)).collect(),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }
}

#[async_trait]
impl OrderCatalog for TestCatalog {
    async fn item(&self, item_id: Uuid) -> Result<Option<OrderItem>, DomainError> {
        Ok(self.items.get(&item_id).cloned())
    }

    async fn items_for_payment(&self, _payment_id: Uuid) -> Result<Vec<OrderItem>, DomainError> {
        Ok(self.items.values().cloned().collect())
    }
}

/// An order item awaiting payment.
pub fn pending_item(item_id: Uuid, price: Decimal) -> OrderItem {
    OrderItem {
        item_id,
        status: OrderItemStatus::PendingPayment,
        price_paid: Some(price),
    }
}

/// A resolver whose every capability declines the settlement.
pub struct DecliningResolver(Arc<DecliningProcessor>);

impl DecliningResolver {
    pub fn new() -> Self {
        Self(Arc::new(DecliningProcessor))
    }
}

pub struct DecliningProcessor;

#[async_trait]
impl PaymentProcessor for DecliningProcessor {
    fn name(&self) -> &'static str {
        "declining"
    }

    async fn pay(&self, _payment: &Payment) -> Result<bool, DomainError> {
        Ok(false)
    }
}

impl ResolvePayment for DecliningResolver {
    fn resolve(&self, _payment_type: PaymentType) -> Arc<dyn PaymentProcessor> {
        Arc::clone(&self.0) as Arc<dyn PaymentProcessor>
    }
}

/// Build the full app router with real Postgres repositories, a stub order
/// catalog, and the always-approving simulated capabilities. Uses the same
/// route structure as `main.rs`.
pub fn build_test_app(pool: PgPool, catalog: TestCatalog) -> Router {
    build_test_app_with_resolver(pool, catalog, Arc::new(StaticResolver::new()))
}

/// Build the full app router with a custom resolver for tests that need a
/// declined settlement.
pub fn build_test_app_with_resolver(
    pool: PgPool,
    catalog: TestCatalog,
    resolver: Arc<dyn ResolvePayment>,
) -> Router {
    let service = PaymentService::new(
        Arc::new(PgPaymentRepository::new(pool.clone())),
        Arc::new(PgEventRepository::new(pool)),
        Arc::new(NullEventPublisher),
        Arc::new(catalog),
        resolver,
        fixed_clock(),
    );
    let app_state = AppState::new(Arc::new(service));

    Router::new()
        .merge(routes::health::router())
        .nest("/api/v1/payments", routes::payments::router())
        .with_state(app_state)
}

/// Send a POST request with a JSON body and return the response.
pub async fn post_json(
    app: Router,
    uri: &str,
    body: &serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();

    (status, json)
}

/// Send a POST request carrying an explicit correlation id header and return
/// the status, the echoed correlation header, and the body.
pub async fn post_json_with_correlation(
    app: Router,
    uri: &str,
    body: &serde_json::Value,
    correlation_id: Uuid,
) -> (StatusCode, Option<String>, serde_json::Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("x-correlation-id", correlation_id.to_string())
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let echoed = response
        .headers()
        .get("x-correlation-id")
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();

    (status, echoed, json)
}

/// Send a GET request and return the response.
pub async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();

    (status, json)
}
