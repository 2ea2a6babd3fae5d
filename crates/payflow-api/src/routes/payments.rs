//! Routes for the payments context.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use payflow_core::error::DomainError;
use payflow_payments::application::service::{CreatePaymentRequest, PaymentView};
use payflow_payments::domain::aggregates::{PaymentStatus, PaymentType};

use crate::error::ApiError;
use crate::state::AppState;

/// Request body for the pay endpoint.
#[derive(Debug, Deserialize)]
pub struct PayOrderRequest {
    /// The payment method to execute with; may differ from the one chosen
    /// at creation.
    pub payment_type: PaymentType,
}

/// Response body for payment creation.
#[derive(Debug, Serialize)]
pub struct CreatePaymentResponse {
    /// The created payment.
    pub payment: PaymentView,
    /// The correlation id attached to the emitted event and message.
    pub correlation_id: Uuid,
}

/// Reads the correlation id from the request headers, minting one when the
/// caller did not send any. It is echoed back in the response so callers can
/// trace the whole flow.
fn correlation_id(headers: &HeaderMap) -> Uuid {
    headers
        .get("x-correlation-id")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| Uuid::parse_str(value).ok())
        .unwrap_or_else(Uuid::new_v4)
}

fn correlation_header(correlation_id: Uuid) -> [(&'static str, String); 1] {
    [("x-correlation-id", correlation_id.to_string())]
}

/// POST /api/v1/payments
async fn create_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreatePaymentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let correlation_id = correlation_id(&headers);
    let payment = state.payments.create_payment(request, correlation_id).await?;
    Ok((
        StatusCode::ACCEPTED,
        correlation_header(correlation_id),
        Json(CreatePaymentResponse {
            payment,
            correlation_id,
        }),
    ))
}

/// POST /api/v1/payments/{payment_id}/pay
async fn pay_order(
    State(state): State<AppState>,
    Path(payment_id): Path<Uuid>,
    headers: HeaderMap,
    Json(request): Json<PayOrderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let correlation_id = correlation_id(&headers);
    let payment = state
        .payments
        .pay_order(payment_id, request.payment_type, correlation_id)
        .await?;
    Ok((correlation_header(correlation_id), Json(payment)))
}

/// GET /api/v1/payments/{payment_id}
async fn get_payment(
    State(state): State<AppState>,
    Path(payment_id): Path<Uuid>,
) -> Result<Json<PaymentView>, ApiError> {
    let payment = state.payments.get_payment(payment_id).await?;
    Ok(Json(payment))
}

/// GET /api/v1/payments
async fn list_payments(
    State(state): State<AppState>,
) -> Result<Json<Vec<PaymentView>>, ApiError> {
    let payments = state.payments.all_payments().await?;
    Ok(Json(payments))
}

/// GET /api/v1/payments/status/{status}
async fn payments_by_status(
    State(state): State<AppState>,
    Path(status): Path<String>,
) -> Result<Json<Vec<PaymentView>>, ApiError> {
    let status = parse_status(&status)?;
    let payments = state.payments.payments_with_status(status).await?;
    Ok(Json(payments))
}

fn parse_status(segment: &str) -> Result<PaymentStatus, ApiError> {
    match segment.to_ascii_lowercase().as_str() {
        "pending" => Ok(PaymentStatus::Pending),
        "approved" => Ok(PaymentStatus::Approved),
        "failed" => Ok(PaymentStatus::Failed),
        other => Err(ApiError(DomainError::Validation(format!(
            "unknown payment status filter: {other}"
        )))),
    }
}

/// Returns the router for the payments context.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_payment).get(list_payments))
        .route("/{payment_id}", get(get_payment))
        .route("/{payment_id}/pay", post(pay_order))
        .route("/status/{status}", get(payments_by_status))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_status_accepts_lowercase_segments() {
        assert_eq!(parse_status("pending").unwrap(), PaymentStatus::Pending);
        assert_eq!(parse_status("approved").unwrap(), PaymentStatus::Approved);
        assert_eq!(parse_status("failed").unwrap(), PaymentStatus::Failed);
    }

    #[test]
    fn test_parse_status_rejects_unknown_segments() {
        assert!(parse_status("declined").is_err());
    }

    #[test]
    fn test_correlation_id_prefers_the_request_header() {
        let supplied = Uuid::new_v4();
        let mut headers = HeaderMap::new();
        headers.insert("x-correlation-id", supplied.to_string().parse().unwrap());

        assert_eq!(correlation_id(&headers), supplied);
    }

    #[test]
    fn test_correlation_id_minted_when_header_is_missing_or_invalid() {
        let mut headers = HeaderMap::new();
        headers.insert("x-correlation-id", "not-a-uuid".parse().unwrap());

        let minted = correlation_id(&headers);
        assert_ne!(minted, Uuid::nil());
    }
}
