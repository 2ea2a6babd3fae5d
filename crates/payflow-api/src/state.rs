//! Shared application state.

use std::sync::Arc;

use payflow_payments::application::service::PaymentService;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// The payment orchestration service.
    pub payments: Arc<PaymentService>,
}

impl AppState {
    /// Create new application state.
    #[must_use]
    pub fn new(payments: Arc<PaymentService>) -> Self {
        Self { payments }
    }
}
