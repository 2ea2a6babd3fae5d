//! HTTP client for the upstream orders service.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use uuid::Uuid;

use payflow_core::error::DomainError;
use payflow_payments::application::orders::{OrderCatalog, OrderItem};

/// Reqwest-backed implementation of the upstream order catalog.
///
/// The orders service is authoritative for item existence, ownership, and
/// price; a 404 becomes `Ok(None)`/an empty list and everything else
/// non-success maps to `Transport`.
pub struct HttpOrderCatalog {
    client: reqwest::Client,
    base_url: String,
}

impl HttpOrderCatalog {
    /// Creates a catalog client against the given base URL.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::Infrastructure`] when the HTTP client cannot
    /// be constructed.
    pub fn new(base_url: impl Into<String>) -> Result<Self, DomainError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| DomainError::Infrastructure(format!("failed to build client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
    ) -> Result<Option<T>, DomainError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| DomainError::Transport(format!("orders service unreachable: {e}")))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let parsed = response.json::<T>().await.map_err(|e| {
                    DomainError::Transport(format!("malformed orders service response: {e}"))
                })?;
                Ok(Some(parsed))
            }
            status => Err(DomainError::Transport(format!(
                "orders service returned {status} for {url}"
            ))),
        }
    }
}

#[async_trait]
impl OrderCatalog for HttpOrderCatalog {
    async fn item(&self, item_id: Uuid) -> Result<Option<OrderItem>, DomainError> {
        let url = format!("{}/api/v1/items/{item_id}", self.base_url);
        self.get_json(&url).await
    }

    async fn items_for_payment(&self, payment_id: Uuid) -> Result<Vec<OrderItem>, DomainError> {
        let url = format!("{}/api/v1/payments/{payment_id}/items", self.base_url);
        Ok(self.get_json(&url).await?.unwrap_or_default())
    }
}
