//! Payment-method strategy seam.
//!
//! Each payment type maps to an executable capability. Resolution is a pure
//! compile-time `match` over the closed [`PaymentType`] enumeration, so
//! resolving the same type twice always yields the same capability and
//! retries are safe. Unknown discriminants never reach this module — they are
//! rejected at the wire boundary with `UnsupportedPaymentType`.

use async_trait::async_trait;
use payflow_core::error::DomainError;
use std::sync::Arc;

use super::aggregates::{Payment, PaymentType};

/// An executable payment capability.
///
/// `pay` returns `Ok(true)` for an approved settlement and `Ok(false)` for a
/// decline; transport problems reaching a gateway surface as errors. The
/// shipped implementations are deterministic simulations — a real gateway
/// integration is deliberately out of scope.
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    /// Name of the capability, for logging.
    fn name(&self) -> &'static str;

    /// Execute the settlement attempt for the given payment.
    async fn pay(&self, payment: &Payment) -> Result<bool, DomainError>;
}

/// Resolves a payment type to its capability.
pub trait ResolvePayment: Send + Sync {
    /// Returns the capability for `payment_type`. Pure and deterministic.
    fn resolve(&self, payment_type: PaymentType) -> Arc<dyn PaymentProcessor>;
}

/// A simulated settlement capability that always approves.
#[derive(Debug)]
pub struct SimulatedProcessor {
    name: &'static str,
}

impl SimulatedProcessor {
    /// Creates a simulated capability with the given name.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self { name }
    }
}

#[async_trait]
impl PaymentProcessor for SimulatedProcessor {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn pay(&self, payment: &Payment) -> Result<bool, DomainError> {
        tracing::info!(
            payment_id = %payment.id,
            processor = self.name,
            price = %payment.price,
            "executing simulated settlement"
        );
        Ok(true)
    }
}

/// The production resolver: a fixed mapping from every payment type to its
/// capability, built once at startup.
pub struct StaticResolver {
    credit_card: Arc<dyn PaymentProcessor>,
    debit_card: Arc<dyn PaymentProcessor>,
    paypal: Arc<dyn PaymentProcessor>,
    bank_transfer: Arc<dyn PaymentProcessor>,
    pix: Arc<dyn PaymentProcessor>,
    free: Arc<dyn PaymentProcessor>,
}

impl StaticResolver {
    /// Builds the default mapping of simulated capabilities.
    #[must_use]
    pub fn new() -> Self {
        Self {
            credit_card: Arc::new(SimulatedProcessor::new("credit-card")),
            debit_card: Arc::new(SimulatedProcessor::new("debit-card")),
            paypal: Arc::new(SimulatedProcessor::new("paypal")),
            bank_transfer: Arc::new(SimulatedProcessor::new("bank-transfer")),
            pix: Arc::new(SimulatedProcessor::new("pix")),
            free: Arc::new(SimulatedProcessor::new("free")),
        }
    }
}

impl Default for StaticResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl ResolvePayment for StaticResolver {
    fn resolve(&self, payment_type: PaymentType) -> Arc<dyn PaymentProcessor> {
        match payment_type {
            PaymentType::CreditCard => Arc::clone(&self.credit_card),
            PaymentType::DebitCard => Arc::clone(&self.debit_card),
            PaymentType::PayPal => Arc::clone(&self.paypal),
            PaymentType::BankTransfer => Arc::clone(&self.bank_transfer),
            PaymentType::Pix => Arc::clone(&self.pix),
            PaymentType::Free => Arc::clone(&self.free),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_is_deterministic_per_type() {
        let resolver = StaticResolver::new();
        for payment_type in [
            PaymentType::CreditCard,
            PaymentType::DebitCard,
            PaymentType::PayPal,
            PaymentType::BankTransfer,
            PaymentType::Pix,
            PaymentType::Free,
        ] {
            let first = resolver.resolve(payment_type);
            let second = resolver.resolve(payment_type);
            assert_eq!(first.name(), second.name());
            assert!(Arc::ptr_eq(&first, &second));
        }
    }

    #[test]
    fn test_distinct_types_resolve_to_distinct_capabilities() {
        let resolver = StaticResolver::new();
        let pix = resolver.resolve(PaymentType::Pix);
        let free = resolver.resolve(PaymentType::Free);
        assert_ne!(pix.name(), free.name());
    }
}
