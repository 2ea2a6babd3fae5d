//! Payflow — the Payments bounded context.
//!
//! `domain` holds the Payment aggregate, its events, and the payment-method
//! strategy seam. `application` holds the orchestration service and the
//! contracts of its collaborators (read model, upstream order catalog).

pub mod application;
pub mod domain;
