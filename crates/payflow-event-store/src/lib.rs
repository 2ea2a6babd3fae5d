//! `PostgreSQL` persistence for the Payflow services: the append-only event
//! store and the payment read model it feeds.

pub mod migrate;
pub mod pg_event_repository;
pub mod pg_payment_repository;

pub use pg_event_repository::PgEventRepository;
pub use pg_payment_repository::PgPaymentRepository;
