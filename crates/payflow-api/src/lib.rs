//! Axum HTTP API for the Payflow payment service.

pub mod error;
pub mod orders_client;
pub mod routes;
pub mod state;
