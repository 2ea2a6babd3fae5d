//! Payflow Core — shared domain abstractions.
//!
//! This crate defines the traits and types every Payflow service depends on:
//! domain errors, event metadata, the event-stream repository contract, the
//! outbound publisher contract, and the clock seam. It contains no
//! infrastructure code.

pub mod aggregate;
pub mod clock;
pub mod error;
pub mod event;
pub mod publisher;
pub mod repository;
