//! Domain layer: the Payment aggregate, its events, and strategy seam.

pub mod aggregates;
pub mod events;
pub mod repository;
pub mod strategy;
