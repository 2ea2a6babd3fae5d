//! Shared test mocks and utilities for the Payflow services.

mod clock;
mod publisher;
mod repository;

pub use clock::FixedClock;
pub use publisher::{FailingEventPublisher, NullEventPublisher};
pub use repository::{EmptyEventRepository, FailingEventRepository, RecordingEventRepository};
