//! Application layer: orchestration service and collaborator contracts.

pub mod orders;
pub mod service;
