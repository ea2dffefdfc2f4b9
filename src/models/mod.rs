//! Data models for the connection broker.
//!
//! This module re-exports all model types used throughout the application.

pub mod connection;
pub mod status;

// Re-export commonly used types
pub use connection::{ConnectParams, ConnectionSummary, EngineKind, HealthStatus};
pub use status::{LinkStatus, StatusEvent};
