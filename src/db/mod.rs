//! Database abstraction layer.
//!
//! This module provides database access functionality:
//! - Engine adapters over sqlx pools
//! - The connection registry keyed by caller-chosen ids
//! - Query execution against registered connections
//! - Conversion of engine rows into JSON objects

pub mod adapter;
pub mod executor;
pub mod registry;
pub mod types;

pub use adapter::DbPool;
pub use executor::QueryExecutor;
pub use registry::{ConnectionRegistry, HealthTransition};
pub use types::Row;
