//! DB Broker Library
//!
//! A multi-tenant database connection broker: callers open named connections
//! to MySQL, PostgreSQL or SQLite, run statements against them by id, and
//! subscribe to connection health over a WebSocket.

pub mod broker;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod monitor;
pub mod transport;

pub use broker::Broker;
pub use config::Config;
pub use error::{BrokerError, BrokerResult};
