//! Transport layer for the connection broker.
//!
//! - HTTP: JSON endpoints for connect/disconnect/query
//! - WebSocket: status event push, served on the same listener

pub mod http;
pub mod ws;

pub use http::{ApiResponse, AppState, HttpTransport};

use crate::error::BrokerResult;
use std::future::Future;

/// Trait for broker transport implementations.
pub trait Transport: Send + Sync {
    /// Start the transport and begin handling requests.
    ///
    /// This method should block until the transport is shut down.
    fn run(&self) -> impl Future<Output = BrokerResult<()>> + Send;

    /// Get the name of this transport for logging.
    fn name(&self) -> &'static str;
}
