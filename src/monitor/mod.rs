//! Connection health monitoring and status subscriptions.
//!
//! - [`StatusMonitor`] probes registered connections on an interval
//! - [`SubscriptionRegistry`] fans status events out to subscribers

pub mod status;
pub mod subscriptions;

pub use status::StatusMonitor;
pub use subscriptions::{EventSender, SubscriptionRegistry};
