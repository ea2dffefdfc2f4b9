//! Broker facade.
//!
//! Bundles the connection registry, query executor, subscription registry and
//! status monitor behind the boundary operations a transport exposes.

use crate::config::{Config, PoolOptions};
use crate::db::{ConnectionRegistry, QueryExecutor, Row};
use crate::error::{BrokerError, BrokerResult};
use crate::models::{ConnectParams, ConnectionSummary, EngineKind};
use crate::monitor::{EventSender, StatusMonitor, SubscriptionRegistry};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct Broker {
    connections: Arc<ConnectionRegistry>,
    executor: QueryExecutor,
    subscriptions: Arc<SubscriptionRegistry>,
    monitor: Arc<StatusMonitor>,
}

impl Broker {
    /// Create a broker with the given pool defaults and probe interval.
    pub fn new(pool_options: PoolOptions, probe_interval: Duration) -> Self {
        let connections = Arc::new(ConnectionRegistry::with_pool_options(pool_options));
        let executor = QueryExecutor::new(connections.clone());
        let subscriptions = Arc::new(SubscriptionRegistry::new(connections.clone()));
        let monitor = Arc::new(StatusMonitor::new(
            connections.clone(),
            subscriptions.clone(),
            probe_interval,
        ));
        Self {
            connections,
            executor,
            subscriptions,
            monitor,
        }
    }

    /// Create a broker from the service configuration.
    pub fn from_config(config: &Config) -> BrokerResult<Self> {
        let pool_options = config.pool_options().map_err(BrokerError::internal)?;
        Ok(Self::new(pool_options, config.probe_interval()))
    }

    /// Open a connection and register it under `connection_id`.
    ///
    /// `db_type` is parsed case-insensitively. The new connection is probed
    /// right away so subscribers learn its health without waiting a full
    /// interval.
    pub async fn connect(
        &self,
        connection_id: &str,
        db_type: &str,
        params: &ConnectParams,
    ) -> BrokerResult<String> {
        let engine: EngineKind = db_type.parse()?;
        let acknowledgement = self.connections.connect(connection_id, engine, params).await?;
        self.monitor.probe_connection(connection_id).await;
        Ok(acknowledgement)
    }

    /// Close and unregister a connection, telling subscribers it is gone.
    pub async fn disconnect(&self, connection_id: &str) -> BrokerResult<String> {
        self.monitor.retire(connection_id).await
    }

    /// Run a statement on a registered connection.
    pub async fn query(&self, connection_id: &str, sql: &str) -> BrokerResult<Vec<Row>> {
        self.executor.run(connection_id, sql).await
    }

    /// Summaries of all live connections.
    pub async fn list(&self) -> Vec<ConnectionSummary> {
        self.connections.list().await
    }

    /// Subscribe `user_id` to status events, optionally for one connection.
    pub async fn subscribe(
        &self,
        user_id: &str,
        sender: EventSender,
        filter: Option<String>,
    ) -> BrokerResult<Uuid> {
        self.subscriptions.subscribe(user_id, sender, filter).await
    }

    /// Drop the subscription `subscription_id` of `user_id` if it is still current.
    pub async fn release(&self, user_id: &str, subscription_id: Uuid) -> bool {
        self.subscriptions.release(user_id, subscription_id).await
    }

    pub async fn unsubscribe(&self, user_id: &str) {
        self.subscriptions.unsubscribe(user_id).await
    }

    /// Start the background status monitor.
    pub fn start_monitor(&self) -> JoinHandle<()> {
        self.monitor.clone().start()
    }

    /// Close every connection.
    pub async fn close_all(&self) {
        let connections = self.connections.connection_count().await;
        let subscriptions = self.subscriptions.count().await;
        info!(connections, subscriptions, "Closing broker");
        self.connections.close_all().await;
    }

    pub fn connections(&self) -> &Arc<ConnectionRegistry> {
        &self.connections
    }

    pub fn subscriptions(&self) -> &Arc<SubscriptionRegistry> {
        &self.subscriptions
    }

    pub fn monitor(&self) -> &Arc<StatusMonitor> {
        &self.monitor
    }
}

impl Default for Broker {
    fn default() -> Self {
        Self::new(
            PoolOptions::default(),
            Duration::from_secs(crate::config::DEFAULT_PROBE_INTERVAL_SECS),
        )
    }
}
