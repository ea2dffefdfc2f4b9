//! Connection registry.
//!
//! Maps caller-chosen connection ids to live pools. The duplicate check and the
//! reservation of an id happen under a single write lock, so two concurrent
//! `connect` calls with the same id can never both succeed. Pools are opened
//! outside the lock; the reservation keeps the id taken meanwhile.

use crate::config::PoolOptions;
use crate::db::adapter::DbPool;
use crate::error::{BrokerError, BrokerResult};
use crate::models::{
    ConnectParams, ConnectionSummary, EngineKind, HealthStatus, LinkStatus, StatusEvent,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// A live, registered connection. Owns its pool exclusively.
#[derive(Debug)]
struct ConnectionRecord {
    engine: EngineKind,
    pool: DbPool,
    created_at: DateTime<Utc>,
    health: HealthStatus,
    last_checked: Option<DateTime<Utc>>,
}

#[derive(Debug)]
enum Slot {
    /// Id reserved by an in-flight `connect`; not visible to lookups.
    Reserved,
    Live(ConnectionRecord),
}

/// A health change observed by a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthTransition {
    pub from: HealthStatus,
    pub to: HealthStatus,
}

#[derive(Debug, Clone)]
pub struct ConnectionRegistry {
    slots: Arc<RwLock<HashMap<String, Slot>>>,
    pool_options: PoolOptions,
}

impl ConnectionRegistry {
    /// Create a new registry with default pool options.
    pub fn new() -> Self {
        Self::with_pool_options(PoolOptions::default())
    }

    /// Create a new registry whose pools use the given options.
    pub fn with_pool_options(pool_options: PoolOptions) -> Self {
        Self {
            slots: Arc::new(RwLock::new(HashMap::new())),
            pool_options,
        }
    }

    /// Open a pool for `engine` and register it under `connection_id`.
    ///
    /// Returns the engine's confirmation message.
    pub async fn connect(
        &self,
        connection_id: &str,
        engine: EngineKind,
        params: &ConnectParams,
    ) -> BrokerResult<String> {
        if connection_id.trim().is_empty() {
            return Err(BrokerError::missing_parameter("connId"));
        }

        {
            let mut slots = self.slots.write().await;
            if slots.contains_key(connection_id) {
                return Err(BrokerError::duplicate_connection_id(connection_id));
            }
            slots.insert(connection_id.to_string(), Slot::Reserved);
        } // Lock released here

        info!(
            connection_id = %connection_id,
            engine = %engine,
            "Connecting to database"
        );

        let pool = match DbPool::open(engine, params, &self.pool_options).await {
            Ok(pool) => pool,
            Err(e) => {
                self.release_reservation(connection_id).await;
                warn!(connection_id = %connection_id, error = %e, "Connection failed");
                return Err(e);
            }
        };
        let acknowledgement = pool.acknowledgement().await;

        let record = ConnectionRecord {
            engine,
            pool,
            created_at: Utc::now(),
            health: HealthStatus::Unknown,
            last_checked: None,
        };

        // The reservation may have been drained by close_all while connecting
        let orphaned = {
            let mut slots = self.slots.write().await;
            match slots.get_mut(connection_id) {
                Some(slot) if matches!(slot, Slot::Reserved) => {
                    *slot = Slot::Live(record);
                    None
                }
                _ => Some(record),
            }
        };

        if let Some(record) = orphaned {
            record.pool.close().await;
            return Err(BrokerError::connection_failed(
                format!("Connection '{}' was cancelled during shutdown", connection_id),
                "Retry once the broker is running",
            ));
        }

        info!(connection_id = %connection_id, "Connected successfully");
        Ok(acknowledgement)
    }

    async fn release_reservation(&self, connection_id: &str) {
        let mut slots = self.slots.write().await;
        if matches!(slots.get(connection_id), Some(Slot::Reserved)) {
            slots.remove(connection_id);
        }
    }

    /// Remove a connection and close its pool.
    pub async fn disconnect(&self, connection_id: &str) -> BrokerResult<String> {
        let pool = self.detach(connection_id).await?;
        pool.close().await;
        Ok(format!("Connection '{}' disconnected", connection_id))
    }

    /// Remove a connection and hand its pool to the caller, who must close it.
    ///
    /// A still-reserved id is left in place and reported as not found.
    pub async fn detach(&self, connection_id: &str) -> BrokerResult<DbPool> {
        let record = {
            let mut slots = self.slots.write().await;
            match slots.remove(connection_id) {
                Some(Slot::Live(record)) => record,
                Some(Slot::Reserved) => {
                    // Still connecting; put the reservation back
                    slots.insert(connection_id.to_string(), Slot::Reserved);
                    return Err(BrokerError::connection_not_found(connection_id));
                }
                None => return Err(BrokerError::connection_not_found(connection_id)),
            }
        }; // Lock released here

        info!(
            connection_id = %connection_id,
            engine = %record.engine,
            "Closing connection"
        );
        Ok(record.pool)
    }

    async fn close_record(connection_id: &str, record: ConnectionRecord) {
        info!(
            connection_id = %connection_id,
            engine = %record.engine,
            "Closing connection"
        );
        record.pool.close().await;
    }

    /// Get the pool registered under `connection_id`.
    ///
    /// The returned handle is for the duration of one operation; resolve it
    /// again for the next one so a disconnect takes effect immediately.
    pub async fn get(&self, connection_id: &str) -> BrokerResult<DbPool> {
        let slots = self.slots.read().await;
        match slots.get(connection_id) {
            Some(Slot::Live(record)) => Ok(record.pool.clone()),
            _ => Err(BrokerError::connection_not_found(connection_id)),
        }
    }

    /// List all live connections (no secrets exposed).
    pub async fn list(&self) -> Vec<ConnectionSummary> {
        let slots = self.slots.read().await;
        let mut summaries: Vec<ConnectionSummary> = slots
            .iter()
            .filter_map(|(id, slot)| match slot {
                Slot::Live(record) => Some(ConnectionSummary {
                    conn_id: id.clone(),
                    db_type: record.engine,
                    status: record.health,
                    created_at: record.created_at,
                    last_checked: record.last_checked,
                }),
                Slot::Reserved => None,
            })
            .collect();
        summaries.sort_by(|a, b| a.conn_id.cmp(&b.conn_id));
        summaries
    }

    /// Ids of all live connections.
    pub async fn connection_ids(&self) -> Vec<String> {
        let slots = self.slots.read().await;
        slots
            .iter()
            .filter(|(_, slot)| matches!(slot, Slot::Live(_)))
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Get the number of live connections.
    pub async fn connection_count(&self) -> usize {
        let slots = self.slots.read().await;
        slots
            .values()
            .filter(|slot| matches!(slot, Slot::Live(_)))
            .count()
    }

    /// Get the last known health of a connection.
    pub async fn health(&self, connection_id: &str) -> BrokerResult<HealthStatus> {
        let slots = self.slots.read().await;
        match slots.get(connection_id) {
            Some(Slot::Live(record)) => Ok(record.health),
            _ => Err(BrokerError::connection_not_found(connection_id)),
        }
    }

    /// Store a probe result.
    ///
    /// Returns the transition if the health changed. Returns `None` when it did
    /// not, or when the connection was removed while the probe was running.
    pub async fn record_probe(
        &self,
        connection_id: &str,
        healthy: bool,
        at: DateTime<Utc>,
    ) -> Option<HealthTransition> {
        let mut slots = self.slots.write().await;
        let Some(Slot::Live(record)) = slots.get_mut(connection_id) else {
            debug!(connection_id = %connection_id, "Probe result for removed connection dropped");
            return None;
        };

        let next = HealthStatus::from_probe(healthy);
        let previous = record.health;
        record.health = next;
        record.last_checked = Some(at);

        (previous != next).then_some(HealthTransition {
            from: previous,
            to: next,
        })
    }

    /// Current status, used as the first event of a new subscription.
    ///
    /// With a filter the event describes that connection; a missing connection
    /// is reported as disconnected. Without one the event is connected if any
    /// connection is.
    pub async fn snapshot(&self, filter: Option<&str>, at: DateTime<Utc>) -> StatusEvent {
        let slots = self.slots.read().await;
        match filter {
            Some(connection_id) => {
                let (status, last_checked) = match slots.get(connection_id) {
                    Some(Slot::Live(record)) => (record.health.into(), record.last_checked),
                    _ => (LinkStatus::Disconnected, None),
                };
                StatusEvent {
                    status,
                    timestamp: at,
                    last_checked,
                    conn_id: Some(connection_id.to_string()),
                }
            }
            None => {
                let records = slots.values().filter_map(|slot| match slot {
                    Slot::Live(record) => Some(record),
                    Slot::Reserved => None,
                });
                let mut any_connected = false;
                let mut last_checked = None;
                for record in records {
                    any_connected |= record.health.is_connected();
                    last_checked = last_checked.max(record.last_checked);
                }
                StatusEvent {
                    status: if any_connected {
                        LinkStatus::Connected
                    } else {
                        LinkStatus::Disconnected
                    },
                    timestamp: at,
                    last_checked,
                    conn_id: None,
                }
            }
        }
    }

    /// Close all connections and clear the registry.
    pub async fn close_all(&self) {
        let drained: Vec<(String, Slot)> = {
            let mut slots = self.slots.write().await;
            slots.drain().collect()
        };
        for (id, slot) in drained {
            if let Slot::Live(record) = slot {
                Self::close_record(&id, record).await;
            }
        }
        info!("All connections closed");
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sqlite_params(dir: &TempDir, name: &str) -> ConnectParams {
        ConnectParams::sqlite(dir.path().join(name).to_string_lossy())
    }

    #[tokio::test]
    async fn test_registry_creation() {
        let registry = ConnectionRegistry::new();
        assert_eq!(registry.connection_count().await, 0);
        assert!(registry.list().await.is_empty());
    }

    #[tokio::test]
    async fn test_connection_not_found() {
        let registry = ConnectionRegistry::new();
        let result = registry.get("nonexistent").await;
        assert!(matches!(result, Err(BrokerError::ConnectionNotFound { .. })));
        let result = registry.disconnect("nonexistent").await;
        assert!(matches!(result, Err(BrokerError::ConnectionNotFound { .. })));
    }

    #[tokio::test]
    async fn test_empty_connection_id_rejected() {
        let dir = TempDir::new().unwrap();
        let registry = ConnectionRegistry::new();
        let result = registry
            .connect("  ", EngineKind::SQLite, &sqlite_params(&dir, "a.db"))
            .await;
        assert!(matches!(result, Err(BrokerError::MissingParameter { .. })));
    }

    #[tokio::test]
    async fn test_failed_connect_releases_id() {
        let dir = TempDir::new().unwrap();
        let registry = ConnectionRegistry::new();

        let result = registry
            .connect("a", EngineKind::MySQL, &ConnectParams::default())
            .await;
        assert!(matches!(result, Err(BrokerError::MissingParameter { .. })));

        registry
            .connect("a", EngineKind::SQLite, &sqlite_params(&dir, "a.db"))
            .await
            .unwrap();
        assert_eq!(registry.connection_count().await, 1);
        registry.close_all().await;
    }

    #[tokio::test]
    async fn test_record_probe_transitions() {
        let dir = TempDir::new().unwrap();
        let registry = ConnectionRegistry::new();
        registry
            .connect("a", EngineKind::SQLite, &sqlite_params(&dir, "a.db"))
            .await
            .unwrap();
        assert_eq!(registry.health("a").await.unwrap(), HealthStatus::Unknown);

        let now = Utc::now();
        let first = registry.record_probe("a", true, now).await;
        assert_eq!(
            first,
            Some(HealthTransition {
                from: HealthStatus::Unknown,
                to: HealthStatus::Connected
            })
        );
        assert_eq!(registry.record_probe("a", true, now).await, None);
        assert!(registry.record_probe("a", false, now).await.is_some());
        assert_eq!(
            registry.health("a").await.unwrap(),
            HealthStatus::Disconnected
        );

        registry.disconnect("a").await.unwrap();
        assert_eq!(registry.record_probe("a", true, now).await, None);
        assert!(matches!(
            registry.health("a").await,
            Err(BrokerError::ConnectionNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_snapshot() {
        let dir = TempDir::new().unwrap();
        let registry = ConnectionRegistry::new();
        let now = Utc::now();

        let empty = registry.snapshot(None, now).await;
        assert_eq!(empty.status, LinkStatus::Disconnected);
        assert!(empty.last_checked.is_none());

        registry
            .connect("a", EngineKind::SQLite, &sqlite_params(&dir, "a.db"))
            .await
            .unwrap();
        registry
            .connect("b", EngineKind::SQLite, &sqlite_params(&dir, "b.db"))
            .await
            .unwrap();
        registry.record_probe("b", true, now).await;

        let all = registry.snapshot(None, now).await;
        assert_eq!(all.status, LinkStatus::Connected);
        assert_eq!(all.last_checked, Some(now));
        assert!(all.conn_id.is_none());

        let only_a = registry.snapshot(Some("a"), now).await;
        assert_eq!(only_a.status, LinkStatus::Disconnected);
        assert_eq!(only_a.conn_id.as_deref(), Some("a"));

        let missing = registry.snapshot(Some("zzz"), now).await;
        assert_eq!(missing.status, LinkStatus::Disconnected);

        registry.close_all().await;
        assert_eq!(registry.connection_count().await, 0);
    }
}
