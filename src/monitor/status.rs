//! Periodic health probing of registered connections.

use crate::db::ConnectionRegistry;
use crate::error::BrokerResult;
use crate::models::StatusEvent;
use crate::monitor::SubscriptionRegistry;
use chrono::Utc;
use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Probes every registered connection on a fixed interval and broadcasts
/// health transitions to subscribers.
///
/// Recording a result and broadcasting it happen under `emit_gate`, as do
/// removal and its closing event, so subscribers see events for one id in
/// the order the registry changed.
#[derive(Debug)]
pub struct StatusMonitor {
    connections: Arc<ConnectionRegistry>,
    subscriptions: Arc<SubscriptionRegistry>,
    interval: Duration,
    emit_gate: Mutex<()>,
}

impl StatusMonitor {
    pub fn new(
        connections: Arc<ConnectionRegistry>,
        subscriptions: Arc<SubscriptionRegistry>,
        interval: Duration,
    ) -> Self {
        Self {
            connections,
            subscriptions,
            interval,
            emit_gate: Mutex::new(()),
        }
    }

    /// Get the probe interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Probe one connection and broadcast if its health changed.
    ///
    /// Returns true if a transition was observed. Unknown ids and connections
    /// removed mid-probe yield false.
    pub async fn probe_connection(&self, connection_id: &str) -> bool {
        let Ok(pool) = self.connections.get(connection_id).await else {
            return false;
        };

        let healthy = pool.probe().await;
        let at = Utc::now();

        // Not held across the round trip
        let _gate = self.emit_gate.lock().await;
        // Registry lock is released before subscribers are touched
        let Some(transition) = self
            .connections
            .record_probe(connection_id, healthy, at)
            .await
        else {
            return false;
        };

        info!(
            connection_id = %connection_id,
            from = ?transition.from,
            to = ?transition.to,
            "Connection health changed"
        );
        self.subscriptions
            .broadcast(&StatusEvent::probed(connection_id, transition.to, at))
            .await;
        true
    }

    /// Unregister a connection, announce it as disconnected, then close its pool.
    ///
    /// A health event already recorded for the id is delivered before the
    /// closing event, and none can follow it.
    pub async fn retire(&self, connection_id: &str) -> BrokerResult<String> {
        let pool = {
            let _gate = self.emit_gate.lock().await;
            let pool = self.connections.detach(connection_id).await?;
            self.subscriptions
                .broadcast(&StatusEvent::closed(connection_id, Utc::now()))
                .await;
            pool
        };
        pool.close().await;
        Ok(format!("Connection '{}' disconnected", connection_id))
    }

    /// Probe all connections concurrently. Returns the number of transitions.
    pub async fn probe_all(&self) -> usize {
        let ids = self.connections.connection_ids().await;
        if ids.is_empty() {
            return 0;
        }

        let results = join_all(ids.iter().map(|id| self.probe_connection(id))).await;
        let transitions = results.into_iter().filter(|changed| *changed).count();

        debug!(
            probed = ids.len(),
            transitions = transitions,
            "Probe cycle complete"
        );
        transitions
    }

    /// Start the background probe loop.
    ///
    /// The loop runs until the returned handle is aborted.
    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        info!(
            interval_secs = self.interval.as_secs(),
            "Starting status monitor"
        );
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                self.probe_all().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ConnectParams, EngineKind, HealthStatus, LinkStatus};
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    struct Fixture {
        dir: TempDir,
        connections: Arc<ConnectionRegistry>,
        subscriptions: Arc<SubscriptionRegistry>,
        monitor: Arc<StatusMonitor>,
    }

    async fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let connections = Arc::new(ConnectionRegistry::new());
        connections
            .connect(
                "a",
                EngineKind::SQLite,
                &ConnectParams::sqlite(dir.path().join("a.db").to_string_lossy()),
            )
            .await
            .unwrap();
        let subscriptions = Arc::new(SubscriptionRegistry::new(connections.clone()));
        let monitor = Arc::new(StatusMonitor::new(
            connections.clone(),
            subscriptions.clone(),
            Duration::from_secs(1),
        ));
        Fixture {
            dir,
            connections,
            subscriptions,
            monitor,
        }
    }

    #[tokio::test]
    async fn test_one_event_per_transition() {
        let f = fixture().await;
        let (tx, mut rx) = mpsc::channel(8);
        f.subscriptions
            .subscribe("u1", tx, Some("a".to_string()))
            .await
            .unwrap();

        let snapshot = rx.try_recv().unwrap();
        assert_eq!(snapshot.status, LinkStatus::Disconnected);

        assert_eq!(f.monitor.probe_all().await, 1);
        let event = rx.try_recv().unwrap();
        assert_eq!(event.status, LinkStatus::Connected);
        assert_eq!(event.conn_id.as_deref(), Some("a"));
        assert!(event.last_checked.is_some());

        // Steady state: no events
        assert_eq!(f.monitor.probe_all().await, 0);
        assert!(rx.try_recv().is_err());

        // Pool goes away underneath the record
        f.connections.get("a").await.unwrap().close().await;
        assert!(f.monitor.probe_connection("a").await);
        let event = rx.try_recv().unwrap();
        assert_eq!(event.status, LinkStatus::Disconnected);
        assert_eq!(
            f.connections.health("a").await.unwrap(),
            HealthStatus::Disconnected
        );

        assert!(!f.monitor.probe_connection("a").await);
        assert!(rx.try_recv().is_err());

        f.connections.close_all().await;
    }

    #[tokio::test]
    async fn test_unknown_connection_is_ignored() {
        let f = fixture().await;
        assert!(!f.monitor.probe_connection("missing").await);
        f.connections.close_all().await;
        assert_eq!(f.monitor.probe_all().await, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_closing_event_is_never_overtaken() {
        let f = fixture().await;
        let (tx, mut rx) = mpsc::channel(64);
        f.subscriptions
            .subscribe("u1", tx, Some("a".to_string()))
            .await
            .unwrap();

        for round in 0..25 {
            if round > 0 {
                f.connections
                    .connect(
                        "a",
                        EngineKind::SQLite,
                        &ConnectParams::sqlite(
                            f.dir.path().join(format!("a{round}.db")).to_string_lossy(),
                        ),
                    )
                    .await
                    .unwrap();
            }

            let checker = {
                let monitor = f.monitor.clone();
                tokio::spawn(async move { monitor.probe_connection("a").await })
            };
            tokio::task::yield_now().await;
            f.monitor.retire("a").await.unwrap();
            checker.await.unwrap();

            let mut last = None;
            while let Ok(event) = rx.try_recv() {
                last = Some(event);
            }
            let last = last.unwrap();
            assert_eq!(last.status, LinkStatus::Disconnected, "round {round}");
            assert!(last.last_checked.is_none(), "round {round}");
        }

        // Nothing arrives once the id is gone
        assert!(!f.monitor.probe_connection("a").await);
        assert!(rx.try_recv().is_err());
        assert!(matches!(
            f.monitor.retire("a").await,
            Err(crate::error::BrokerError::ConnectionNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_background_loop_probes() {
        let f = fixture().await;
        let handle = f.monitor.clone().start();

        let mut healthy = false;
        for _ in 0..50 {
            if f.connections.health("a").await.unwrap() == HealthStatus::Connected {
                healthy = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        handle.abort();
        assert!(healthy);
        f.connections.close_all().await;
    }
}
