//! Integration tests for status subscriptions.
//!
//! Tests verify that:
//! - A new subscription receives a snapshot before any probe runs
//! - Each health transition reaches every matching subscriber exactly once
//! - Re-subscribing detaches the previous channel

use db_broker::Broker;
use db_broker::models::{ConnectParams, LinkStatus, StatusEvent};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;

fn sqlite(dir: &TempDir, name: &str) -> ConnectParams {
    ConnectParams::sqlite(dir.path().join(name).to_string_lossy())
}

/// Broker whose background monitor would not fire during a test.
fn quiet_broker() -> Broker {
    Broker::new(Default::default(), Duration::from_secs(3600))
}

fn drain(rx: &mut mpsc::Receiver<StatusEvent>) -> Vec<StatusEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_snapshot_before_any_probe() {
    let dir = TempDir::new().unwrap();
    let broker = quiet_broker();
    broker
        .connect("a", "sqlite", &sqlite(&dir, "a.db"))
        .await
        .unwrap();

    let (tx, mut rx) = mpsc::channel(8);
    broker
        .subscribe("u1", tx, Some("a".to_string()))
        .await
        .unwrap();

    let events = drain(&mut rx);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].status, LinkStatus::Connected);
    assert_eq!(events[0].conn_id.as_deref(), Some("a"));
    assert!(events[0].last_checked.is_some());

    let json: serde_json::Value = serde_json::from_str(&events[0].to_json()).unwrap();
    assert_eq!(json["status"], "connected");
    assert!(json["timestamp"].as_str().unwrap().ends_with('Z'));

    broker.close_all().await;
}

#[tokio::test]
async fn test_transition_reaches_each_matching_subscriber_once() {
    let dir = TempDir::new().unwrap();
    let broker = quiet_broker();
    broker
        .connect("a", "sqlite", &sqlite(&dir, "a.db"))
        .await
        .unwrap();
    broker
        .connect("b", "sqlite", &sqlite(&dir, "b.db"))
        .await
        .unwrap();

    let (all_tx, mut all_rx) = mpsc::channel(8);
    let (a_tx, mut a_rx) = mpsc::channel(8);
    let (b_tx, mut b_rx) = mpsc::channel(8);
    broker.subscribe("all", all_tx, None).await.unwrap();
    broker
        .subscribe("watch-a", a_tx, Some("a".to_string()))
        .await
        .unwrap();
    broker
        .subscribe("watch-b", b_tx, Some("b".to_string()))
        .await
        .unwrap();
    drain(&mut all_rx);
    drain(&mut a_rx);
    drain(&mut b_rx);

    // No transition, no event
    assert_eq!(broker.monitor().probe_all().await, 0);
    assert!(drain(&mut all_rx).is_empty());

    // Kill the pool behind "a"
    broker.connections().get("a").await.unwrap().close().await;
    assert_eq!(broker.monitor().probe_all().await, 1);

    let all = drain(&mut all_rx);
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].status, LinkStatus::Disconnected);
    assert_eq!(all[0].conn_id.as_deref(), Some("a"));

    assert_eq!(drain(&mut a_rx).len(), 1);
    assert!(drain(&mut b_rx).is_empty());

    // Still down: nothing new
    assert_eq!(broker.monitor().probe_all().await, 0);
    assert!(drain(&mut a_rx).is_empty());

    broker.close_all().await;
}

#[tokio::test]
async fn test_resubscribe_detaches_previous_channel() {
    let dir = TempDir::new().unwrap();
    let broker = quiet_broker();

    let (old_tx, mut old_rx) = mpsc::channel(8);
    let (new_tx, mut new_rx) = mpsc::channel(8);
    broker.subscribe("u1", old_tx, None).await.unwrap();
    broker.subscribe("u1", new_tx, None).await.unwrap();
    assert_eq!(broker.subscriptions().count().await, 1);

    broker
        .connect("a", "sqlite", &sqlite(&dir, "a.db"))
        .await
        .unwrap();

    // Old channel got its snapshot, then was closed
    assert!(old_rx.recv().await.is_some());
    assert!(old_rx.recv().await.is_none());

    let events = drain(&mut new_rx);
    assert_eq!(events.len(), 2);
    assert!(events[0].conn_id.is_none());
    assert_eq!(events[1].status, LinkStatus::Connected);

    broker.close_all().await;
}

#[tokio::test]
async fn test_disconnect_is_announced() {
    let dir = TempDir::new().unwrap();
    let broker = quiet_broker();
    broker
        .connect("a", "sqlite", &sqlite(&dir, "a.db"))
        .await
        .unwrap();

    let (tx, mut rx) = mpsc::channel(8);
    broker
        .subscribe("u1", tx, Some("a".to_string()))
        .await
        .unwrap();
    drain(&mut rx);

    broker.disconnect("a").await.unwrap();
    let events = drain(&mut rx);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].status, LinkStatus::Disconnected);

    // Probing after removal is a no-op
    assert!(!broker.monitor().probe_connection("a").await);
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn test_dropped_receiver_is_unsubscribed() {
    let dir = TempDir::new().unwrap();
    let broker = quiet_broker();

    let (tx, rx) = mpsc::channel(8);
    broker.subscribe("gone", tx, None).await.unwrap();
    drop(rx);

    broker
        .connect("a", "sqlite", &sqlite(&dir, "a.db"))
        .await
        .unwrap();
    assert_eq!(broker.subscriptions().count().await, 0);

    broker.close_all().await;
}
