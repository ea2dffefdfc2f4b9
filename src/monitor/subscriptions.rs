//! Subscription registry for status notifications.
//!
//! One subscription per user id. Each subscription owns the sending half of a
//! bounded channel; the transport drains the receiving half into its socket.
//! A subscriber whose channel is closed or full is dropped on the next push.

use crate::db::ConnectionRegistry;
use crate::error::{BrokerError, BrokerResult};
use crate::models::StatusEvent;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Sending half of a subscriber's event channel.
pub type EventSender = mpsc::Sender<StatusEvent>;

#[derive(Debug)]
struct Subscription {
    id: Uuid,
    sender: EventSender,
    filter: Option<String>,
}

/// Registry of live status subscriptions keyed by user id.
#[derive(Debug, Clone)]
pub struct SubscriptionRegistry {
    entries: Arc<RwLock<HashMap<String, Subscription>>>,
    connections: Arc<ConnectionRegistry>,
}

impl SubscriptionRegistry {
    /// Create a registry that reads snapshots from `connections`.
    pub fn new(connections: Arc<ConnectionRegistry>) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            connections,
        }
    }

    /// Register `sender` for `user_id`, replacing any previous subscription.
    ///
    /// The current status snapshot is delivered before the subscription becomes
    /// visible to broadcasts, so it is always the first event on the channel.
    /// Dropping the replaced sender ends the old channel.
    pub async fn subscribe(
        &self,
        user_id: &str,
        sender: EventSender,
        filter: Option<String>,
    ) -> BrokerResult<Uuid> {
        if user_id.trim().is_empty() {
            return Err(BrokerError::missing_parameter("userId"));
        }

        let mut entries = self.entries.write().await;

        let snapshot = self.connections.snapshot(filter.as_deref(), Utc::now()).await;
        if sender.try_send(snapshot).is_err() {
            return Err(BrokerError::internal(format!(
                "Subscriber channel for user '{}' closed before the snapshot was sent",
                user_id
            )));
        }

        let id = Uuid::new_v4();
        let previous = entries.insert(
            user_id.to_string(),
            Subscription {
                id,
                sender,
                filter: filter.clone(),
            },
        );

        if let Some(previous) = previous {
            info!(
                user_id = %user_id,
                replaced = %previous.id,
                "Replaced existing subscription"
            );
        }
        info!(
            user_id = %user_id,
            subscription_id = %id,
            conn_id = ?filter,
            "Subscription registered"
        );

        Ok(id)
    }

    /// Remove the subscription for `user_id`. Unknown ids are ignored.
    pub async fn unsubscribe(&self, user_id: &str) {
        let removed = self.entries.write().await.remove(user_id);
        if let Some(subscription) = removed {
            info!(
                user_id = %user_id,
                subscription_id = %subscription.id,
                "Subscription removed"
            );
        }
    }

    /// Remove the subscription for `user_id` only if it is still `subscription_id`.
    ///
    /// Used when a channel ends, so a newer subscription for the same user is
    /// left alone.
    pub async fn release(&self, user_id: &str, subscription_id: Uuid) -> bool {
        let mut entries = self.entries.write().await;
        match entries.get(user_id) {
            Some(subscription) if subscription.id == subscription_id => {
                entries.remove(user_id);
                debug!(
                    user_id = %user_id,
                    subscription_id = %subscription_id,
                    "Subscription released"
                );
                true
            }
            _ => false,
        }
    }

    /// Deliver `event` to one user.
    ///
    /// Returns false if the user has no subscription or its channel failed; a
    /// failed channel is unsubscribed.
    pub async fn push(&self, user_id: &str, event: StatusEvent) -> bool {
        let target = {
            let entries = self.entries.read().await;
            entries
                .get(user_id)
                .map(|subscription| (subscription.id, subscription.sender.clone()))
        };

        let Some((id, sender)) = target else {
            return false;
        };

        match sender.try_send(event) {
            Ok(()) => true,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Dropping unreachable subscriber");
                self.release(user_id, id).await;
                false
            }
        }
    }

    /// Deliver `event` to every subscription whose filter matches it.
    ///
    /// Returns the number of subscribers reached. Subscribers whose channel
    /// failed are removed.
    pub async fn broadcast(&self, event: &StatusEvent) -> usize {
        let targets: Vec<(String, Uuid, EventSender)> = {
            let entries = self.entries.read().await;
            entries
                .iter()
                .filter(|(_, subscription)| event.matches(subscription.filter.as_deref()))
                .map(|(user_id, subscription)| {
                    (user_id.clone(), subscription.id, subscription.sender.clone())
                })
                .collect()
        };

        let mut delivered = 0;
        let mut failed = Vec::new();
        for (user_id, id, sender) in targets {
            match sender.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!(user_id = %user_id, error = %e, "Dropping unreachable subscriber");
                    failed.push((user_id, id));
                }
            }
        }

        for (user_id, id) in failed {
            self.release(&user_id, id).await;
        }

        debug!(
            status = ?event.status,
            conn_id = ?event.conn_id,
            delivered = delivered,
            "Status event broadcast"
        );
        delivered
    }

    /// Get the number of live subscriptions.
    pub async fn count(&self) -> usize {
        self.entries.read().await.len()
    }

    /// True if `user_id` currently has a subscription.
    pub async fn is_subscribed(&self, user_id: &str) -> bool {
        self.entries.read().await.contains_key(user_id)
    }
}
