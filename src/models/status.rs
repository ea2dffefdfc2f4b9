//! Status events pushed to subscribers.

use crate::models::HealthStatus;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};

/// Connection status as reported on the notification channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkStatus {
    Connected,
    Disconnected,
}

impl From<HealthStatus> for LinkStatus {
    /// A connection that has not been probed yet is not reported as connected.
    fn from(health: HealthStatus) -> Self {
        match health {
            HealthStatus::Connected => Self::Connected,
            HealthStatus::Disconnected | HealthStatus::Unknown => Self::Disconnected,
        }
    }
}

/// A point-in-time connection status fact. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEvent {
    pub status: LinkStatus,
    #[serde(serialize_with = "iso_millis")]
    pub timestamp: DateTime<Utc>,
    #[serde(serialize_with = "iso_millis_opt")]
    pub last_checked: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conn_id: Option<String>,
}

impl StatusEvent {
    /// Event for a probe result on one connection.
    pub fn probed(connection_id: impl Into<String>, health: HealthStatus, at: DateTime<Utc>) -> Self {
        Self {
            status: health.into(),
            timestamp: at,
            last_checked: Some(at),
            conn_id: Some(connection_id.into()),
        }
    }

    /// Event for a connection that was explicitly torn down.
    pub fn closed(connection_id: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            status: LinkStatus::Disconnected,
            timestamp: at,
            last_checked: None,
            conn_id: Some(connection_id.into()),
        }
    }

    /// True if a subscription with this filter should receive the event.
    pub fn matches(&self, filter: Option<&str>) -> bool {
        match filter {
            None => true,
            Some(id) => self.conn_id.as_deref() == Some(id),
        }
    }

    /// Serialize to the JSON text frame sent over the channel.
    pub fn to_json(&self) -> String {
        // Only plain strings and timestamps inside; serialization cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

fn iso_millis<S: Serializer>(at: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&at.to_rfc3339_opts(SecondsFormat::Millis, true))
}

fn iso_millis_opt<S: Serializer>(
    at: &Option<DateTime<Utc>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match at {
        Some(at) => iso_millis(at, serializer),
        None => serializer.serialize_none(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap()
    }

    #[test]
    fn test_probe_event_payload() {
        let event = StatusEvent::probed("a", HealthStatus::Connected, at());
        let json: serde_json::Value = serde_json::from_str(&event.to_json()).unwrap();
        assert_eq!(json["status"], "connected");
        assert_eq!(json["timestamp"], "2024-05-01T12:30:00.000Z");
        assert_eq!(json["lastChecked"], "2024-05-01T12:30:00.000Z");
        assert_eq!(json["connId"], "a");
    }

    #[test]
    fn test_payload_without_conn_id_or_last_checked() {
        let event = StatusEvent {
            status: LinkStatus::Disconnected,
            timestamp: at(),
            last_checked: None,
            conn_id: None,
        };
        let json: serde_json::Value = serde_json::from_str(&event.to_json()).unwrap();
        assert_eq!(json["status"], "disconnected");
        assert!(json["lastChecked"].is_null());
        assert!(json.get("connId").is_none());
    }

    #[test]
    fn test_unknown_health_reported_as_disconnected() {
        assert_eq!(LinkStatus::from(HealthStatus::Unknown), LinkStatus::Disconnected);
    }

    #[test]
    fn test_filter_matching() {
        let event = StatusEvent::closed("a", at());
        assert!(event.matches(None));
        assert!(event.matches(Some("a")));
        assert!(!event.matches(Some("b")));
    }
}
