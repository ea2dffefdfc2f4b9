//! Connection-related data models.
//!
//! This module defines the engine kinds the broker can open pools against,
//! the canonical connection parameters, and connection health.

use crate::error::BrokerError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Supported database engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    PostgreSQL,
    /// Includes MariaDB
    MySQL,
    SQLite,
}

impl EngineKind {
    /// Get the display name for this engine.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::PostgreSQL => "PostgreSQL",
            Self::MySQL => "MySQL",
            Self::SQLite => "SQLite",
        }
    }

    /// Get the default port for this engine.
    pub fn default_port(&self) -> Option<u16> {
        match self {
            Self::PostgreSQL => Some(5432),
            Self::MySQL => Some(3306),
            Self::SQLite => None,
        }
    }

    /// True for engines reached over the network with credentials.
    pub fn is_networked(&self) -> bool {
        !matches!(self, Self::SQLite)
    }
}

impl std::fmt::Display for EngineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl FromStr for EngineKind {
    type Err = BrokerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" => Err(BrokerError::missing_parameter("dbType")),
            "mysql" | "mariadb" => Ok(Self::MySQL),
            "postgresql" | "postgres" => Ok(Self::PostgreSQL),
            "sqlite" => Ok(Self::SQLite),
            _ => Err(BrokerError::unsupported_engine(s.trim())),
        }
    }
}

/// Canonical connection parameters handed to the driver adapter.
#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectParams {
    #[serde(default)]
    pub host: String,
    pub port: Option<u16>,
    #[serde(default)]
    pub user: String,
    /// Contains sensitive data - never log
    #[serde(default)]
    pub password: String,
    /// Database name; the database file path for SQLite.
    pub database: Option<String>,
    /// Upper bound for the pool size; falls back to the service default.
    pub pool_size: Option<u32>,
}

impl ConnectParams {
    /// Parameters for a networked engine.
    pub fn network(
        host: impl Into<String>,
        port: Option<u16>,
        user: impl Into<String>,
        password: impl Into<String>,
        database: Option<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            user: user.into(),
            password: password.into(),
            database,
            pool_size: None,
        }
    }

    /// Parameters for a file-backed SQLite database.
    pub fn sqlite(path: impl Into<String>) -> Self {
        Self {
            database: Some(path.into()),
            ..Default::default()
        }
    }

    /// Get the port, falling back to the engine default.
    pub fn port_or_default(&self, engine: EngineKind) -> u16 {
        self.port
            .or_else(|| engine.default_port())
            .unwrap_or_default()
    }

    /// The database name, if one was given and is not blank.
    pub fn database_name(&self) -> Option<&str> {
        self.database
            .as_deref()
            .map(str::trim)
            .filter(|db| !db.is_empty())
    }

    /// Check that the fields the engine needs are present.
    pub fn validate(&self, engine: EngineKind) -> Result<(), BrokerError> {
        if engine.is_networked() {
            for (name, value) in [
                ("host", &self.host),
                ("user", &self.user),
                ("password", &self.password),
            ] {
                if value.trim().is_empty() {
                    return Err(BrokerError::missing_parameter(name));
                }
            }
        } else if self.database_name().is_none() {
            return Err(BrokerError::missing_parameter("database"));
        }
        Ok(())
    }
}

impl std::fmt::Debug for ConnectParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectParams")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"****")
            .field("database", &self.database)
            .field("pool_size", &self.pool_size)
            .finish()
    }
}

/// Last known health of a registered connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Not probed yet
    #[default]
    Unknown,
    Connected,
    Disconnected,
}

impl HealthStatus {
    /// Health after a probe with the given outcome.
    pub fn from_probe(healthy: bool) -> Self {
        if healthy {
            Self::Connected
        } else {
            Self::Disconnected
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

/// Connection information returned by `list` (no secrets exposed).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSummary {
    pub conn_id: String,
    pub db_type: EngineKind,
    pub status: HealthStatus,
    pub created_at: DateTime<Utc>,
    pub last_checked: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_kind_from_str() {
        assert_eq!("mysql".parse::<EngineKind>().unwrap(), EngineKind::MySQL);
        assert_eq!("MariaDB".parse::<EngineKind>().unwrap(), EngineKind::MySQL);
        assert_eq!(
            "postgresql".parse::<EngineKind>().unwrap(),
            EngineKind::PostgreSQL
        );
        assert_eq!(
            "postgres".parse::<EngineKind>().unwrap(),
            EngineKind::PostgreSQL
        );
        assert_eq!(" sqlite ".parse::<EngineKind>().unwrap(), EngineKind::SQLite);
    }

    #[test]
    fn test_engine_kind_rejects_unknown() {
        assert!(matches!(
            "oracle".parse::<EngineKind>(),
            Err(BrokerError::UnsupportedEngine { .. })
        ));
        assert!(matches!(
            "".parse::<EngineKind>(),
            Err(BrokerError::MissingParameter { .. })
        ));
    }

    #[test]
    fn test_engine_kind_serde_lowercase() {
        let json = serde_json::to_string(&EngineKind::PostgreSQL).unwrap();
        assert_eq!(json, "\"postgresql\"");
    }

    #[test]
    fn test_default_ports() {
        let params = ConnectParams::network("localhost", None, "root", "secret", None);
        assert_eq!(params.port_or_default(EngineKind::MySQL), 3306);
        assert_eq!(params.port_or_default(EngineKind::PostgreSQL), 5432);

        let params = ConnectParams::network("localhost", Some(3307), "root", "secret", None);
        assert_eq!(params.port_or_default(EngineKind::MySQL), 3307);
    }

    #[test]
    fn test_validate_requires_credentials_for_network_engines() {
        let missing_password = ConnectParams::network("localhost", None, "root", "", None);
        let err = missing_password.validate(EngineKind::MySQL).unwrap_err();
        assert_eq!(err.to_string(), "Missing parameter: password");

        let missing_host = ConnectParams::network(" ", None, "root", "pw", None);
        let err = missing_host.validate(EngineKind::PostgreSQL).unwrap_err();
        assert_eq!(err.to_string(), "Missing parameter: host");
    }

    #[test]
    fn test_validate_sqlite_requires_path() {
        let params = ConnectParams::default();
        assert!(matches!(
            params.validate(EngineKind::SQLite),
            Err(BrokerError::MissingParameter { .. })
        ));
        assert!(
            ConnectParams::sqlite("/tmp/data.db")
                .validate(EngineKind::SQLite)
                .is_ok()
        );
    }

    #[test]
    fn test_debug_masks_password() {
        let params = ConnectParams::network("localhost", None, "root", "hunter2", None);
        let debug = format!("{:?}", params);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("****"));
    }

    #[test]
    fn test_health_from_probe() {
        assert_eq!(HealthStatus::from_probe(true), HealthStatus::Connected);
        assert_eq!(HealthStatus::from_probe(false), HealthStatus::Disconnected);
        assert_eq!(HealthStatus::default(), HealthStatus::Unknown);
        assert!(!HealthStatus::Unknown.is_connected());
    }
}
