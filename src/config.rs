//! Configuration handling for the connection broker.
//!
//! This module provides configuration management via CLI arguments and environment variables.

use clap::Parser;
use std::time::Duration;

pub const DEFAULT_HTTP_HOST: &str = "127.0.0.1";
pub const DEFAULT_HTTP_PORT: u16 = 8080;
pub const DEFAULT_API_PREFIX: &str = "/api";
pub const DEFAULT_WS_PATH: &str = "/ws";
pub const DEFAULT_PROBE_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 16;

// Pool configuration defaults
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_MAX_CONNECTIONS_SQLITE: u32 = 1;
pub const DEFAULT_MIN_CONNECTIONS: u32 = 1;
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 30;

/// Connection pool configuration shared by every pool the broker opens.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct PoolOptions {
    /// Maximum connections in pool (default: 10 for MySQL/PostgreSQL, 1 for SQLite)
    pub max_connections: Option<u32>,
    /// Minimum connections in pool (default: 1)
    pub min_connections: Option<u32>,
    /// Idle timeout in seconds (default: 600)
    pub idle_timeout_secs: Option<u64>,
    /// Connection acquire timeout in seconds (default: 30)
    pub acquire_timeout_secs: Option<u64>,
    /// Whether to test connections before use (default: true)
    pub test_before_acquire: Option<bool>,
}

impl PoolOptions {
    /// Get max_connections with default value based on database type.
    pub fn max_connections_or_default(&self, is_sqlite: bool) -> u32 {
        self.max_connections.unwrap_or(if is_sqlite {
            DEFAULT_MAX_CONNECTIONS_SQLITE
        } else {
            DEFAULT_MAX_CONNECTIONS
        })
    }

    /// Get min_connections with default value, never above the pool's maximum.
    pub fn min_connections_or_default(&self, max_connections: u32) -> u32 {
        self.min_connections
            .unwrap_or(DEFAULT_MIN_CONNECTIONS)
            .min(max_connections)
    }

    /// Get idle_timeout with default value.
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs.unwrap_or(DEFAULT_IDLE_TIMEOUT_SECS))
    }

    /// Get acquire_timeout with default value.
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(
            self.acquire_timeout_secs
                .unwrap_or(DEFAULT_ACQUIRE_TIMEOUT_SECS),
        )
    }

    /// Get test_before_acquire with default value.
    pub fn test_before_acquire_or_default(&self) -> bool {
        self.test_before_acquire.unwrap_or(true)
    }

    /// Validate pool options and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(max) = self.max_connections {
            if max == 0 {
                return Err("max_connections must be greater than 0".to_string());
            }
        }
        if let Some(min) = self.min_connections {
            if min == 0 {
                return Err("min_connections must be greater than 0".to_string());
            }
            if let Some(max) = self.max_connections {
                if min > max {
                    return Err(format!(
                        "min_connections ({}) cannot exceed max_connections ({})",
                        min, max
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Configuration for the connection broker.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "db-broker",
    about = "Multi-tenant database connection broker with live connection-health notifications",
    version,
    author
)]
pub struct Config {
    /// HTTP host to bind to
    #[arg(long, default_value = DEFAULT_HTTP_HOST, env = "BROKER_HTTP_HOST")]
    pub http_host: String,

    /// HTTP port to bind to
    #[arg(long, default_value_t = DEFAULT_HTTP_PORT, env = "HTTP_PORT")]
    pub http_port: u16,

    /// Path prefix for the connect/disconnect/query endpoints
    #[arg(long, default_value = DEFAULT_API_PREFIX, env = "BROKER_API_PREFIX")]
    pub api_prefix: String,

    /// Path of the WebSocket status channel
    #[arg(long, default_value = DEFAULT_WS_PATH, env = "BROKER_WS_PATH")]
    pub ws_path: String,

    /// Seconds between connection health probes
    #[arg(
        long = "probe-interval",
        default_value_t = DEFAULT_PROBE_INTERVAL_SECS,
        env = "BROKER_PROBE_INTERVAL"
    )]
    pub probe_interval_secs: u64,

    /// Status events buffered per subscriber before it is dropped as unready
    #[arg(
        long,
        default_value_t = DEFAULT_SUBSCRIBER_BUFFER,
        env = "BROKER_SUBSCRIBER_BUFFER"
    )]
    pub subscriber_buffer: usize,

    /// Maximum connections per pool (SQLite pools default to 1)
    #[arg(long, env = "BROKER_MAX_CONNECTIONS")]
    pub max_connections: Option<u32>,

    /// Minimum connections kept open per pool
    #[arg(long, env = "BROKER_MIN_CONNECTIONS")]
    pub min_connections: Option<u32>,

    /// Idle timeout for pooled connections, in seconds
    #[arg(long = "idle-timeout", env = "BROKER_IDLE_TIMEOUT")]
    pub idle_timeout_secs: Option<u64>,

    /// Pool acquire timeout, in seconds
    #[arg(long = "acquire-timeout", env = "BROKER_ACQUIRE_TIMEOUT")]
    pub acquire_timeout_secs: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "BROKER_LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "BROKER_JSON_LOGS")]
    pub json_logs: bool,
}

impl Config {
    /// Parse configuration from command line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Create a default configuration (useful for testing).
    pub fn default_config() -> Self {
        Self {
            http_host: DEFAULT_HTTP_HOST.to_string(),
            http_port: DEFAULT_HTTP_PORT,
            api_prefix: DEFAULT_API_PREFIX.to_string(),
            ws_path: DEFAULT_WS_PATH.to_string(),
            probe_interval_secs: DEFAULT_PROBE_INTERVAL_SECS,
            subscriber_buffer: DEFAULT_SUBSCRIBER_BUFFER,
            max_connections: None,
            min_connections: None,
            idle_timeout_secs: None,
            acquire_timeout_secs: None,
            log_level: "info".to_string(),
            json_logs: false,
        }
    }

    /// Collect the pool settings into validated pool options.
    pub fn pool_options(&self) -> Result<PoolOptions, String> {
        let options = PoolOptions {
            max_connections: self.max_connections,
            min_connections: self.min_connections,
            idle_timeout_secs: self.idle_timeout_secs,
            acquire_timeout_secs: self.acquire_timeout_secs,
            test_before_acquire: None,
        };
        options.validate()?;
        Ok(options)
    }

    /// Get the HTTP bind address.
    pub fn http_bind_addr(&self) -> String {
        format!("{}:{}", self.http_host, self.http_port)
    }

    /// Get the probe interval as a Duration.
    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs.max(1))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}
