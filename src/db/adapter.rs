//! Engine adapters.
//!
//! Each supported engine is one variant of [`DbPool`]. The variant owns the
//! engine-specific pool (MySqlPool, PgPool, SqlitePool) and implements the four
//! adapter operations: open, execute, probe and close. Adding an engine means
//! adding a variant here; the registry never matches on engines.

use crate::config::PoolOptions;
use crate::db::types::{IntoCanonicalRow, Row};
use crate::error::{BrokerError, BrokerResult};
use crate::models::{ConnectParams, EngineKind};
use sqlx::{
    MySqlPool, PgPool, SqlitePool, mysql::MySqlConnectOptions, mysql::MySqlPoolOptions,
    postgres::PgConnectOptions, postgres::PgPoolOptions, sqlite::SqliteConnectOptions,
    sqlite::SqlitePoolOptions,
};
use tracing::{debug, warn};

/// Statement used for liveness checks on every engine.
const PROBE_SQL: &str = "SELECT 1";

/// Engine-specific connection pool.
///
/// Cloning is cheap: every clone refers to the same underlying pool.
#[derive(Debug, Clone)]
pub enum DbPool {
    MySql(MySqlPool),
    Postgres(PgPool),
    SQLite(SqlitePool),
}

impl DbPool {
    /// Open a pool for `engine`.
    ///
    /// Parameters are validated before any network access; a missing host,
    /// user, password or (for SQLite) database path fails with
    /// `MissingParameter`.
    pub async fn open(
        engine: EngineKind,
        params: &ConnectParams,
        pool_opts: &PoolOptions,
    ) -> BrokerResult<Self> {
        params.validate(engine)?;

        let is_sqlite = engine == EngineKind::SQLite;
        let max_connections = params
            .pool_size
            .filter(|size| *size > 0)
            .unwrap_or_else(|| pool_opts.max_connections_or_default(is_sqlite));
        let min_connections = pool_opts.min_connections_or_default(max_connections);
        let acquire_timeout = pool_opts.acquire_timeout();
        let idle_timeout = Some(pool_opts.idle_timeout());
        let test_before_acquire = pool_opts.test_before_acquire_or_default();

        debug!(
            engine = %engine,
            host = %params.host,
            database = ?params.database_name(),
            max_connections = max_connections,
            "Opening pool"
        );

        let connect_err = |e: sqlx::Error| {
            BrokerError::connection_failed(e.to_string(), connection_suggestion(engine, &e))
        };

        match engine {
            EngineKind::MySQL => {
                let mut options = MySqlConnectOptions::new()
                    .host(params.host.trim())
                    .port(params.port_or_default(engine))
                    .username(&params.user)
                    .password(&params.password)
                    .charset("utf8mb4");
                if let Some(db) = params.database_name() {
                    options = options.database(db);
                }

                let pool = MySqlPoolOptions::new()
                    .min_connections(min_connections)
                    .max_connections(max_connections)
                    .acquire_timeout(acquire_timeout)
                    .idle_timeout(idle_timeout)
                    .test_before_acquire(test_before_acquire)
                    .connect_with(options)
                    .await
                    .map_err(connect_err)?;
                Ok(DbPool::MySql(pool))
            }
            EngineKind::PostgreSQL => {
                let mut options = PgConnectOptions::new()
                    .host(params.host.trim())
                    .port(params.port_or_default(engine))
                    .username(&params.user)
                    .password(&params.password);
                if let Some(db) = params.database_name() {
                    options = options.database(db);
                }

                let pool = PgPoolOptions::new()
                    .min_connections(min_connections)
                    .max_connections(max_connections)
                    .acquire_timeout(acquire_timeout)
                    .idle_timeout(idle_timeout)
                    .test_before_acquire(test_before_acquire)
                    .connect_with(options)
                    .await
                    .map_err(connect_err)?;
                Ok(DbPool::Postgres(pool))
            }
            EngineKind::SQLite => {
                let path = params.database_name().unwrap_or_default();
                let options = SqliteConnectOptions::new()
                    .filename(path)
                    .create_if_missing(true);

                let pool = SqlitePoolOptions::new()
                    .min_connections(min_connections)
                    .max_connections(max_connections)
                    .acquire_timeout(acquire_timeout)
                    .idle_timeout(idle_timeout)
                    .test_before_acquire(test_before_acquire)
                    .connect_with(options)
                    .await
                    .map_err(connect_err)?;
                Ok(DbPool::SQLite(pool))
            }
        }
    }

    /// Get the engine kind of this pool.
    pub fn engine(&self) -> EngineKind {
        match self {
            DbPool::MySql(_) => EngineKind::MySQL,
            DbPool::Postgres(_) => EngineKind::PostgreSQL,
            DbPool::SQLite(_) => EngineKind::SQLite,
        }
    }

    /// Run statement text verbatim and convert every returned row.
    ///
    /// The text goes over the engine's simple-query path unprepared, so
    /// semicolon-separated statements run in order and rows from all of them
    /// are returned.
    pub async fn execute(&self, sql: &str) -> BrokerResult<Vec<Row>> {
        let rows: Vec<Row> = match self {
            DbPool::MySql(pool) => sqlx::raw_sql(sql)
                .fetch_all(pool)
                .await
                .map_err(BrokerError::from_query_error)?
                .iter()
                .map(IntoCanonicalRow::to_canonical)
                .collect(),
            DbPool::Postgres(pool) => sqlx::raw_sql(sql)
                .fetch_all(pool)
                .await
                .map_err(BrokerError::from_query_error)?
                .iter()
                .map(IntoCanonicalRow::to_canonical)
                .collect(),
            DbPool::SQLite(pool) => sqlx::raw_sql(sql)
                .fetch_all(pool)
                .await
                .map_err(BrokerError::from_query_error)?
                .iter()
                .map(IntoCanonicalRow::to_canonical)
                .collect(),
        };
        Ok(rows)
    }

    /// Cheap liveness check. A down or closed pool yields `false`, never an error.
    pub async fn probe(&self) -> bool {
        let result = match self {
            DbPool::MySql(pool) => sqlx::query(PROBE_SQL).execute(pool).await.map(|_| ()),
            DbPool::Postgres(pool) => sqlx::query(PROBE_SQL).execute(pool).await.map(|_| ()),
            DbPool::SQLite(pool) => sqlx::query(PROBE_SQL).execute(pool).await.map(|_| ()),
        };
        match result {
            Ok(()) => true,
            Err(e) => {
                debug!(engine = %self.engine(), error = %e, "Probe failed");
                false
            }
        }
    }

    /// Close the pool. Closing an already closed pool is a no-op.
    pub async fn close(&self) {
        match self {
            DbPool::MySql(pool) => pool.close().await,
            DbPool::Postgres(pool) => pool.close().await,
            DbPool::SQLite(pool) => pool.close().await,
        }
    }

    /// True once `close` has been called on any clone of this pool.
    pub fn is_closed(&self) -> bool {
        match self {
            DbPool::MySql(pool) => pool.is_closed(),
            DbPool::Postgres(pool) => pool.is_closed(),
            DbPool::SQLite(pool) => pool.is_closed(),
        }
    }

    /// Confirmation message for a freshly opened pool.
    pub async fn acknowledgement(&self) -> String {
        match self {
            DbPool::MySql(pool) => {
                match sqlx::query_scalar::<_, u64>("SELECT CONNECTION_ID()")
                    .fetch_one(pool)
                    .await
                {
                    Ok(thread_id) => format!("MySQL DB Connected with ThreadId {}", thread_id),
                    Err(e) => {
                        warn!(error = %e, "Failed to get connection thread id");
                        "MySQL DB Connected".to_string()
                    }
                }
            }
            DbPool::Postgres(_) => "PostgreSQL DB Connected".to_string(),
            DbPool::SQLite(_) => "SQLite DB Connected".to_string(),
        }
    }
}

/// Generate a helpful suggestion for connection errors.
fn connection_suggestion(engine: EngineKind, error: &sqlx::Error) -> String {
    let error_str = error.to_string().to_lowercase();

    if error_str.contains("connection refused") {
        return format!("Check that the {} server is running and accessible", engine);
    }

    if error_str.contains("authentication") || error_str.contains("password") {
        return "Verify the username and password".to_string();
    }

    if error_str.contains("does not exist") || error_str.contains("unknown database") {
        return "Check that the database name exists".to_string();
    }

    if error_str.contains("tls") || error_str.contains("ssl") {
        return "Check TLS/SSL configuration or try disabling it".to_string();
    }

    match engine {
        EngineKind::SQLite => {
            "Verify the file path is writable: database=path/to/db.sqlite".to_string()
        }
        _ => format!(
            "Verify host and port (default {}) are reachable",
            engine.default_port().unwrap_or_default()
        ),
    }
}
