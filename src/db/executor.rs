//! Query execution against named connections.
//!
//! The executor resolves a connection id to its pool on every call and passes
//! the statement through verbatim. Statement construction and sanitization
//! belong to the caller.

use crate::db::registry::ConnectionRegistry;
use crate::db::types::Row;
use crate::error::{BrokerError, BrokerResult};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Query executor bound to a connection registry.
#[derive(Debug, Clone)]
pub struct QueryExecutor {
    registry: Arc<ConnectionRegistry>,
}

impl QueryExecutor {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Run `sql` on the connection registered as `connection_id`.
    ///
    /// Fails with `ConnectionNotFound` if the id is unknown and with
    /// `QueryExecution` if the engine rejects the statement.
    pub async fn run(&self, connection_id: &str, sql: &str) -> BrokerResult<Vec<Row>> {
        if sql.trim().is_empty() {
            return Err(BrokerError::missing_parameter("query"));
        }

        let pool = self.registry.get(connection_id).await?;
        let start = Instant::now();

        debug!(
            connection_id = %connection_id,
            engine = %pool.engine(),
            sql = %sql,
            "Executing query"
        );

        match pool.execute(sql).await {
            Ok(rows) => {
                debug!(
                    connection_id = %connection_id,
                    row_count = rows.len(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Query completed"
                );
                Ok(rows)
            }
            Err(e) => {
                warn!(connection_id = %connection_id, error = %e, "Query execution failed");
                Err(e)
            }
        }
    }
}
