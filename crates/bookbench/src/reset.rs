//! Schema reset between benchmark groups.

use std::time::Duration;

use sqlx::{Connection, PgConnection};

use crate::config::{BenchConfig, DEFAULT_CONNECT_TIMEOUT_SECS};
use crate::error::{Error, Result};
use crate::strategy::current_thread_runtime;

/// Drops and recreates `books` and `price_policies`.
pub const RECREATE_SCHEMA_SQL: &str = include_str!("../sql/recreate.sql");

/// Restores the store to an empty, unfragmented state.
pub trait SchemaReset {
    fn reset(&self) -> Result<()>;
}

/// Runs [`RECREATE_SCHEMA_SQL`] over a dedicated PostgreSQL connection.
///
/// Opening the connection is bounded by `timeout`; a store that accepts the
/// socket but never answers fails the reset instead of stalling the run.
pub struct PostgresReset {
    dsn: String,
    timeout: Duration,
}

impl PostgresReset {
    pub fn new(dsn: impl Into<String>) -> Self {
        Self {
            dsn: dsn.into(),
            timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }

    /// Reset the store the strategies connect to, with the same timeout.
    pub fn from_config(config: &BenchConfig) -> Self {
        Self::new(config.dsn.clone()).with_timeout(config.connect_timeout)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl SchemaReset for PostgresReset {
    fn reset(&self) -> Result<()> {
        let rt = current_thread_runtime()?;
        rt.block_on(async {
            let mut conn = tokio::time::timeout(self.timeout, PgConnection::connect(&self.dsn))
                .await
                .map_err(|_| {
                    Error::Reset(format!(
                        "connect timed out after {}",
                        humantime::format_duration(self.timeout)
                    ))
                })?
                .map_err(|e| Error::Reset(format!("connect: {}", e)))?;
            sqlx::raw_sql(RECREATE_SCHEMA_SQL)
                .execute(&mut conn)
                .await
                .map_err(|e| Error::Reset(e.to_string()))?;
            conn.close()
                .await
                .map_err(|e| Error::Reset(format!("close: {}", e)))
        })?;
        tracing::debug!("schema recreated");
        Ok(())
    }
}
