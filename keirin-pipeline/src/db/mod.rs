//! Database access: pooled connections, deadlock-aware retry, transaction
//! scope, and the canonical table lock order.

pub mod models;
pub mod queries;

use std::time::Duration;

use sqlx::mysql::{MySqlConnectOptions, MySqlDatabaseError, MySqlPool, MySqlPoolOptions};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::{LockOrderConfig, MysqlConfig};

/// MySQL error numbers worth retrying: deadlock and lock-wait timeout.
pub const DEADLOCK_ERRNO: u16 = 1213;
pub const LOCK_WAIT_TIMEOUT_ERRNO: u16 = 1205;

const MAX_RETRY_ATTEMPTS: u32 = 3;
const RETRY_DELAY_BASE_SECS: f64 = 0.5;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

pub type DbResult<T> = Result<T, DbError>;

/// Shared handle to the store. All reads and writes go through here so the
/// retry policy and lock-order discipline apply uniformly.
pub struct DbAccessor {
    pool: MySqlPool,
    lock_order: Vec<String>,
}

impl DbAccessor {
    pub async fn connect(mysql: &MysqlConfig, lock_order: &LockOrderConfig) -> DbResult<Self> {
        let options = MySqlConnectOptions::new()
            .host(&mysql.host)
            .port(mysql.port)
            .username(&mysql.user)
            .password(&mysql.password)
            .database(&mysql.database);

        let pool = MySqlPoolOptions::new()
            .max_connections(mysql.pool_size)
            .connect_with(options)
            .await?;

        info!(
            host = %mysql.host,
            database = %mysql.database,
            pool_size = mysql.pool_size,
            "database connected"
        );

        if lock_order.order.is_empty() {
            warn!("no lock order configured; multi-table writes keep their given order");
        } else {
            info!(order = ?lock_order.order, "table lock order loaded");
        }

        Ok(Self {
            pool,
            lock_order: lock_order.order.clone(),
        })
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    /// Sort `tables` into the configured lock order so concurrent
    /// transactions acquire row locks in the same sequence. Tables absent
    /// from the configuration keep their given order, after the known
    /// ones, with a warning.
    pub fn ordered_tables<'a>(&self, tables: &[&'a str]) -> Vec<&'a str> {
        let mut known: Vec<(usize, &'a str)> = Vec::new();
        let mut unknown: Vec<&'a str> = Vec::new();
        for table in tables.iter().copied() {
            match self.lock_order.iter().position(|t| t.as_str() == table) {
                Some(index) => known.push((index, table)),
                None => {
                    warn!(table, "table missing from lock order config");
                    unknown.push(table);
                }
            }
        }
        known.sort_by_key(|(index, _)| *index);
        known.into_iter().map(|(_, t)| t).chain(unknown).collect()
    }

    fn is_retryable(error: &sqlx::Error) -> bool {
        match error {
            sqlx::Error::Database(db_error) => db_error
                .try_downcast_ref::<MySqlDatabaseError>()
                .map(|e| e.number() == DEADLOCK_ERRNO || e.number() == LOCK_WAIT_TIMEOUT_ERRNO)
                .unwrap_or(false),
            _ => false,
        }
    }

    /// Run `op`, retrying deadlocks and lock-wait timeouts up to the
    /// retry budget with a linear `(attempt) * 0.5s` wait. Any other
    /// error propagates immediately.
    pub async fn with_retry<T, F, Fut>(&self, op: F) -> DbResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, sqlx::Error>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(error) if Self::is_retryable(&error) && attempt + 1 < MAX_RETRY_ATTEMPTS => {
                    attempt += 1;
                    let wait = Duration::from_secs_f64(attempt as f64 * RETRY_DELAY_BASE_SECS);
                    warn!(
                        attempt,
                        max_attempts = MAX_RETRY_ATTEMPTS,
                        wait_secs = wait.as_secs_f64(),
                        error = %error,
                        "lock contention, retrying"
                    );
                    sleep(wait).await;
                }
                Err(error) => return Err(error.into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accessor(order: &[&str]) -> DbAccessor {
        DbAccessor {
            pool: MySqlPoolOptions::new()
                .connect_lazy_with(MySqlConnectOptions::new().host("localhost")),
            lock_order: order.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn tables_sort_into_configured_order() {
        let accessor = accessor(&["players", "entries", "player_records", "line_predictions"]);
        let ordered = accessor.ordered_tables(&[
            "line_predictions",
            "entries",
            "players",
            "player_records",
        ]);
        assert_eq!(
            ordered,
            vec!["players", "entries", "player_records", "line_predictions"]
        );
    }

    #[tokio::test]
    async fn unknown_tables_follow_known_ones_in_given_order() {
        let accessor = accessor(&["players"]);
        let ordered = accessor.ordered_tables(&["mystery_b", "players", "mystery_a"]);
        assert_eq!(ordered, vec!["players", "mystery_b", "mystery_a"]);
    }
}
