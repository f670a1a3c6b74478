//! `race_status.stepN_status` updates.

use std::sync::Arc;

use tracing::{info, warn};

use crate::db::{DbAccessor, DbResult};
use crate::status::{StepColumn, StepStatus, truncate_status};

pub struct StatusSaver {
    accessor: Arc<DbAccessor>,
}

impl StatusSaver {
    pub fn new(accessor: Arc<DbAccessor>) -> Self {
        Self { accessor }
    }

    /// Set one step column for a batch of races inside a single
    /// transaction. Each row is locked with `FOR UPDATE` before the
    /// update; races without a `race_status` row are logged and left
    /// alone. Returns the number of rows updated.
    pub async fn update_step_status_batch(
        &self,
        step: StepColumn,
        race_ids: &[String],
        status: StepStatus,
    ) -> DbResult<usize> {
        if race_ids.is_empty() {
            return Ok(0);
        }

        let column = step.column();
        let db_status = truncate_status(status.as_str());
        let lock_sql =
            format!("SELECT race_id, {column} FROM race_status WHERE race_id = ? FOR UPDATE");
        let update_sql = format!(
            "UPDATE race_status SET {column} = ?, last_updated = CURRENT_TIMESTAMP \
             WHERE race_id = ?"
        );

        let lock_sql = &lock_sql;
        let update_sql = &update_sql;
        let db_status = &db_status;

        let updated = self
            .accessor
            .with_retry(|| async move {
                let mut tx = self.accessor.pool().begin().await?;
                let mut updated = 0usize;
                for race_id in race_ids {
                    let locked: Option<(String, Option<String>)> = sqlx::query_as(lock_sql)
                        .bind(race_id)
                        .fetch_optional(&mut *tx)
                        .await?;
                    if locked.is_none() {
                        warn!(race_id = %race_id, column, "race_status row missing, not updating");
                        continue;
                    }
                    sqlx::query(update_sql)
                        .bind(db_status)
                        .bind(race_id)
                        .execute(&mut *tx)
                        .await?;
                    updated += 1;
                }
                tx.commit().await?;
                Ok(updated)
            })
            .await?;

        info!(
            column,
            status = %status,
            updated,
            requested = race_ids.len(),
            "step status batch updated"
        );
        Ok(updated)
    }
}
