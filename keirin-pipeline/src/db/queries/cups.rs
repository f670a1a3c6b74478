//! Cup lookups feeding stage 2.

use chrono::NaiveDate;
use sqlx::MySqlPool;

/// Cups whose running days intersect the given range.
pub async fn cup_ids_in_range(
    pool: &MySqlPool,
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> sqlx::Result<Vec<String>> {
    sqlx::query_scalar(
        "SELECT cup_id FROM cups \
         WHERE end_date >= ? AND start_date <= ? \
         ORDER BY start_date, cup_id",
    )
    .bind(start_date)
    .bind(end_date)
    .fetch_all(pool)
    .await
}
