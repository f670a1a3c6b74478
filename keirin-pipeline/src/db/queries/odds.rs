//! Odds-history lookups feeding the stage-4 gate.

use std::collections::HashMap;

use sqlx::{MySql, MySqlPool, QueryBuilder};

/// Whether each race has ever had odds written (an `odds_statuses` row).
/// Every requested id is present in the result, defaulting to `false`.
pub async fn check_update_history(
    pool: &MySqlPool,
    race_ids: &[String],
) -> sqlx::Result<HashMap<String, bool>> {
    let mut history: HashMap<String, bool> =
        race_ids.iter().map(|id| (id.clone(), false)).collect();
    if race_ids.is_empty() {
        return Ok(history);
    }

    let mut builder =
        QueryBuilder::<MySql>::new("SELECT race_id FROM odds_statuses WHERE race_id IN (");
    let mut separated = builder.separated(", ");
    for race_id in race_ids {
        separated.push_bind(race_id);
    }
    builder.push(")");

    let seen: Vec<(String,)> = builder.build_query_as().fetch_all(pool).await?;
    for (race_id,) in seen {
        history.insert(race_id, true);
    }
    Ok(history)
}
