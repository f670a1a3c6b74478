//! Entry lookups used for scraped-result reconciliation.

use std::collections::HashMap;

use sqlx::MySqlPool;

/// Bracket-number (as string) to player id for one race. Entries without
/// a player are left out.
pub async fn player_id_map(
    pool: &MySqlPool,
    race_id: &str,
) -> sqlx::Result<HashMap<String, String>> {
    let rows: Vec<(i64, Option<String>)> =
        sqlx::query_as("SELECT number, player_id FROM entries WHERE race_id = ?")
            .bind(race_id)
            .fetch_all(pool)
            .await?;

    Ok(rows
        .into_iter()
        .filter_map(|(number, player_id)| player_id.map(|pid| (number.to_string(), pid)))
        .collect())
}
