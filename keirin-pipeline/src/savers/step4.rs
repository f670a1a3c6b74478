//! Stage-4 saver: the seven bet-type odds tables plus `odds_statuses`.

use std::collections::BTreeMap;
use std::sync::Arc;

use sqlx::{MySql, MySqlConnection, QueryBuilder};
use tracing::info;

use crate::db::{DbAccessor, DbResult};

/// Bet-type table names, in the API's declaration order.
pub const ODDS_TABLES: &[&str] = &[
    "odds_exacta",
    "odds_quinella",
    "odds_quinella_place",
    "odds_trifecta",
    "odds_trio",
    "odds_bracket_exacta",
    "odds_bracket_quinella",
];

/// One odds row, any bet type. `key` is the canonical combination string.
#[derive(Debug, Clone, Default)]
pub struct OddsRow {
    pub race_id: String,
    pub key: String,
    pub odds: Option<f64>,
    pub min_odds: Option<f64>,
    pub max_odds: Option<f64>,
    pub type_code: i64,
    pub popularity_order: Option<i64>,
    pub odds_str: Option<String>,
    pub min_odds_str: Option<String>,
    pub max_odds_str: Option<String>,
    pub unit_price: Option<i64>,
    pub payoff_unit_price: Option<i64>,
    pub absent: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct OddsStatusRow {
    pub race_id: String,
    pub trifecta_payoff_status: Option<String>,
    pub trio_payoff_status: Option<String>,
    pub exacta_payoff_status: Option<String>,
    pub quinella_payoff_status: Option<String>,
    pub quinella_place_payoff_status: Option<String>,
    pub bracket_exacta_payoff_status: Option<String>,
    pub bracket_quinella_payoff_status: Option<String>,
    pub is_aggregated: i64,
    pub odds_updated_at_timestamp: Option<i64>,
    pub odds_delayed: i64,
    pub final_odds: i64,
}

/// Everything stage 4 writes for one race.
#[derive(Debug, Clone, Default)]
pub struct PreparedRaceOdds {
    pub race_id: String,
    /// Table name to rows; absent tables had no data.
    pub bet_types: BTreeMap<&'static str, Vec<OddsRow>>,
    pub status: OddsStatusRow,
}

pub struct Step4Saver {
    accessor: Arc<DbAccessor>,
}

impl Step4Saver {
    pub fn new(accessor: Arc<DbAccessor>) -> Self {
        Self { accessor }
    }

    /// Persist one race's odds in a single transaction: every bet-type
    /// table with rows, then the status row, all in lock order.
    pub async fn save_all_odds_for_race(
        &self,
        prepared: &PreparedRaceOdds,
        batch_size: usize,
    ) -> DbResult<()> {
        let mut tables: Vec<&'static str> = ODDS_TABLES
            .iter()
            .copied()
            .filter(|table| prepared.bet_types.contains_key(table))
            .collect();
        tables.push("odds_statuses");
        let tables = self.accessor.ordered_tables(&tables);
        let tables = &tables;

        self.accessor
            .with_retry(|| async move {
                let mut tx = self.accessor.pool().begin().await?;
                for table in tables {
                    if *table == "odds_statuses" {
                        upsert_odds_status(&mut tx, &prepared.status).await?;
                    } else if let Some(rows) = prepared.bet_types.get(table) {
                        upsert_odds_rows(&mut tx, table, rows, batch_size).await?;
                    }
                }
                tx.commit().await?;
                Ok(())
            })
            .await?;

        let total_rows: usize = prepared.bet_types.values().map(Vec::len).sum();
        info!(
            race_id = %prepared.race_id,
            bet_types = prepared.bet_types.len(),
            rows = total_rows,
            "odds saved"
        );
        Ok(())
    }
}

async fn upsert_odds_rows(
    tx: &mut MySqlConnection,
    table: &str,
    rows: &[OddsRow],
    batch_size: usize,
) -> sqlx::Result<()> {
    for chunk in rows.chunks(batch_size.max(1)) {
        let mut builder = QueryBuilder::<MySql>::new(format!(
            "INSERT INTO {table} (race_id, `key`, odds, min_odds, max_odds, `type`, \
             popularity_order, odds_str, min_odds_str, max_odds_str, unit_price, \
             payoff_unit_price, absent) "
        ));
        builder.push_values(chunk, |mut b, row| {
            b.push_bind(&row.race_id);
            b.push_bind(&row.key);
            b.push_bind(row.odds);
            b.push_bind(row.min_odds);
            b.push_bind(row.max_odds);
            b.push_bind(row.type_code);
            b.push_bind(row.popularity_order);
            b.push_bind(&row.odds_str);
            b.push_bind(&row.min_odds_str);
            b.push_bind(&row.max_odds_str);
            b.push_bind(row.unit_price);
            b.push_bind(row.payoff_unit_price);
            b.push_bind(row.absent);
        });
        builder.push(
            " ON DUPLICATE KEY UPDATE odds = VALUES(odds), min_odds = VALUES(min_odds), \
             max_odds = VALUES(max_odds), `type` = VALUES(`type`), \
             popularity_order = VALUES(popularity_order), odds_str = VALUES(odds_str), \
             min_odds_str = VALUES(min_odds_str), max_odds_str = VALUES(max_odds_str), \
             unit_price = VALUES(unit_price), \
             payoff_unit_price = VALUES(payoff_unit_price), absent = VALUES(absent)",
        );
        builder.build().execute(&mut *tx).await?;
    }
    Ok(())
}

async fn upsert_odds_status(tx: &mut MySqlConnection, row: &OddsStatusRow) -> sqlx::Result<()> {
    sqlx::query(
        "INSERT INTO odds_statuses (race_id, trifecta_payoff_status, trio_payoff_status, \
         exacta_payoff_status, quinella_payoff_status, quinella_place_payoff_status, \
         bracket_exacta_payoff_status, bracket_quinella_payoff_status, is_aggregated, \
         odds_updated_at_timestamp, odds_delayed, final_odds) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
         ON DUPLICATE KEY UPDATE \
         trifecta_payoff_status = VALUES(trifecta_payoff_status), \
         trio_payoff_status = VALUES(trio_payoff_status), \
         exacta_payoff_status = VALUES(exacta_payoff_status), \
         quinella_payoff_status = VALUES(quinella_payoff_status), \
         quinella_place_payoff_status = VALUES(quinella_place_payoff_status), \
         bracket_exacta_payoff_status = VALUES(bracket_exacta_payoff_status), \
         bracket_quinella_payoff_status = VALUES(bracket_quinella_payoff_status), \
         is_aggregated = VALUES(is_aggregated), \
         odds_updated_at_timestamp = VALUES(odds_updated_at_timestamp), \
         odds_delayed = VALUES(odds_delayed), final_odds = VALUES(final_odds)",
    )
    .bind(&row.race_id)
    .bind(&row.trifecta_payoff_status)
    .bind(&row.trio_payoff_status)
    .bind(&row.exacta_payoff_status)
    .bind(&row.quinella_payoff_status)
    .bind(&row.quinella_place_payoff_status)
    .bind(&row.bracket_exacta_payoff_status)
    .bind(&row.bracket_quinella_payoff_status)
    .bind(row.is_aggregated)
    .bind(row.odds_updated_at_timestamp)
    .bind(row.odds_delayed)
    .bind(row.final_odds)
    .execute(&mut *tx)
    .await?;
    Ok(())
}
