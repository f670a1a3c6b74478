//! Stage 4: odds, all seven bet types.
//!
//! Gating follows the race lifecycle: unfinished races are always
//! overwritten but never marked completed (odds still move); finished
//! races get one final overwrite when they have prior odds history, and
//! are skipped outright when they never had odds written.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use keirin_api::{ApiError, WinticketClient};
use keirin_contracts::{ApiOddsItem, OddsResponse};
use serde::Serialize;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::db::DbAccessor;
use crate::db::models::RaceWorkItem;
use crate::db::queries;
use crate::savers::step4::{OddsRow, OddsStatusRow, PreparedRaceOdds, Step4Saver};
use crate::savers::{StatusSaver, tinyint};
use crate::status::{StepColumn, StepStatus, is_finished_race_status};
use crate::updaters::RACE_BATCH_SIZE;

/// One bet type's mapping: API key, storage table, key symmetry, and the
/// fallback `type` code when the API omits it.
struct BetType {
    api_key: &'static str,
    table: &'static str,
    default_type: i64,
    /// Symmetric bets canonicalize their key ascending-numeric.
    symmetric: bool,
}

const BET_TYPES: &[BetType] = &[
    BetType { api_key: "exacta", table: "odds_exacta", default_type: 6, symmetric: false },
    BetType { api_key: "quinella", table: "odds_quinella", default_type: 7, symmetric: true },
    BetType { api_key: "quinellaPlace", table: "odds_quinella_place", default_type: 5, symmetric: true },
    BetType { api_key: "trifecta", table: "odds_trifecta", default_type: 8, symmetric: false },
    BetType { api_key: "trio", table: "odds_trio", default_type: 9, symmetric: true },
    BetType { api_key: "bracketExacta", table: "odds_bracket_exacta", default_type: 1, symmetric: false },
    BetType { api_key: "bracketQuinella", table: "odds_bracket_quinella", default_type: 2, symmetric: false },
];

#[derive(Debug, Default, Serialize)]
pub struct Step4Summary {
    pub inputs: usize,
    pub skipped_finished: usize,
    pub attempted: usize,
    pub api_failed: usize,
    pub api_empty: usize,
    pub save_failed: usize,
    pub completed: usize,
    pub no_data: usize,
    pub failed: usize,
}

impl Step4Summary {
    pub fn success(&self) -> bool {
        self.inputs == 0 || self.completed > 0 || self.skipped_finished > 0 || self.no_data > 0
    }
}

pub struct Step4Updater {
    api: Arc<WinticketClient>,
    accessor: Arc<DbAccessor>,
    saver: Step4Saver,
    status: StatusSaver,
    max_workers: usize,
    rate_limit_wait: f64,
    batch_size: usize,
}

impl Step4Updater {
    pub fn new(
        api: Arc<WinticketClient>,
        accessor: Arc<DbAccessor>,
        saver: Step4Saver,
        status: StatusSaver,
        max_workers: usize,
        rate_limit_wait: f64,
        batch_size: usize,
    ) -> Self {
        Self {
            api,
            accessor,
            saver,
            status,
            max_workers: max_workers.max(1),
            rate_limit_wait,
            batch_size,
        }
    }

    pub async fn update_odds(
        &self,
        races: &[RaceWorkItem],
        force_update_all: bool,
    ) -> Step4Summary {
        let mut summary = Step4Summary {
            inputs: races.len(),
            ..Step4Summary::default()
        };
        if races.is_empty() {
            warn!("no races to update");
            return summary;
        }

        let race_ids: Vec<String> = races.iter().map(|r| r.race_id.clone()).collect();
        let race_statuses =
            match queries::races::get_race_statuses(self.accessor.pool(), &race_ids).await {
                Ok(statuses) => statuses,
                Err(error) => {
                    error!(%error, "race status lookup failed, proceeding unfiltered");
                    HashMap::new()
                }
            };
        let odds_history =
            match queries::odds::check_update_history(self.accessor.pool(), &race_ids).await {
                Ok(history) => history,
                Err(error) => {
                    error!(%error, "odds history lookup failed, assuming none");
                    HashMap::new()
                }
            };

        let mut skipped_finished: HashSet<String> = HashSet::new();
        let mut active: Vec<&RaceWorkItem> = Vec::new();
        for race in races {
            if force_update_all {
                active.push(race);
                continue;
            }
            let status = race_statuses.get(&race.race_id).map(String::as_str);
            let has_history = odds_history.get(&race.race_id).copied().unwrap_or(false);
            match status {
                Some(s) if is_finished_race_status(s) => {
                    if has_history {
                        // one final overwrite freezes the odds
                        active.push(race);
                    } else {
                        info!(race_id = %race.race_id, "finished with no odds history, skipping");
                        skipped_finished.insert(race.race_id.clone());
                    }
                }
                Some(_) => active.push(race),
                None => {
                    warn!(race_id = %race.race_id, "race has no status, processing anyway");
                    active.push(race);
                }
            }
        }

        summary.attempted = active.len();
        info!(
            inputs = summary.inputs,
            attempted = summary.attempted,
            skipped = skipped_finished.len(),
            "stage 4 started"
        );

        let mut api_empty: HashSet<String> = HashSet::new();
        let mut api_failed: HashSet<String> = HashSet::new();
        let mut save_success: HashSet<String> = HashSet::new();
        let mut save_failed: HashSet<String> = HashSet::new();

        let per_call_wait = Duration::from_secs_f64(self.rate_limit_wait / self.max_workers as f64);

        for batch in active.chunks(RACE_BATCH_SIZE) {
            let batch_ids: Vec<String> = batch.iter().map(|r| r.race_id.clone()).collect();

            if let Err(error) = self
                .status
                .update_step_status_batch(StepColumn::Step4, &batch_ids, StepStatus::Processing)
                .await
            {
                error!(%error, "could not mark batch processing, skipping its fetches");
                api_failed.extend(batch_ids);
                continue;
            }

            let fetches: Vec<(&RaceWorkItem, Result<OddsResponse, ApiError>)> =
                futures::stream::iter(batch.iter().copied())
                    .map(|race| {
                        let api = Arc::clone(&self.api);
                        async move {
                            let result = api
                                .get_race_odds(&race.cup_id, race.race_index, race.race_number)
                                .await;
                            sleep(per_call_wait).await;
                            (race, result)
                        }
                    })
                    .buffer_unordered(self.max_workers)
                    .collect()
                    .await;

            for (race, result) in fetches {
                let response = match result {
                    Ok(response) => response,
                    Err(error) => {
                        warn!(race_id = %race.race_id, %error, "odds fetch failed");
                        api_failed.insert(race.race_id.clone());
                        continue;
                    }
                };

                if response.is_effectively_empty() {
                    // no bet-type rows; the odds_statuses metadata still lands
                    info!(race_id = %race.race_id, "odds payload effectively empty");
                    let prepared = transform_odds(&race.race_id, &response);
                    match self
                        .saver
                        .save_all_odds_for_race(&prepared, self.batch_size)
                        .await
                    {
                        Ok(()) => {
                            api_empty.insert(race.race_id.clone());
                        }
                        Err(error) => {
                            error!(race_id = %race.race_id, %error, "odds status save failed");
                            save_failed.insert(race.race_id.clone());
                        }
                    }
                    continue;
                }
                let prepared = transform_odds(&race.race_id, &response);
                match self
                    .saver
                    .save_all_odds_for_race(&prepared, self.batch_size)
                    .await
                {
                    Ok(()) => {
                        save_success.insert(race.race_id.clone());
                    }
                    Err(error) => {
                        error!(race_id = %race.race_id, %error, "odds save failed");
                        save_failed.insert(race.race_id.clone());
                    }
                }
            }
        }

        // final sweep: completed only for finished races
        let mut completed: HashSet<String> = skipped_finished.clone();
        for race_id in &save_success {
            let finished = race_statuses
                .get(race_id)
                .map(|s| is_finished_race_status(s))
                .unwrap_or(false);
            if finished {
                completed.insert(race_id.clone());
            }
        }
        if !completed.is_empty() {
            let ids: Vec<String> = completed.iter().cloned().collect();
            if let Err(error) = self
                .status
                .update_step_status_batch(StepColumn::Step4, &ids, StepStatus::Completed)
                .await
            {
                error!(%error, "completed sweep failed");
                save_failed.extend(ids);
                completed.clear();
            }
        }

        let mut no_data: HashSet<String> = api_empty
            .iter()
            .filter(|id| {
                !completed.contains(*id) && !save_failed.contains(*id) && !api_failed.contains(*id)
            })
            .cloned()
            .collect();
        if !no_data.is_empty() {
            let ids: Vec<String> = no_data.iter().cloned().collect();
            if let Err(error) = self
                .status
                .update_step_status_batch(StepColumn::Step4, &ids, StepStatus::NoData)
                .await
            {
                error!(%error, "no_data sweep failed");
                save_failed.extend(ids);
                no_data.clear();
            }
        }

        let failed: HashSet<String> = api_failed
            .union(&save_failed)
            .filter(|id| !completed.contains(*id))
            .cloned()
            .collect();
        if !failed.is_empty() {
            let ids: Vec<String> = failed.iter().cloned().collect();
            if let Err(error) = self
                .status
                .update_step_status_batch(StepColumn::Step4, &ids, StepStatus::Failed)
                .await
            {
                error!(%error, "failed sweep failed");
            }
        }

        summary.skipped_finished = skipped_finished.len();
        summary.api_failed = api_failed.len();
        summary.api_empty = api_empty.len();
        summary.save_failed = save_failed.len();
        summary.completed = completed.len();
        summary.no_data = no_data.len();
        summary.failed = failed.len();
        info!(?summary, "stage 4 finished");
        summary
    }
}

fn bet_type_items<'a>(response: &'a OddsResponse, api_key: &str) -> &'a [ApiOddsItem] {
    match api_key {
        "exacta" => &response.exacta,
        "quinella" => &response.quinella,
        "quinellaPlace" => &response.quinella_place,
        "trifecta" => &response.trifecta,
        "trio" => &response.trio,
        "bracketExacta" => &response.bracket_exacta,
        "bracketQuinella" => &response.bracket_quinella,
        _ => &[],
    }
}

/// Transform one odds payload into per-table rows plus the status row.
fn transform_odds(race_id: &str, response: &OddsResponse) -> PreparedRaceOdds {
    let mut prepared = PreparedRaceOdds {
        race_id: race_id.to_string(),
        ..PreparedRaceOdds::default()
    };

    for bet_type in BET_TYPES {
        let items = bet_type_items(response, bet_type.api_key);
        if items.is_empty() {
            continue;
        }
        let mut rows = Vec::with_capacity(items.len());
        for item in items {
            let Some(combination) = item.combination() else {
                warn!(
                    race_id,
                    table = bet_type.table,
                    "odds row with invalid combination key, skipping"
                );
                continue;
            };
            rows.push(OddsRow {
                race_id: race_id.to_string(),
                key: combination_key(&combination, bet_type.symmetric),
                odds: item.odds,
                min_odds: item.min_odds,
                max_odds: item.max_odds,
                type_code: item.type_code.unwrap_or(bet_type.default_type),
                popularity_order: item.popularity_order,
                odds_str: item.odds_str.clone(),
                min_odds_str: item.min_odds_str.clone(),
                max_odds_str: item.max_odds_str.clone(),
                unit_price: item.unit_price,
                payoff_unit_price: item.payoff_unit_price,
                absent: item.absent.map(tinyint),
            });
        }
        if !rows.is_empty() {
            prepared.bet_types.insert(bet_type.table, rows);
        }
    }

    let payout = &response.payout_status;
    prepared.status = OddsStatusRow {
        race_id: race_id.to_string(),
        trifecta_payoff_status: payout.clone(),
        trio_payoff_status: payout.clone(),
        exacta_payoff_status: payout.clone(),
        quinella_payoff_status: payout.clone(),
        quinella_place_payoff_status: payout.clone(),
        bracket_exacta_payoff_status: payout.clone(),
        bracket_quinella_payoff_status: payout.clone(),
        is_aggregated: tinyint(response.is_aggregated),
        odds_updated_at_timestamp: response.updated_at,
        odds_delayed: tinyint(response.odds_delayed),
        final_odds: tinyint(response.final_odds),
    };

    prepared
}

/// `-`-joined combination; symmetric bet types sort ascending-numeric.
fn combination_key(combination: &[i64], symmetric: bool) -> String {
    let ordered: Vec<i64> = if symmetric {
        let mut sorted = combination.to_vec();
        sorted.sort_unstable();
        sorted
    } else {
        combination.to_vec()
    };
    ordered
        .iter()
        .map(i64::to_string)
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response(value: serde_json::Value) -> OddsResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn symmetric_keys_sort_and_asymmetric_keep_order() {
        assert_eq!(combination_key(&[2, 1], true), "1-2");
        assert_eq!(combination_key(&[2, 1], false), "2-1");
        assert_eq!(combination_key(&[3, 1, 2], true), "1-2-3");
        assert_eq!(combination_key(&[3, 1, 2], false), "3-1-2");
    }

    #[test]
    fn missing_type_defaults_per_bet_type() {
        let response = response(json!({
            "exacta": [{"numbers": [2, 1], "odds": 12.3}],
            "quinella": [{"numbers": [2, 1], "odds": 6.7}],
            "quinellaPlace": [{"numbers": [3, 1], "odds": 2.1}],
            "trifecta": [{"numbers": [3, 1, 2], "odds": 45.6}],
            "trio": [{"numbers": [3, 1, 2], "odds": 15.0}],
            "bracketExacta": [{"brackets": [2, 1], "odds": 8.0}],
            "bracketQuinella": [{"brackets": [2, 1], "odds": 4.0}]
        }));

        let prepared = transform_odds("r1", &response);
        let type_of = |table: &str| prepared.bet_types[table][0].type_code;
        assert_eq!(type_of("odds_exacta"), 6);
        assert_eq!(type_of("odds_quinella"), 7);
        assert_eq!(type_of("odds_quinella_place"), 5);
        assert_eq!(type_of("odds_trifecta"), 8);
        assert_eq!(type_of("odds_trio"), 9);
        assert_eq!(type_of("odds_bracket_exacta"), 1);
        assert_eq!(type_of("odds_bracket_quinella"), 2);

        // symmetric sorted, asymmetric preserved
        assert_eq!(prepared.bet_types["odds_quinella"][0].key, "1-2");
        assert_eq!(prepared.bet_types["odds_exacta"][0].key, "2-1");
        assert_eq!(prepared.bet_types["odds_trio"][0].key, "1-2-3");
        assert_eq!(prepared.bet_types["odds_trifecta"][0].key, "3-1-2");
        // bracket quinella keeps the upstream order
        assert_eq!(prepared.bet_types["odds_bracket_quinella"][0].key, "2-1");
    }

    #[test]
    fn explicit_type_codes_pass_through() {
        let response = response(json!({
            "exacta": [{"numbers": [1, 2], "type": 16, "odds": 1.5}]
        }));
        let prepared = transform_odds("r1", &response);
        assert_eq!(prepared.bet_types["odds_exacta"][0].type_code, 16);
    }

    #[test]
    fn empty_payload_still_builds_a_status_row() {
        let response = response(json!({
            "updatedAt": "2024-01-10T05:00:00Z",
            "isAggregated": true,
            "finalOdds": "true"
        }));
        assert!(response.is_effectively_empty());
        let prepared = transform_odds("rY", &response);
        assert!(prepared.bet_types.is_empty());
        assert_eq!(prepared.status.odds_updated_at_timestamp, Some(1_704_862_800));
        assert_eq!(prepared.status.is_aggregated, 1);
        assert_eq!(prepared.status.final_odds, 1);
        assert_eq!(prepared.status.odds_delayed, 0);
    }

    #[test]
    fn rows_with_broken_combinations_are_skipped() {
        let response = response(json!({
            "exacta": [
                {"numbers": [1, "x"], "odds": 1.0},
                {"numbers": [1, 2], "odds": 2.0}
            ]
        }));
        let prepared = transform_odds("r1", &response);
        assert_eq!(prepared.bet_types["odds_exacta"].len(), 1);
        assert_eq!(prepared.bet_types["odds_exacta"][0].key, "1-2");
    }
}
