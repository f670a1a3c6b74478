//! Stage 3: race cards (players, entries, records, line predictions).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use keirin_api::{ApiError, WinticketClient};
use keirin_contracts::RaceCardResponse;
use serde::Serialize;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::db::DbAccessor;
use crate::db::models::RaceWorkItem;
use crate::db::queries;
use crate::savers::step3::{
    EntryRow, LinePredictionRow, PlayerRecordRow, PlayerRow, Step3Saver, birthday_to_date,
    gender_to_int,
};
use crate::savers::{StatusSaver, tinyint};
use crate::status::{StepColumn, StepStatus, is_finished_race_status};
use crate::updaters::RACE_BATCH_SIZE;
use crate::updaters::line::line_formation;

#[derive(Debug, Default, Serialize)]
pub struct Step3Summary {
    pub inputs: usize,
    pub skipped_finished: usize,
    pub attempted: usize,
    pub api_failed: usize,
    pub save_failed: usize,
    pub completed: usize,
    pub failed: usize,
}

impl Step3Summary {
    /// The run counts as a success when any race reached a terminal-good
    /// state, or there was nothing to do.
    pub fn success(&self) -> bool {
        self.inputs == 0 || self.completed > 0
    }
}

pub struct Step3Updater {
    api: Arc<WinticketClient>,
    accessor: Arc<DbAccessor>,
    saver: Step3Saver,
    status: StatusSaver,
    max_workers: usize,
    rate_limit_wait: f64,
    batch_size: usize,
}

impl Step3Updater {
    pub fn new(
        api: Arc<WinticketClient>,
        accessor: Arc<DbAccessor>,
        saver: Step3Saver,
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

    /// Update the race cards for `races`. Finished races are skipped
    /// (and marked completed) unless `force_update` is set.
    pub async fn update_races(&self, races: &[RaceWorkItem], force_update: bool) -> Step3Summary {
        let mut summary = Step3Summary {
            inputs: races.len(),
            ..Step3Summary::default()
        };
        if races.is_empty() {
            warn!("no races to update");
            return summary;
        }

        let mut api_failed: HashSet<String> = HashSet::new();
        let mut save_success: HashSet<String> = HashSet::new();
        let mut save_failed: HashSet<String> = HashSet::new();
        let mut skipped_finished: HashSet<String> = HashSet::new();

        // lifecycle gate: finished races are already terminal for this stage
        let mut active: Vec<&RaceWorkItem> = Vec::new();
        if force_update {
            active.extend(races.iter());
        } else {
            let race_ids: Vec<String> = races.iter().map(|r| r.race_id.clone()).collect();
            let statuses = match queries::races::get_race_statuses(self.accessor.pool(), &race_ids)
                .await
            {
                Ok(statuses) => statuses,
                Err(error) => {
                    error!(%error, "race status lookup failed, proceeding unfiltered");
                    HashMap::new()
                }
            };
            for race in races {
                match statuses.get(&race.race_id) {
                    Some(status) if is_finished_race_status(status) => {
                        info!(race_id = %race.race_id, status = %status, "race finished, skipping fetch");
                        skipped_finished.insert(race.race_id.clone());
                    }
                    Some(_) => active.push(race),
                    None => {
                        warn!(race_id = %race.race_id, "race has no status row, processing anyway");
                        active.push(race);
                    }
                }
            }
        }

        summary.attempted = active.len();
        info!(
            inputs = summary.inputs,
            attempted = summary.attempted,
            skipped = skipped_finished.len(),
            "stage 3 started"
        );

        let per_call_wait = Duration::from_secs_f64(self.rate_limit_wait / self.max_workers as f64);

        for batch in active.chunks(RACE_BATCH_SIZE) {
            let batch_ids: Vec<String> = batch.iter().map(|r| r.race_id.clone()).collect();

            // the processing marker goes down before any API call
            if let Err(error) = self
                .status
                .update_step_status_batch(StepColumn::Step3, &batch_ids, StepStatus::Processing)
                .await
            {
                error!(%error, "could not mark batch processing, skipping its fetches");
                api_failed.extend(batch_ids);
                continue;
            }

            let fetches: Vec<(&RaceWorkItem, Result<RaceCardResponse, ApiError>)> =
                futures::stream::iter(batch.iter().copied())
                    .map(|race| {
                        let api = Arc::clone(&self.api);
                        async move {
                            let result = api
                                .get_race_card(&race.cup_id, race.race_index, race.race_number)
                                .await;
                            sleep(per_call_wait).await;
                            (race, result)
                        }
                    })
                    .buffer_unordered(self.max_workers)
                    .collect()
                    .await;

            for (race, result) in fetches {
                let card = match result {
                    Ok(card) => card,
                    Err(error) => {
                        warn!(race_id = %race.race_id, %error, "race card fetch failed");
                        api_failed.insert(race.race_id.clone());
                        continue;
                    }
                };
                let (players, entries, records, line_prediction) =
                    transform_race_card(&race.race_id, &card);
                match self
                    .saver
                    .save_race_details(
                        &race.race_id,
                        &players,
                        &entries,
                        &records,
                        line_prediction.as_ref(),
                        self.batch_size,
                    )
                    .await
                {
                    Ok(()) => {
                        save_success.insert(race.race_id.clone());
                    }
                    Err(error) => {
                        error!(race_id = %race.race_id, %error, "race card save failed");
                        save_failed.insert(race.race_id.clone());
                    }
                }
            }
        }

        // final sweep
        let mut completed: HashSet<String> = save_success.clone();
        completed.extend(skipped_finished.iter().cloned());
        if !completed.is_empty() {
            let ids: Vec<String> = completed.iter().cloned().collect();
            if let Err(error) = self
                .status
                .update_step_status_batch(StepColumn::Step3, &ids, StepStatus::Completed)
                .await
            {
                error!(%error, "completed sweep failed");
                save_failed.extend(ids);
                completed.clear();
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
                .update_step_status_batch(StepColumn::Step3, &ids, StepStatus::Failed)
                .await
            {
                error!(%error, "failed sweep failed");
            }
        }

        summary.skipped_finished = skipped_finished.len();
        summary.api_failed = api_failed.len();
        summary.save_failed = save_failed.len();
        summary.completed = completed.len();
        summary.failed = failed.len();
        info!(?summary, "stage 3 finished");
        summary
    }
}

/// Transform one race card into the four save shapes. Rows missing their
/// key field (player id / entry number / record player id) are skipped.
fn transform_race_card(
    race_id: &str,
    card: &RaceCardResponse,
) -> (
    Vec<PlayerRow>,
    Vec<EntryRow>,
    Vec<PlayerRecordRow>,
    Option<LinePredictionRow>,
) {
    let mut players = Vec::new();
    for player in card.players.as_deref().unwrap_or(&[]) {
        let Some(player_id) = &player.id else {
            warn!(race_id, "player without id, skipping");
            continue;
        };
        players.push(PlayerRow {
            race_id: race_id.to_string(),
            player_id: player_id.clone(),
            name: player.name.clone(),
            class: player.class_name.clone(),
            player_group: player.player_group.clone(),
            prefecture: player.prefecture.clone(),
            term: player.term,
            region_id: player.region_id.clone(),
            yomi: player.yomi.clone(),
            birthday: player.birthday.as_deref().and_then(birthday_to_date),
            age: player.age,
            gender: gender_to_int(player.gender.as_deref()),
        });
    }

    let mut entries = Vec::new();
    for entry in card.entries.as_deref().unwrap_or(&[]) {
        let Some(number) = entry.number else {
            warn!(race_id, "entry without a slot number, skipping");
            continue;
        };
        entries.push(EntryRow {
            race_id: race_id.to_string(),
            number,
            absent: tinyint(entry.absent),
            player_id: entry.player_id.clone(),
            bracket_number: entry.bracket_number,
            player_current_term_class: entry.player_current_term_class,
            player_current_term_group: entry.player_current_term_group,
            player_previous_term_class: entry.player_previous_term_class,
            player_previous_term_group: entry.player_previous_term_group,
            has_previous_class_group: tinyint(entry.has_previous_class_group),
        });
    }

    let mut records = Vec::new();
    for record in card.records.as_deref().unwrap_or(&[]) {
        let Some(player_id) = &record.player_id else {
            warn!(race_id, "player record without player id, skipping");
            continue;
        };
        records.push(PlayerRecordRow {
            race_id: race_id.to_string(),
            player_id: player_id.clone(),
            gear_ratio: record.gear_ratio,
            style: record.style.clone(),
            race_point: record.race_point,
            comment: record.comment.clone(),
            prediction_mark: record.prediction_mark,
            first_rate: record.first_rate,
            second_rate: record.second_rate,
            third_rate: record.third_rate,
            has_modified_gear_ratio: tinyint(record.has_modified_gear_ratio),
            modified_gear_ratio: record.modified_gear_ratio,
            modified_gear_ratio_str: record.modified_gear_ratio_str.clone(),
            gear_ratio_str: record.gear_ratio_str.clone(),
            race_point_str: record.race_point_str.clone(),
            previous_cup_id: record.previous_cup_id.clone(),
        });
    }

    let line_prediction = card.line_prediction.as_ref().map(|line| LinePredictionRow {
        race_id: race_id.to_string(),
        line_type: line.line_type.clone().unwrap_or_default(),
        line_formation: line_formation(&line.lines),
    });

    (players, entries, records, line_prediction)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn card(value: serde_json::Value) -> RaceCardResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn full_card_transforms_into_four_shapes() {
        let card = card(json!({
            "players": [{
                "id": "p1", "name": "西岡拓朗", "class": 1, "group": 2,
                "prefecture": "広島", "term": "107", "regionId": "r1",
                "yomi": "にしおかたくろう", "birthday": "19950412",
                "age": 28, "gender": "男"
            }],
            "entries": [{
                "number": 1, "raceId": "x1", "absent": false, "playerId": "p1",
                "bracketNumber": 3, "playerCurrentTermClass": "1",
                "playerCurrentTermGroup": 2, "hasPreviousClassGroup": true,
                "playerPreviousTermClass": 2, "playerPreviousTermGroup": 2
            }],
            "records": [{
                "playerId": "p1", "gearRatio": "3.92", "style": "逃",
                "racePoint": 111.28, "predictionMark": 1,
                "firstRate": "12.5", "secondRate": 25.0, "thirdRate": 37.5,
                "hasModifiedGearRatio": false, "gearRatioStr": "3.92"
            }],
            "linePrediction": {
                "lineType": "normal",
                "lines": [
                    {"entries": [{"numbers": [1]}, {"numbers": [2]}]},
                    {"entries": [{"numbers": [4, 7]}]},
                    {"entries": [{"numbers": [6]}]}
                ]
            }
        }));

        let (players, entries, records, line) = transform_race_card("x1", &card);

        assert_eq!(players.len(), 1);
        let player = &players[0];
        assert_eq!(player.player_id, "p1");
        assert_eq!(player.gender, 1);
        assert_eq!(player.term, Some(107));
        assert_eq!(
            player.birthday,
            chrono::NaiveDate::from_ymd_opt(1995, 4, 12)
        );

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].number, 1);
        assert_eq!(entries[0].absent, 0);

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].gear_ratio, Some(3.92));
        assert_eq!(records[0].first_rate, Some(12.5));

        let line = line.unwrap();
        assert_eq!(line.line_type, "normal");
        assert_eq!(line.line_formation, "1・2―[4・7]―6");
    }

    #[test]
    fn rows_missing_keys_are_dropped() {
        let card = card(json!({
            "players": [{"name": "no id"}],
            "entries": [{"playerId": "p1"}],
            "records": [{"gearRatio": 3.92}]
        }));
        let (players, entries, records, line) = transform_race_card("x1", &card);
        assert!(players.is_empty());
        assert!(entries.is_empty());
        assert!(records.is_empty());
        assert!(line.is_none());
    }
}
