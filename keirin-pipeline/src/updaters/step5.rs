//! Stage 5: race results scraped from the Yenjoy HTML site.
//!
//! Runs only on races the `lap_data_status` table has not yet marked
//! processed (unless forced). Each race's page is fetched, parsed, and
//! reconciled against `entries` before saving; empty pages become
//! `data_not_available` rather than failures.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use keirin_contracts::ParsedRacePage;
use keirin_parser::text::{name_without_rank, remove_spaces};
use serde::Serialize;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::db::DbAccessor;
use crate::db::models::ResultWorkItem;
use crate::db::queries;
use crate::savers::StatusSaver;
use crate::savers::step5::{LapPositionRow, Step5Saver};
use crate::status::{StepColumn, StepStatus};
use crate::updaters::RACE_BATCH_SIZE;

#[derive(Debug, Default, Serialize)]
pub struct Step5Summary {
    pub inputs: usize,
    pub fetch_failed: usize,
    pub save_failed: usize,
    pub completed: usize,
    pub data_not_available: usize,
    pub failed: usize,
}

impl Step5Summary {
    pub fn success(&self) -> bool {
        self.inputs == 0 || self.completed > 0 || self.data_not_available > 0
    }
}

pub struct Step5Updater {
    yenjoy: Arc<keirin_api::YenjoyClient>,
    accessor: Arc<DbAccessor>,
    saver: Step5Saver,
    status: StatusSaver,
    max_workers: usize,
    rate_limit_wait_html: f64,
    batch_size: usize,
}

impl Step5Updater {
    pub fn new(
        yenjoy: Arc<keirin_api::YenjoyClient>,
        accessor: Arc<DbAccessor>,
        saver: Step5Saver,
        status: StatusSaver,
        max_workers: usize,
        rate_limit_wait_html: f64,
        batch_size: usize,
    ) -> Self {
        Self {
            yenjoy,
            accessor,
            saver,
            status,
            max_workers: max_workers.max(1),
            rate_limit_wait_html,
            batch_size,
        }
    }

    pub async fn update_results(&self, races: &[ResultWorkItem]) -> Step5Summary {
        let mut summary = Step5Summary {
            inputs: races.len(),
            ..Step5Summary::default()
        };
        if races.is_empty() {
            info!("no races to scrape");
            return summary;
        }

        info!(races = races.len(), workers = self.max_workers, "stage 5 started");

        let mut fetch_failed: HashSet<String> = HashSet::new();
        let mut save_success: HashSet<String> = HashSet::new();
        let mut save_failed: HashSet<String> = HashSet::new();
        let mut data_not_available: HashSet<String> = HashSet::new();

        let total_batches = races.len().div_ceil(RACE_BATCH_SIZE);
        for (batch_index, batch) in races.chunks(RACE_BATCH_SIZE).enumerate() {
            let batch_ids: Vec<String> = batch.iter().map(|r| r.race_id.clone()).collect();

            if let Err(error) = self
                .status
                .update_step_status_batch(StepColumn::Step5, &batch_ids, StepStatus::Processing)
                .await
            {
                error!(%error, "could not mark batch processing, skipping its fetches");
                fetch_failed.extend(batch_ids);
                continue;
            }

            let pages: Vec<(String, Option<ParsedRacePage>)> =
                futures::stream::iter(batch.iter())
                    .map(|race| {
                        let yenjoy = Arc::clone(&self.yenjoy);
                        async move {
                            let url = yenjoy.result_page_url(
                                race.cup_start_date,
                                race.race_date,
                                &race.venue_code,
                                race.race_number,
                            );
                            match yenjoy.get_html(&url).await {
                                Ok(page) => {
                                    let parsed = keirin_parser::parse_result_page(
                                        &page.content,
                                        &race.race_id,
                                    );
                                    (race.race_id.clone(), Some(parsed))
                                }
                                Err(error) => {
                                    warn!(
                                        race_id = %race.race_id,
                                        %url,
                                        %error,
                                        "result page fetch failed"
                                    );
                                    (race.race_id.clone(), None)
                                }
                            }
                        }
                    })
                    .buffer_unordered(self.max_workers)
                    .collect()
                    .await;

            let mut lap_rows: Vec<LapPositionRow> = Vec::new();
            let mut lap_row_races: Vec<String> = Vec::new();

            for (race_id, page) in pages {
                let Some(mut page) = page else {
                    fetch_failed.insert(race_id);
                    continue;
                };
                if page.parse_error {
                    warn!(race_id, "page parsed with errors, marking failed");
                    fetch_failed.insert(race_id);
                    continue;
                }
                if page.is_empty {
                    info!(race_id, "result page carries no data yet");
                    data_not_available.insert(race_id);
                    continue;
                }

                let player_map =
                    match queries::entries::player_id_map(self.accessor.pool(), &race_id).await {
                        Ok(map) => map,
                        Err(error) => {
                            error!(race_id, %error, "entry lookup for reconciliation failed");
                            save_failed.insert(race_id);
                            continue;
                        }
                    };
                reconcile_page(&mut page, &player_map);

                let mut race_ok = true;
                if let Err(error) = self
                    .saver
                    .save_race_results_batch(&race_id, &page.race_results, self.batch_size)
                    .await
                {
                    error!(race_id, %error, "race results save failed");
                    race_ok = false;
                }
                if let Err(error) = self
                    .saver
                    .save_inspection_reports_batch(&race_id, &page.inspection_reports)
                    .await
                {
                    error!(race_id, %error, "inspection reports save failed");
                    race_ok = false;
                }
                if let Some(comment) = &page.race_comment {
                    if let Err(error) = self.saver.save_race_comment(&race_id, comment).await {
                        error!(race_id, %error, "race comment save failed");
                        race_ok = false;
                    }
                }

                if !page.lap_positions.is_empty() {
                    let row = LapPositionRow::from_sections(&race_id, &page.lap_positions);
                    if !row.is_empty() {
                        lap_rows.push(row);
                        lap_row_races.push(race_id.clone());
                    }
                }

                if race_ok {
                    save_success.insert(race_id);
                } else {
                    save_failed.insert(race_id);
                }
            }

            if !lap_rows.is_empty() {
                if let Err(error) = self.saver.save_lap_positions_batch(&lap_rows).await {
                    error!(%error, "lap positions batch save failed");
                    for race_id in &lap_row_races {
                        save_failed.insert(race_id.clone());
                        save_success.remove(race_id);
                    }
                }
            }

            // progress marker per race: processed iff its saves held up
            for race_id in &batch_ids {
                let touched = save_success.contains(race_id) || save_failed.contains(race_id);
                if !touched {
                    continue;
                }
                let processed = save_success.contains(race_id);
                if let Err(error) = self.saver.save_lap_data_status(race_id, processed).await {
                    warn!(race_id, %error, "lap_data_status update failed");
                    if processed {
                        save_success.remove(race_id);
                        save_failed.insert(race_id.clone());
                    }
                }
            }

            if self.rate_limit_wait_html > 0.0 && batch_index + 1 < total_batches {
                sleep(Duration::from_secs_f64(self.rate_limit_wait_html)).await;
            }
        }

        // final sweep
        let completed: Vec<String> = save_success
            .iter()
            .filter(|id| !save_failed.contains(*id))
            .cloned()
            .collect();
        if !completed.is_empty() {
            if let Err(error) = self
                .status
                .update_step_status_batch(StepColumn::Step5, &completed, StepStatus::Completed)
                .await
            {
                error!(%error, "completed sweep failed");
            }
        }

        let not_available: Vec<String> = data_not_available.iter().cloned().collect();
        if !not_available.is_empty() {
            if let Err(error) = self
                .status
                .update_step_status_batch(
                    StepColumn::Step5,
                    &not_available,
                    StepStatus::DataNotAvailable,
                )
                .await
            {
                error!(%error, "data_not_available sweep failed");
            }
        }

        let failed: Vec<String> = fetch_failed
            .union(&save_failed)
            .cloned()
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        if !failed.is_empty() {
            if let Err(error) = self
                .status
                .update_step_status_batch(StepColumn::Step5, &failed, StepStatus::Failed)
                .await
            {
                error!(%error, "failed sweep failed");
            }
        }

        summary.fetch_failed = fetch_failed.len();
        summary.save_failed = save_failed.len();
        summary.completed = completed.len();
        summary.data_not_available = not_available.len();
        summary.failed = failed.len();
        info!(?summary, "stage 5 finished");
        summary
    }
}

/// Attach database player ids to a parsed page.
///
/// Results resolve by bracket number. Inspection reports resolve in two
/// hops: the reported name (rank suffix stripped, spaces removed) finds a
/// bracket through the scraped results, and the bracket finds the player.
/// Unresolvable rows keep a null player id with a warning.
pub(crate) fn reconcile_page(page: &mut ParsedRacePage, player_map: &HashMap<String, String>) {
    for result in &mut page.race_results {
        result.player_id = player_map.get(&result.bracket_number.to_string()).cloned();
        if result.player_id.is_none() {
            warn!(
                race_id = %page.race_id,
                bracket_number = result.bracket_number,
                player_name = %result.player_name,
                "no entry found for scraped result row"
            );
        }
    }

    let name_to_bracket: HashMap<String, String> = page
        .race_results
        .iter()
        .map(|result| {
            (
                remove_spaces(&result.player_name),
                result.bracket_number.to_string(),
            )
        })
        .collect();

    for report in &mut page.inspection_reports {
        let Some(reported) = &report.player_name_reported else {
            continue;
        };
        let name = remove_spaces(&name_without_rank(reported));
        report.player_id = name_to_bracket
            .get(&name)
            .and_then(|bracket| player_map.get(bracket))
            .cloned();
        if report.player_id.is_none() {
            warn!(
                race_id = %page.race_id,
                reported = %reported,
                "could not resolve inspection report to a player"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keirin_contracts::{ScrapedInspectionReport, ScrapedRaceResult};

    fn page() -> ParsedRacePage {
        let mut page = ParsedRacePage::new("r1");
        page.race_results.push(ScrapedRaceResult {
            bracket_number: 3,
            player_name: "西岡 拓朗".to_string(),
            ..ScrapedRaceResult::default()
        });
        page.race_results.push(ScrapedRaceResult {
            bracket_number: 7,
            player_name: "山田 太郎".to_string(),
            ..ScrapedRaceResult::default()
        });
        page.inspection_reports.push(ScrapedInspectionReport {
            player_name_reported: Some("西岡拓朗(1着)".to_string()),
            report_text: "強い風でした".to_string(),
            player_id: None,
        });
        page.inspection_reports.push(ScrapedInspectionReport {
            player_name_reported: Some("見知らぬ選手(9着)".to_string()),
            report_text: "初出走".to_string(),
            player_id: None,
        });
        page
    }

    #[test]
    fn results_resolve_by_bracket_and_reports_by_name() {
        let mut page = page();
        let player_map: HashMap<String, String> = [
            ("3".to_string(), "p3".to_string()),
            ("7".to_string(), "p7".to_string()),
        ]
        .into();

        reconcile_page(&mut page, &player_map);

        assert_eq!(page.race_results[0].player_id.as_deref(), Some("p3"));
        assert_eq!(page.race_results[1].player_id.as_deref(), Some("p7"));
        assert_eq!(page.inspection_reports[0].player_id.as_deref(), Some("p3"));
        assert_eq!(page.inspection_reports[1].player_id, None);
    }

    #[test]
    fn missing_entries_leave_results_unresolved() {
        let mut page = page();
        let player_map: HashMap<String, String> =
            [("3".to_string(), "p3".to_string())].into();

        reconcile_page(&mut page, &player_map);

        assert_eq!(page.race_results[0].player_id.as_deref(), Some("p3"));
        assert_eq!(page.race_results[1].player_id, None);
    }
}
