//! Stage 2: cup details (schedules and races).

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use keirin_api::{ApiError, WinticketClient};
use keirin_contracts::CupDetailResponse;
use keirin_contracts::de::parse_flexible_date;
use serde::Serialize;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::savers::step2::{RaceRow, ScheduleRow, Step2Saver};
use crate::savers::tinyint;

#[derive(Debug, Default, Serialize)]
pub struct Step2Summary {
    pub inputs: usize,
    pub fetch_failed: usize,
    pub saved_cups: usize,
    pub save_failed: usize,
    pub schedules_saved: usize,
    pub races_saved: usize,
}

impl Step2Summary {
    pub fn success(&self) -> bool {
        self.inputs == 0 || self.saved_cups > 0
    }
}

pub struct Step2Updater {
    api: Arc<WinticketClient>,
    saver: Step2Saver,
    max_workers: usize,
    rate_limit_wait: f64,
    batch_size: usize,
}

impl Step2Updater {
    pub fn new(
        api: Arc<WinticketClient>,
        saver: Step2Saver,
        max_workers: usize,
        rate_limit_wait: f64,
        batch_size: usize,
    ) -> Self {
        Self {
            api,
            saver,
            max_workers: max_workers.max(1),
            rate_limit_wait,
            batch_size,
        }
    }

    /// Fetch every cup's detail with a bounded worker pool and persist
    /// each cup transactionally. One cup's failure does not abort the
    /// rest.
    pub async fn update_cups(&self, cup_ids: &[String]) -> Step2Summary {
        let mut summary = Step2Summary {
            inputs: cup_ids.len(),
            ..Step2Summary::default()
        };
        if cup_ids.is_empty() {
            warn!("no cups to update");
            return summary;
        }

        info!(cups = cup_ids.len(), workers = self.max_workers, "stage 2 started");

        let per_call_wait = Duration::from_secs_f64(self.rate_limit_wait / self.max_workers as f64);
        let fetches: Vec<(String, Result<CupDetailResponse, ApiError>)> =
            futures::stream::iter(cup_ids.iter().cloned())
                .map(|cup_id| {
                    let api = Arc::clone(&self.api);
                    async move {
                        let result = api.get_cup_detail(&cup_id).await;
                        sleep(per_call_wait).await;
                        (cup_id, result)
                    }
                })
                .buffer_unordered(self.max_workers)
                .collect()
                .await;

        for (cup_id, result) in fetches {
            let detail = match result {
                Ok(detail) => detail,
                Err(error) => {
                    warn!(cup_id, %error, "cup detail fetch failed");
                    summary.fetch_failed += 1;
                    continue;
                }
            };

            let (schedules, races) = transform_cup_detail(&cup_id, &detail);
            match self
                .saver
                .save_cup_details(&cup_id, &schedules, &races, self.batch_size)
                .await
            {
                Ok(()) => {
                    summary.saved_cups += 1;
                    summary.schedules_saved += schedules.len();
                    summary.races_saved += races.len();
                }
                Err(error) => {
                    error!(cup_id, %error, "cup detail save failed");
                    summary.save_failed += 1;
                }
            }
        }

        info!(?summary, "stage 2 finished");
        summary
    }
}

/// Transform one cup-detail payload into saver rows. Race `schedule_id`s
/// are validated against the cup's own schedules; mismatches are stored
/// as null with a warning.
fn transform_cup_detail(
    cup_id: &str,
    detail: &CupDetailResponse,
) -> (Vec<ScheduleRow>, Vec<RaceRow>) {
    let mut schedules = Vec::new();
    let mut valid_schedule_ids: HashSet<&str> = HashSet::new();

    for schedule in &detail.schedules {
        let Some(id) = &schedule.id else {
            warn!(cup_id, "schedule without id, skipping");
            continue;
        };
        valid_schedule_ids.insert(id.as_str());
        schedules.push(ScheduleRow {
            schedule_id: id.clone(),
            cup_id: cup_id.to_string(),
            date: schedule.date.as_deref().and_then(parse_flexible_date),
            day: schedule.day,
            schedule_index: schedule.index,
            entries_unfixed: tinyint(schedule.entries_unfixed),
        });
    }

    let mut races = Vec::new();
    for race in &detail.races {
        let Some(race_id) = &race.id else {
            warn!(cup_id, "race without id, skipping");
            continue;
        };

        let schedule_id = match &race.schedule_id {
            Some(id) if valid_schedule_ids.contains(id.as_str()) => Some(id.clone()),
            Some(id) => {
                warn!(
                    cup_id,
                    race_id = %race_id,
                    schedule_id = %id,
                    "schedule id not in this cup's schedule list, storing null"
                );
                None
            }
            None => {
                warn!(cup_id, race_id = %race_id, "race without schedule id, storing null");
                None
            }
        };

        races.push(RaceRow {
            race_id: race_id.clone(),
            cup_id: cup_id.to_string(),
            schedule_id,
            number: race.number,
            class: race.class_name.clone(),
            race_type: race.race_type.clone(),
            start_at: race.start_at,
            close_at: race.close_at,
            status: race.status,
            cancel: tinyint(race.cancel),
            cancel_reason: race.cancel_reason.clone(),
            weather: race.weather.clone(),
            wind_speed: race.wind_speed.clone(),
            race_type3: race.race_type3.clone(),
            distance: race.distance,
            lap: race.lap,
            entries_number: race.entries_number,
            is_grade_race: tinyint(race.is_grade_race),
            has_digest_video: tinyint(race.has_digest_video),
            digest_video: race.digest_video.clone(),
            digest_video_provider: race.digest_video_provider.clone(),
            decided_at: race.decided_at,
        });
    }

    (schedules, races)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn detail(value: serde_json::Value) -> CupDetailResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn invalid_schedule_id_is_stored_null() {
        let detail = detail(json!({
            "cup": {"id": "c1"},
            "schedules": [{"id": "s1", "date": "20240110", "day": 1, "index": 1}],
            "races": [
                {"id": "r1", "scheduleId": "s1", "number": 1},
                {"id": "r2", "scheduleId": "sX", "number": 2}
            ]
        }));

        let (schedules, races) = transform_cup_detail("c1", &detail);
        assert_eq!(schedules.len(), 1);
        assert_eq!(races.len(), 2);
        assert_eq!(races[0].schedule_id.as_deref(), Some("s1"));
        assert_eq!(races[1].schedule_id, None);
    }

    #[test]
    fn timestamps_and_booleans_normalize() {
        let detail = detail(json!({
            "cup": {"id": "c1"},
            "schedules": [],
            "races": [{
                "id": "r1",
                "startAt": "2024-01-10T05:00:00Z",
                "closeAt": "0000-00-00 00:00:00",
                "cancel": "true",
                "isGradeRace": true,
                "windSpeed": 3
            }]
        }));

        let (_, races) = transform_cup_detail("c1", &detail);
        let race = &races[0];
        assert_eq!(race.start_at, Some(1_704_862_800));
        assert_eq!(race.close_at, None);
        assert_eq!(race.cancel, 1);
        assert_eq!(race.is_grade_race, 1);
        assert_eq!(race.wind_speed.as_deref(), Some("3"));
        assert_eq!(race.schedule_id, None);
    }

    #[test]
    fn races_without_ids_are_dropped() {
        let detail = detail(json!({
            "cup": {"id": "c1"},
            "races": [{"number": 4}]
        }));
        let (_, races) = transform_cup_detail("c1", &detail);
        assert!(races.is_empty());
    }
}
