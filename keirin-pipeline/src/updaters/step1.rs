//! Stage 1: monthly listings (regions, venues, cups).

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Datelike, NaiveDate};
use keirin_api::WinticketClient;
use keirin_contracts::MonthBlock;
use keirin_contracts::de::parse_flexible_date;
use serde::Serialize;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::savers::step1::{CupRow, RegionRow, Step1Saver, VenueRow};
use crate::savers::tinyint;

/// Pause between month fetches, on top of client throttling.
const INTER_MONTH_SLEEP: Duration = Duration::from_millis(200);

#[derive(Debug, Default, Serialize)]
pub struct Step1Summary {
    pub months: usize,
    pub failed_months: usize,
    pub regions_saved: usize,
    pub venues_saved: usize,
    pub cups_saved: usize,
    /// Every cup id touched, deduplicated across months.
    pub cup_ids: Vec<String>,
}

impl Step1Summary {
    pub fn success(&self) -> bool {
        self.failed_months == 0
    }
}

pub struct Step1Updater {
    api: Arc<WinticketClient>,
    saver: Step1Saver,
    batch_size: usize,
}

impl Step1Updater {
    pub fn new(api: Arc<WinticketClient>, saver: Step1Saver, batch_size: usize) -> Self {
        Self {
            api,
            saver,
            batch_size,
        }
    }

    /// Fetch every month overlapping the range, keep the cups whose
    /// running days intersect it, and upsert one month per transaction.
    pub async fn update_period(&self, start_date: NaiveDate, end_date: NaiveDate) -> Step1Summary {
        info!(%start_date, %end_date, "stage 1 started");
        let mut summary = Step1Summary::default();
        let mut all_cup_ids: Vec<String> = Vec::new();

        let mut month = start_date.with_day(1).unwrap_or(start_date);
        while month <= end_date {
            summary.months += 1;
            let date_str = month.format("%Y%m01").to_string();

            match self.api.get_monthly_cups(&date_str).await {
                Err(error) => {
                    error!(date = %date_str, %error, "monthly listing fetch failed");
                    summary.failed_months += 1;
                }
                Ok(response) => match response.month {
                    None => {
                        warn!(date = %date_str, "monthly response carries no month block");
                        summary.failed_months += 1;
                    }
                    Some(block) => {
                        let (regions, venues, cups) =
                            transform_month(&block, start_date, end_date);
                        match self
                            .saver
                            .save_month(&regions, &venues, &cups, self.batch_size)
                            .await
                        {
                            Ok(()) => {
                                summary.regions_saved += regions.len();
                                summary.venues_saved += venues.len();
                                summary.cups_saved += cups.len();
                                all_cup_ids.extend(cups.into_iter().map(|c| c.cup_id));
                            }
                            Err(error) => {
                                error!(date = %date_str, %error, "monthly listing save failed");
                                summary.failed_months += 1;
                            }
                        }
                    }
                },
            }

            month = next_month(month);
            sleep(INTER_MONTH_SLEEP).await;
        }

        all_cup_ids.sort();
        all_cup_ids.dedup();
        summary.cup_ids = all_cup_ids;

        info!(?summary, "stage 1 finished");
        summary
    }
}

fn next_month(date: NaiveDate) -> NaiveDate {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(date)
}

/// Dedupe by id and keep the cups whose [start, end] intersects the
/// requested range. Rows missing required fields are skipped.
fn transform_month(
    block: &MonthBlock,
    range_start: NaiveDate,
    range_end: NaiveDate,
) -> (Vec<RegionRow>, Vec<VenueRow>, Vec<CupRow>) {
    let mut regions: BTreeMap<String, RegionRow> = BTreeMap::new();
    for region in &block.regions {
        let (Some(id), Some(name)) = (&region.id, &region.name) else {
            warn!(?region, "region without id or name, skipping");
            continue;
        };
        regions.insert(
            id.clone(),
            RegionRow {
                region_id: id.clone(),
                region_name: name.clone(),
            },
        );
    }

    let mut venues: BTreeMap<String, VenueRow> = BTreeMap::new();
    for venue in &block.venues {
        let (Some(id), Some(name)) = (&venue.id, &venue.name) else {
            warn!(?venue.id, "venue without id or name, skipping");
            continue;
        };
        venues.insert(
            id.clone(),
            VenueRow {
                venue_id: id.clone(),
                venue_name: name.clone(),
                name1: venue.name1.clone(),
                address: venue.address.clone(),
                phone_number: venue.phone_number.clone(),
                website_url: venue.website_url.clone(),
                bank_feature: venue.bank_feature.clone(),
                track_straight_distance: venue.track_straight_distance,
                track_angle_center: venue.track_angle_center.clone(),
                track_angle_straight: venue.track_angle_straight.clone(),
                home_width: venue.home_width,
                back_width: venue.back_width,
                center_width: venue.center_width,
                region_id: venue.region_id.clone(),
            },
        );
    }

    let mut cups: BTreeMap<String, CupRow> = BTreeMap::new();
    for cup in &block.cups {
        let (Some(id), Some(start_raw), Some(end_raw), Some(venue_id)) =
            (&cup.id, &cup.start_date, &cup.end_date, &cup.venue_id)
        else {
            warn!(cup_id = ?cup.id, "cup missing required fields, skipping");
            continue;
        };
        let (Some(start), Some(end)) = (parse_flexible_date(start_raw), parse_flexible_date(end_raw))
        else {
            warn!(cup_id = %id, "cup with unparseable dates, skipping");
            continue;
        };
        if end < range_start || start > range_end {
            continue;
        }
        cups.insert(
            id.clone(),
            CupRow {
                cup_id: id.clone(),
                cup_name: cup.name.clone().unwrap_or_default(),
                start_date: start,
                end_date: end,
                duration: cup.duration,
                grade: cup.grade,
                venue_id: venue_id.clone(),
                labels: cup.labels.join(","),
                players_unfixed: tinyint(cup.players_unfixed),
            },
        );
    }

    (
        regions.into_values().collect(),
        venues.into_values().collect(),
        cups.into_values().collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn month_block(value: serde_json::Value) -> MonthBlock {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn clean_month_produces_one_row_per_entity() {
        let block = month_block(json!({
            "regions": [{"id": "r1", "name": "東日本"}],
            "venues": [{"id": "v1", "name": "川崎", "regionId": "r1"}],
            "cups": [{
                "id": "c1", "name": "T1",
                "startDate": "2024-01-10", "endDate": "2024-01-12",
                "duration": 3, "grade": 2, "venueId": "v1",
                "labels": ["GI"], "playersUnfixed": false
            }]
        }));

        let (regions, venues, cups) =
            transform_month(&block, date("2024-01-01"), date("2024-01-31"));
        assert_eq!(regions.len(), 1);
        assert_eq!(venues.len(), 1);
        assert_eq!(cups.len(), 1);
        let cup = &cups[0];
        assert_eq!(cup.labels, "GI");
        assert_eq!(cup.players_unfixed, 0);
        assert_eq!(cup.start_date, date("2024-01-10"));
    }

    #[test]
    fn cups_outside_the_range_are_dropped() {
        let block = month_block(json!({
            "cups": [
                {"id": "in", "startDate": "20240110", "endDate": "20240112", "venueId": "v1"},
                {"id": "out", "startDate": "20240201", "endDate": "20240203", "venueId": "v1"}
            ]
        }));

        let (_, _, cups) = transform_month(&block, date("2024-01-01"), date("2024-01-31"));
        assert_eq!(cups.len(), 1);
        assert_eq!(cups[0].cup_id, "in");
    }

    #[test]
    fn rows_missing_required_fields_are_skipped() {
        let block = month_block(json!({
            "regions": [{"name": "no id"}],
            "venues": [{"id": "v1"}],
            "cups": [{"id": "c1", "startDate": "20240110", "venueId": "v1"}]
        }));

        let (regions, venues, cups) =
            transform_month(&block, date("2024-01-01"), date("2024-01-31"));
        assert!(regions.is_empty());
        assert!(venues.is_empty());
        assert!(cups.is_empty());
    }

    #[test]
    fn duplicate_ids_collapse() {
        let block = month_block(json!({
            "regions": [
                {"id": "r1", "name": "東日本"},
                {"id": "r1", "name": "東日本"}
            ]
        }));
        let (regions, _, _) = transform_month(&block, date("2024-01-01"), date("2024-01-31"));
        assert_eq!(regions.len(), 1);
    }

    #[test]
    fn month_enumeration_rolls_over_years() {
        assert_eq!(next_month(date("2024-11-01")), date("2024-12-01"));
        assert_eq!(next_month(date("2024-12-01")), date("2025-01-01"));
    }
}
