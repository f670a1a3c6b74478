//! Work-list and gating queries against `races` / `race_status` /
//! `lap_data_status`.

use std::collections::HashMap;

use chrono::NaiveDate;
use sqlx::{MySql, MySqlPool, QueryBuilder};

use crate::db::models::{RaceWorkItem, ResultWorkItem};
use crate::status::StepColumn;

/// Races within a date range that an API stage should look at. Unless
/// forced, races whose step column is already `completed` are excluded;
/// the finer per-race gating happens in the updater.
pub async fn races_to_update(
    pool: &MySqlPool,
    start_date: NaiveDate,
    end_date: NaiveDate,
    step: StepColumn,
    force_update: bool,
) -> sqlx::Result<Vec<RaceWorkItem>> {
    let mut builder = QueryBuilder::<MySql>::new(
        "SELECT r.race_id, r.cup_id, s.schedule_index AS race_index, r.number AS race_number \
         FROM races r \
         JOIN schedules s ON r.schedule_id = s.schedule_id \
         LEFT JOIN race_status rs ON r.race_id = rs.race_id \
         WHERE DATE(FROM_UNIXTIME(r.start_at)) >= ",
    );
    builder.push_bind(start_date);
    builder.push(" AND DATE(FROM_UNIXTIME(r.start_at)) <= ");
    builder.push_bind(end_date);

    if !force_update {
        let column = step.column();
        builder.push(format!(
            " AND (rs.{column} != 'completed' OR rs.{column} IS NULL)"
        ));
    }

    builder.push(" ORDER BY r.start_at, r.number");
    builder.build_query_as().fetch_all(pool).await
}

/// `races.status` per race id, stringified for lifecycle comparisons.
pub async fn get_race_statuses(
    pool: &MySqlPool,
    race_ids: &[String],
) -> sqlx::Result<HashMap<String, String>> {
    if race_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let mut builder =
        QueryBuilder::<MySql>::new("SELECT race_id, status FROM races WHERE race_id IN (");
    let mut separated = builder.separated(", ");
    for race_id in race_ids {
        separated.push_bind(race_id);
    }
    builder.push(")");

    let rows: Vec<(String, Option<i64>)> = builder.build_query_as().fetch_all(pool).await?;
    Ok(rows
        .into_iter()
        .map(|(race_id, status)| (race_id, status.map(|s| s.to_string()).unwrap_or_default()))
        .collect())
}

/// Races stage 5 should scrape: in range, optional venue filter, and not
/// yet processed according to `lap_data_status` (unless forced).
pub async fn races_to_scrape(
    pool: &MySqlPool,
    start_date: NaiveDate,
    end_date: NaiveDate,
    venue_codes: Option<&[String]>,
    force_update: bool,
) -> sqlx::Result<Vec<ResultWorkItem>> {
    let mut builder = QueryBuilder::<MySql>::new(
        "SELECT r.race_id, \
                COALESCE(DATE(FROM_UNIXTIME(r.start_at)), s.date) AS race_date, \
                c.venue_id AS venue_code, \
                r.number AS race_number, \
                c.start_date AS cup_start_date \
         FROM races r \
         JOIN schedules s ON r.schedule_id = s.schedule_id \
         JOIN cups c ON s.cup_id = c.cup_id ",
    );

    if !force_update {
        builder.push("LEFT JOIN lap_data_status lds ON r.race_id = lds.race_id ");
    }

    builder.push("WHERE DATE(FROM_UNIXTIME(r.start_at)) >= ");
    builder.push_bind(start_date);
    builder.push(" AND DATE(FROM_UNIXTIME(r.start_at)) <= ");
    builder.push_bind(end_date);

    if !force_update {
        builder.push(" AND (lds.is_processed = 0 OR lds.race_id IS NULL)");
    }

    if let Some(venues) = venue_codes.filter(|v| !v.is_empty()) {
        builder.push(" AND c.venue_id IN (");
        let mut separated = builder.separated(", ");
        for venue in venues {
            separated.push_bind(venue);
        }
        builder.push(")");
    }

    builder.push(" ORDER BY r.start_at, c.venue_id, r.number");
    builder.build_query_as().fetch_all(pool).await
}
