//! Stage-2 saver: schedules, races, and the `race_status` seed rows.

use std::sync::Arc;

use chrono::NaiveDate;
use sqlx::{MySql, MySqlConnection, QueryBuilder};
use tracing::info;

use crate::db::{DbAccessor, DbResult};

#[derive(Debug, Clone)]
pub struct ScheduleRow {
    pub schedule_id: String,
    pub cup_id: String,
    pub date: Option<NaiveDate>,
    pub day: Option<i64>,
    pub schedule_index: Option<i64>,
    pub entries_unfixed: i64,
}

#[derive(Debug, Clone, Default)]
pub struct RaceRow {
    pub race_id: String,
    pub cup_id: String,
    /// Null when the upstream id did not match any schedule of the cup.
    pub schedule_id: Option<String>,
    pub number: Option<i64>,
    pub class: Option<String>,
    pub race_type: Option<String>,
    pub start_at: Option<i64>,
    pub close_at: Option<i64>,
    pub status: Option<i64>,
    pub cancel: i64,
    pub cancel_reason: Option<String>,
    pub weather: Option<String>,
    pub wind_speed: Option<String>,
    pub race_type3: Option<String>,
    pub distance: Option<i64>,
    pub lap: Option<i64>,
    pub entries_number: Option<i64>,
    pub is_grade_race: i64,
    pub has_digest_video: i64,
    pub digest_video: Option<String>,
    pub digest_video_provider: Option<String>,
    pub decided_at: Option<i64>,
}

pub struct Step2Saver {
    accessor: Arc<DbAccessor>,
}

impl Step2Saver {
    pub fn new(accessor: Arc<DbAccessor>) -> Self {
        Self { accessor }
    }

    /// Persist one cup's detail in a single transaction: schedules, then
    /// races, then `race_status` seed rows, in lock order. The status
    /// insert leaves existing rows untouched.
    pub async fn save_cup_details(
        &self,
        cup_id: &str,
        schedules: &[ScheduleRow],
        races: &[RaceRow],
        batch_size: usize,
    ) -> DbResult<()> {
        let tables = self
            .accessor
            .ordered_tables(&["schedules", "races", "race_status"]);
        let tables = &tables;

        self.accessor
            .with_retry(|| async move {
                let mut tx = self.accessor.pool().begin().await?;
                for table in tables {
                    match *table {
                        "schedules" => upsert_schedules(&mut tx, schedules, batch_size).await?,
                        "races" => upsert_races(&mut tx, races, batch_size).await?,
                        "race_status" => seed_race_status(&mut tx, races, batch_size).await?,
                        _ => {}
                    }
                }
                tx.commit().await?;
                Ok(())
            })
            .await?;

        info!(
            cup_id,
            schedules = schedules.len(),
            races = races.len(),
            "cup details saved"
        );
        Ok(())
    }
}

async fn upsert_schedules(
    tx: &mut MySqlConnection,
    rows: &[ScheduleRow],
    batch_size: usize,
) -> sqlx::Result<()> {
    for chunk in rows.chunks(batch_size.max(1)) {
        let mut builder = QueryBuilder::<MySql>::new(
            "INSERT INTO schedules (schedule_id, cup_id, date, day, schedule_index, \
             entries_unfixed) ",
        );
        builder.push_values(chunk, |mut b, row| {
            b.push_bind(&row.schedule_id);
            b.push_bind(&row.cup_id);
            b.push_bind(row.date);
            b.push_bind(row.day);
            b.push_bind(row.schedule_index);
            b.push_bind(row.entries_unfixed);
        });
        builder.push(
            " ON DUPLICATE KEY UPDATE cup_id = VALUES(cup_id), date = VALUES(date), \
             day = VALUES(day), schedule_index = VALUES(schedule_index), \
             entries_unfixed = VALUES(entries_unfixed)",
        );
        builder.build().execute(&mut *tx).await?;
    }
    Ok(())
}

async fn upsert_races(
    tx: &mut MySqlConnection,
    rows: &[RaceRow],
    batch_size: usize,
) -> sqlx::Result<()> {
    for chunk in rows.chunks(batch_size.max(1)) {
        let mut builder = QueryBuilder::<MySql>::new(
            "INSERT INTO races (race_id, cup_id, schedule_id, number, `class`, race_type, \
             start_at, close_at, status, cancel, cancel_reason, weather, wind_speed, \
             race_type3, distance, lap, entries_number, is_grade_race, has_digest_video, \
             digest_video, digest_video_provider, decided_at) ",
        );
        builder.push_values(chunk, |mut b, row| {
            b.push_bind(&row.race_id);
            b.push_bind(&row.cup_id);
            b.push_bind(&row.schedule_id);
            b.push_bind(row.number);
            b.push_bind(&row.class);
            b.push_bind(&row.race_type);
            b.push_bind(row.start_at);
            b.push_bind(row.close_at);
            b.push_bind(row.status);
            b.push_bind(row.cancel);
            b.push_bind(&row.cancel_reason);
            b.push_bind(&row.weather);
            b.push_bind(&row.wind_speed);
            b.push_bind(&row.race_type3);
            b.push_bind(row.distance);
            b.push_bind(row.lap);
            b.push_bind(row.entries_number);
            b.push_bind(row.is_grade_race);
            b.push_bind(row.has_digest_video);
            b.push_bind(&row.digest_video);
            b.push_bind(&row.digest_video_provider);
            b.push_bind(row.decided_at);
        });
        builder.push(
            " ON DUPLICATE KEY UPDATE cup_id = VALUES(cup_id), \
             schedule_id = VALUES(schedule_id), number = VALUES(number), \
             `class` = VALUES(`class`), race_type = VALUES(race_type), \
             start_at = VALUES(start_at), close_at = VALUES(close_at), \
             status = VALUES(status), cancel = VALUES(cancel), \
             cancel_reason = VALUES(cancel_reason), weather = VALUES(weather), \
             wind_speed = VALUES(wind_speed), race_type3 = VALUES(race_type3), \
             distance = VALUES(distance), lap = VALUES(lap), \
             entries_number = VALUES(entries_number), \
             is_grade_race = VALUES(is_grade_race), \
             has_digest_video = VALUES(has_digest_video), \
             digest_video = VALUES(digest_video), \
             digest_video_provider = VALUES(digest_video_provider), \
             decided_at = VALUES(decided_at)",
        );
        builder.build().execute(&mut *tx).await?;
    }
    Ok(())
}

/// Ensure a `race_status` row exists per race; existing rows keep their
/// step statuses.
async fn seed_race_status(
    tx: &mut MySqlConnection,
    races: &[RaceRow],
    batch_size: usize,
) -> sqlx::Result<()> {
    for chunk in races.chunks(batch_size.max(1)) {
        let mut builder = QueryBuilder::<MySql>::new("INSERT INTO race_status (race_id) ");
        builder.push_values(chunk, |mut b, row| {
            b.push_bind(&row.race_id);
        });
        builder.push(" ON DUPLICATE KEY UPDATE race_id = VALUES(race_id)");
        builder.build().execute(&mut *tx).await?;
    }
    Ok(())
}
