//! Stage-3 saver: players, entries, player records, line predictions.

use std::sync::Arc;

use chrono::NaiveDate;
use sqlx::{MySql, MySqlConnection, QueryBuilder};
use tracing::info;

use crate::db::{DbAccessor, DbResult};

#[derive(Debug, Clone, Default)]
pub struct PlayerRow {
    pub race_id: String,
    pub player_id: String,
    pub name: Option<String>,
    pub class: Option<String>,
    pub player_group: Option<String>,
    pub prefecture: Option<String>,
    pub term: Option<i64>,
    pub region_id: Option<String>,
    pub yomi: Option<String>,
    pub birthday: Option<NaiveDate>,
    pub age: Option<i64>,
    pub gender: i64,
}

#[derive(Debug, Clone, Default)]
pub struct EntryRow {
    pub race_id: String,
    pub number: i64,
    pub absent: i64,
    pub player_id: Option<String>,
    pub bracket_number: Option<i64>,
    pub player_current_term_class: Option<i64>,
    pub player_current_term_group: Option<i64>,
    pub player_previous_term_class: Option<i64>,
    pub player_previous_term_group: Option<i64>,
    pub has_previous_class_group: i64,
}

#[derive(Debug, Clone, Default)]
pub struct PlayerRecordRow {
    pub race_id: String,
    pub player_id: String,
    pub gear_ratio: Option<f64>,
    pub style: Option<String>,
    pub race_point: Option<f64>,
    pub comment: Option<String>,
    pub prediction_mark: Option<i64>,
    pub first_rate: Option<f64>,
    pub second_rate: Option<f64>,
    pub third_rate: Option<f64>,
    pub has_modified_gear_ratio: i64,
    pub modified_gear_ratio: Option<f64>,
    pub modified_gear_ratio_str: Option<String>,
    pub gear_ratio_str: Option<String>,
    pub race_point_str: Option<String>,
    pub previous_cup_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LinePredictionRow {
    pub race_id: String,
    pub line_type: String,
    pub line_formation: String,
}

/// `YYYYMMDD` birthday strings become dates; anything else is null.
pub fn birthday_to_date(raw: &str) -> Option<NaiveDate> {
    if raw.len() == 8 && raw.chars().all(|c| c.is_ascii_digit()) {
        NaiveDate::parse_from_str(raw, "%Y%m%d").ok()
    } else {
        None
    }
}

/// Gender codes: 男 → 1, 女 → 2, numeric 1/2 pass through, unknown → 0.
pub fn gender_to_int(raw: Option<&str>) -> i64 {
    match raw.map(str::trim) {
        Some("男") => 1,
        Some("女") => 2,
        Some("1") => 1,
        Some("2") => 2,
        _ => 0,
    }
}

pub struct Step3Saver {
    accessor: Arc<DbAccessor>,
}

impl Step3Saver {
    pub fn new(accessor: Arc<DbAccessor>) -> Self {
        Self { accessor }
    }

    /// Persist one race's card in a single transaction, all four tables
    /// in lock order. The line prediction is skipped when both of its
    /// fields are empty.
    pub async fn save_race_details(
        &self,
        race_id: &str,
        players: &[PlayerRow],
        entries: &[EntryRow],
        records: &[PlayerRecordRow],
        line_prediction: Option<&LinePredictionRow>,
        batch_size: usize,
    ) -> DbResult<()> {
        let tables = self.accessor.ordered_tables(&[
            "players",
            "entries",
            "player_records",
            "line_predictions",
        ]);

        let tables = &tables;
        let line_prediction = line_prediction
            .filter(|line| !(line.line_type.is_empty() && line.line_formation.is_empty()));

        self.accessor
            .with_retry(|| async move {
                let mut tx = self.accessor.pool().begin().await?;
                for table in tables {
                    match *table {
                        "players" => upsert_players(&mut tx, players, batch_size).await?,
                        "entries" => upsert_entries(&mut tx, entries, batch_size).await?,
                        "player_records" => upsert_records(&mut tx, records, batch_size).await?,
                        "line_predictions" => {
                            if let Some(line) = line_prediction {
                                upsert_line_prediction(&mut tx, line).await?;
                            }
                        }
                        _ => {}
                    }
                }
                tx.commit().await?;
                Ok(())
            })
            .await?;

        info!(
            race_id,
            players = players.len(),
            entries = entries.len(),
            records = records.len(),
            line_prediction = line_prediction.is_some(),
            "race card saved"
        );
        Ok(())
    }
}

async fn upsert_players(
    tx: &mut MySqlConnection,
    rows: &[PlayerRow],
    batch_size: usize,
) -> sqlx::Result<()> {
    for chunk in rows.chunks(batch_size.max(1)) {
        let mut builder = QueryBuilder::<MySql>::new(
            "INSERT INTO players (race_id, player_id, name, `class`, player_group, \
             prefecture, term, region_id, yomi, birthday, age, gender) ",
        );
        builder.push_values(chunk, |mut b, row| {
            b.push_bind(&row.race_id);
            b.push_bind(&row.player_id);
            b.push_bind(&row.name);
            b.push_bind(&row.class);
            b.push_bind(&row.player_group);
            b.push_bind(&row.prefecture);
            b.push_bind(row.term);
            b.push_bind(&row.region_id);
            b.push_bind(&row.yomi);
            b.push_bind(row.birthday);
            b.push_bind(row.age);
            b.push_bind(row.gender);
        });
        builder.push(
            " ON DUPLICATE KEY UPDATE name = VALUES(name), `class` = VALUES(`class`), \
             player_group = VALUES(player_group), prefecture = VALUES(prefecture), \
             term = VALUES(term), region_id = VALUES(region_id), yomi = VALUES(yomi), \
             birthday = VALUES(birthday), age = VALUES(age), gender = VALUES(gender)",
        );
        builder.build().execute(&mut *tx).await?;
    }
    Ok(())
}

async fn upsert_entries(
    tx: &mut MySqlConnection,
    rows: &[EntryRow],
    batch_size: usize,
) -> sqlx::Result<()> {
    for chunk in rows.chunks(batch_size.max(1)) {
        let mut builder = QueryBuilder::<MySql>::new(
            "INSERT INTO entries (race_id, number, absent, player_id, bracket_number, \
             player_current_term_class, player_current_term_group, \
             player_previous_term_class, player_previous_term_group, \
             has_previous_class_group) ",
        );
        builder.push_values(chunk, |mut b, row| {
            b.push_bind(&row.race_id);
            b.push_bind(row.number);
            b.push_bind(row.absent);
            b.push_bind(&row.player_id);
            b.push_bind(row.bracket_number);
            b.push_bind(row.player_current_term_class);
            b.push_bind(row.player_current_term_group);
            b.push_bind(row.player_previous_term_class);
            b.push_bind(row.player_previous_term_group);
            b.push_bind(row.has_previous_class_group);
        });
        builder.push(
            " ON DUPLICATE KEY UPDATE absent = VALUES(absent), \
             player_id = VALUES(player_id), bracket_number = VALUES(bracket_number), \
             player_current_term_class = VALUES(player_current_term_class), \
             player_current_term_group = VALUES(player_current_term_group), \
             player_previous_term_class = VALUES(player_previous_term_class), \
             player_previous_term_group = VALUES(player_previous_term_group), \
             has_previous_class_group = VALUES(has_previous_class_group)",
        );
        builder.build().execute(&mut *tx).await?;
    }
    Ok(())
}

async fn upsert_records(
    tx: &mut MySqlConnection,
    rows: &[PlayerRecordRow],
    batch_size: usize,
) -> sqlx::Result<()> {
    for chunk in rows.chunks(batch_size.max(1)) {
        let mut builder = QueryBuilder::<MySql>::new(
            "INSERT INTO player_records (race_id, player_id, gear_ratio, style, race_point, \
             comment, prediction_mark, first_rate, second_rate, third_rate, \
             has_modified_gear_ratio, modified_gear_ratio, modified_gear_ratio_str, \
             gear_ratio_str, race_point_str, previous_cup_id) ",
        );
        builder.push_values(chunk, |mut b, row| {
            b.push_bind(&row.race_id);
            b.push_bind(&row.player_id);
            b.push_bind(row.gear_ratio);
            b.push_bind(&row.style);
            b.push_bind(row.race_point);
            b.push_bind(&row.comment);
            b.push_bind(row.prediction_mark);
            b.push_bind(row.first_rate);
            b.push_bind(row.second_rate);
            b.push_bind(row.third_rate);
            b.push_bind(row.has_modified_gear_ratio);
            b.push_bind(row.modified_gear_ratio);
            b.push_bind(&row.modified_gear_ratio_str);
            b.push_bind(&row.gear_ratio_str);
            b.push_bind(&row.race_point_str);
            b.push_bind(&row.previous_cup_id);
        });
        builder.push(
            " ON DUPLICATE KEY UPDATE gear_ratio = VALUES(gear_ratio), \
             style = VALUES(style), race_point = VALUES(race_point), \
             comment = VALUES(comment), prediction_mark = VALUES(prediction_mark), \
             first_rate = VALUES(first_rate), second_rate = VALUES(second_rate), \
             third_rate = VALUES(third_rate), \
             has_modified_gear_ratio = VALUES(has_modified_gear_ratio), \
             modified_gear_ratio = VALUES(modified_gear_ratio), \
             modified_gear_ratio_str = VALUES(modified_gear_ratio_str), \
             gear_ratio_str = VALUES(gear_ratio_str), \
             race_point_str = VALUES(race_point_str), \
             previous_cup_id = VALUES(previous_cup_id)",
        );
        builder.build().execute(&mut *tx).await?;
    }
    Ok(())
}

async fn upsert_line_prediction(
    tx: &mut MySqlConnection,
    row: &LinePredictionRow,
) -> sqlx::Result<()> {
    sqlx::query(
        "INSERT INTO line_predictions (race_id, line_type, line_formation) \
         VALUES (?, ?, ?) \
         ON DUPLICATE KEY UPDATE line_type = VALUES(line_type), \
         line_formation = VALUES(line_formation)",
    )
    .bind(&row.race_id)
    .bind(&row.line_type)
    .bind(&row.line_formation)
    .execute(&mut *tx)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn birthday_accepts_only_compact_digit_dates() {
        assert_eq!(
            birthday_to_date("19950412"),
            NaiveDate::from_ymd_opt(1995, 4, 12)
        );
        assert_eq!(birthday_to_date("1995-04-12"), None);
        assert_eq!(birthday_to_date("199504"), None);
        assert_eq!(birthday_to_date("19951332"), None);
    }

    #[test]
    fn gender_mapping_matches_storage_encoding() {
        assert_eq!(gender_to_int(Some("男")), 1);
        assert_eq!(gender_to_int(Some("女")), 2);
        assert_eq!(gender_to_int(Some("1")), 1);
        assert_eq!(gender_to_int(Some("2")), 2);
        assert_eq!(gender_to_int(Some("3")), 0);
        assert_eq!(gender_to_int(Some("unknown")), 0);
        assert_eq!(gender_to_int(None), 0);
    }
}
