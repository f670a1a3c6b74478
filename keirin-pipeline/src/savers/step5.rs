//! Stage-5 saver: scraped results, comments, lap positions, inspection
//! reports, and the `lap_data_status` progress marker.

use std::collections::BTreeMap;
use std::sync::Arc;

use keirin_contracts::{LapIcon, ScrapedInspectionReport, ScrapedRaceResult};
use sqlx::{MySql, MySqlConnection, QueryBuilder};
use tracing::{info, warn};

use crate::db::{DbAccessor, DbResult};

/// `inspection_reports.player` column width, characters.
pub const PLAYER_KEY_WIDTH: usize = 6;

/// Track-section label to its JSON column.
pub const LAP_SECTION_COLUMNS: &[(&str, &str)] = &[
    ("周回", "lap_shuukai"),
    ("赤板", "lap_akaban"),
    ("打鐘", "lap_dasho"),
    ("HS", "lap_hs"),
    ("BS", "lap_bs"),
];

/// One `lap_positions` row: the five section columns as JSON text.
#[derive(Debug, Clone, Default)]
pub struct LapPositionRow {
    pub race_id: String,
    pub lap_shuukai: Option<String>,
    pub lap_akaban: Option<String>,
    pub lap_dasho: Option<String>,
    pub lap_hs: Option<String>,
    pub lap_bs: Option<String>,
}

impl LapPositionRow {
    /// Serialize parsed sections into their columns. Unknown section
    /// labels are dropped with a warning.
    pub fn from_sections(race_id: &str, sections: &BTreeMap<String, Vec<LapIcon>>) -> Self {
        let mut row = Self {
            race_id: race_id.to_string(),
            ..Self::default()
        };
        for (label, icons) in sections {
            let Ok(json) = serde_json::to_string(icons) else {
                warn!(race_id, section = %label, "lap section failed to serialize");
                continue;
            };
            match LAP_SECTION_COLUMNS
                .iter()
                .find(|(section, _)| *section == label.as_str())
            {
                Some((_, column)) => match *column {
                    "lap_shuukai" => row.lap_shuukai = Some(json),
                    "lap_akaban" => row.lap_akaban = Some(json),
                    "lap_dasho" => row.lap_dasho = Some(json),
                    "lap_hs" => row.lap_hs = Some(json),
                    "lap_bs" => row.lap_bs = Some(json),
                    _ => {}
                },
                None => warn!(race_id, section = %label, "unknown lap section label"),
            }
        }
        row
    }

    pub fn is_empty(&self) -> bool {
        self.lap_shuukai.is_none()
            && self.lap_akaban.is_none()
            && self.lap_dasho.is_none()
            && self.lap_hs.is_none()
            && self.lap_bs.is_none()
    }
}

pub struct Step5Saver {
    accessor: Arc<DbAccessor>,
}

impl Step5Saver {
    pub fn new(accessor: Arc<DbAccessor>) -> Self {
        Self { accessor }
    }

    /// Upsert one race's finishing order in its own transaction. Rows
    /// with no rider identity at all are skipped with a warning.
    pub async fn save_race_results_batch(
        &self,
        race_id: &str,
        results: &[ScrapedRaceResult],
        batch_size: usize,
    ) -> DbResult<()> {
        let rows: Vec<&ScrapedRaceResult> = results
            .iter()
            .filter(|result| {
                let has_player = result.player_id.is_some() || result.player_id_scraped.is_some();
                if !has_player {
                    warn!(
                        race_id,
                        bracket_number = result.bracket_number,
                        player_name = %result.player_name,
                        "result row without any player id, skipping"
                    );
                }
                has_player
            })
            .collect();

        if rows.is_empty() {
            info!(race_id, "no valid result rows to save");
            return Ok(());
        }

        let rows = &rows;
        self.accessor
            .with_retry(|| async move {
                let mut tx = self.accessor.pool().begin().await?;
                upsert_race_results(&mut tx, race_id, rows, batch_size).await?;
                tx.commit().await?;
                Ok(())
            })
            .await?;

        info!(race_id, rows = rows.len(), "race results saved");
        Ok(())
    }

    pub async fn save_race_comment(&self, race_id: &str, comment: &str) -> DbResult<()> {
        if comment.is_empty() {
            return Ok(());
        }
        self.accessor
            .with_retry(|| async move {
                sqlx::query(
                    "INSERT INTO race_comments (race_id, comment) VALUES (?, ?) \
                     ON DUPLICATE KEY UPDATE comment = VALUES(comment)",
                )
                .bind(race_id)
                .bind(comment)
                .execute(self.accessor.pool())
                .await
            })
            .await?;
        Ok(())
    }

    /// Upsert the post-race rider comments. The player key keeps the rank
    /// suffix, loses spaces, and is clipped to the 6-character column.
    pub async fn save_inspection_reports_batch(
        &self,
        race_id: &str,
        reports: &[ScrapedInspectionReport],
    ) -> DbResult<()> {
        let mut rows: Vec<(String, String)> = Vec::new();
        for report in reports {
            if report.report_text.is_empty() {
                continue;
            }
            rows.push((report_player_key(report), report.report_text.clone()));
        }
        if rows.is_empty() {
            return Ok(());
        }

        let rows = &rows;
        self.accessor
            .with_retry(|| async move {
                let mut tx = self.accessor.pool().begin().await?;
                let mut builder = QueryBuilder::<MySql>::new(
                    "INSERT INTO inspection_reports (race_id, player, comment) ",
                );
                builder.push_values(rows.iter(), |mut b, (player, comment)| {
                    b.push_bind(race_id);
                    b.push_bind(player);
                    b.push_bind(comment);
                });
                builder.push(" ON DUPLICATE KEY UPDATE comment = VALUES(comment)");
                builder.build().execute(&mut *tx).await?;
                tx.commit().await?;
                Ok(())
            })
            .await?;

        info!(race_id, rows = rows.len(), "inspection reports saved");
        Ok(())
    }

    /// Upsert lap positions for a batch of races in one transaction.
    pub async fn save_lap_positions_batch(&self, rows: &[LapPositionRow]) -> DbResult<()> {
        let rows: Vec<&LapPositionRow> = rows.iter().filter(|row| !row.is_empty()).collect();
        if rows.is_empty() {
            return Ok(());
        }

        let rows = &rows;
        self.accessor
            .with_retry(|| async move {
                let mut tx = self.accessor.pool().begin().await?;
                for row in rows.iter() {
                    upsert_lap_positions(&mut tx, row).await?;
                }
                tx.commit().await?;
                Ok(())
            })
            .await?;

        info!(races = rows.len(), "lap positions saved");
        Ok(())
    }

    /// Record whether a race's HTML has been processed.
    pub async fn save_lap_data_status(&self, race_id: &str, is_processed: bool) -> DbResult<()> {
        let processed = super::tinyint(is_processed);
        self.accessor
            .with_retry(|| async move {
                sqlx::query(
                    "INSERT INTO lap_data_status (race_id, is_processed, last_checked_at) \
                     VALUES (?, ?, NOW()) \
                     ON DUPLICATE KEY UPDATE is_processed = VALUES(is_processed), \
                     last_checked_at = VALUES(last_checked_at)",
                )
                .bind(race_id)
                .bind(processed)
                .execute(self.accessor.pool())
                .await
            })
            .await?;
        Ok(())
    }
}

/// The `player` key: the reported name (rank suffix and all), falling
/// back to the player id, clipped to the 6-character column.
pub(crate) fn report_player_key(report: &ScrapedInspectionReport) -> String {
    report
        .player_name_reported
        .as_deref()
        .filter(|name| !name.is_empty())
        .or(report.player_id.as_deref())
        .map(|name| name.chars().take(PLAYER_KEY_WIDTH).collect())
        .unwrap_or_default()
}

async fn upsert_race_results(
    tx: &mut MySqlConnection,
    race_id: &str,
    rows: &[&ScrapedRaceResult],
    batch_size: usize,
) -> sqlx::Result<()> {
    for chunk in rows.chunks(batch_size.max(1)) {
        let mut builder = QueryBuilder::<MySql>::new(
            "INSERT INTO race_results (race_id, bracket_number, `rank`, rank_text, mark, \
             player_name, player_id, age, prefecture, period, `class`, diff, time, \
             last_lap_time, winning_technique, symbols, win_factor, personal_status) ",
        );
        builder.push_values(chunk, |mut b, row| {
            b.push_bind(race_id);
            b.push_bind(row.bracket_number);
            b.push_bind(row.rank);
            b.push_bind(&row.rank_text);
            b.push_bind(&row.mark);
            b.push_bind(&row.player_name);
            b.push_bind(row.player_id.as_deref().or(row.player_id_scraped.as_deref()));
            b.push_bind(row.age);
            b.push_bind(&row.prefecture);
            b.push_bind(row.period);
            b.push_bind(&row.class);
            b.push_bind(&row.diff);
            b.push_bind(row.time);
            b.push_bind(&row.last_lap_time);
            b.push_bind(&row.winning_technique);
            b.push_bind(&row.symbols);
            b.push_bind(&row.win_factor);
            b.push_bind(&row.personal_status);
        });
        builder.push(
            " ON DUPLICATE KEY UPDATE `rank` = VALUES(`rank`), \
             rank_text = VALUES(rank_text), mark = VALUES(mark), \
             player_name = VALUES(player_name), player_id = VALUES(player_id), \
             age = VALUES(age), prefecture = VALUES(prefecture), \
             period = VALUES(period), `class` = VALUES(`class`), diff = VALUES(diff), \
             time = VALUES(time), last_lap_time = VALUES(last_lap_time), \
             winning_technique = VALUES(winning_technique), symbols = VALUES(symbols), \
             win_factor = VALUES(win_factor), personal_status = VALUES(personal_status)",
        );
        builder.build().execute(&mut *tx).await?;
    }
    Ok(())
}

async fn upsert_lap_positions(tx: &mut MySqlConnection, row: &LapPositionRow) -> sqlx::Result<()> {
    sqlx::query(
        "INSERT INTO lap_positions (race_id, lap_shuukai, lap_akaban, lap_dasho, lap_hs, \
         lap_bs) VALUES (?, ?, ?, ?, ?, ?) \
         ON DUPLICATE KEY UPDATE lap_shuukai = VALUES(lap_shuukai), \
         lap_akaban = VALUES(lap_akaban), lap_dasho = VALUES(lap_dasho), \
         lap_hs = VALUES(lap_hs), lap_bs = VALUES(lap_bs)",
    )
    .bind(&row.race_id)
    .bind(&row.lap_shuukai)
    .bind(&row.lap_akaban)
    .bind(&row.lap_dasho)
    .bind(&row.lap_hs)
    .bind(&row.lap_bs)
    .execute(&mut *tx)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sections_map_to_their_columns() {
        let mut sections = BTreeMap::new();
        sections.insert(
            "周回".to_string(),
            vec![LapIcon {
                bracket_number: 1,
                racer_name: "山田".to_string(),
                x: 10,
                y: 20,
                has_arrow: false,
            }],
        );
        sections.insert(
            "BS".to_string(),
            vec![LapIcon {
                bracket_number: 2,
                racer_name: "佐藤".to_string(),
                x: 30,
                y: 40,
                has_arrow: true,
            }],
        );

        let row = LapPositionRow::from_sections("r1", &sections);
        assert_eq!(row.lap_shuukai.as_deref(), Some(r#"[[1,"山田",10,20,false]]"#));
        assert_eq!(row.lap_bs.as_deref(), Some(r#"[[2,"佐藤",30,40,true]]"#));
        assert!(row.lap_akaban.is_none());
        assert!(row.lap_dasho.is_none());
        assert!(row.lap_hs.is_none());
        assert!(!row.is_empty());
    }

    #[test]
    fn report_keys_keep_the_rank_suffix_and_clip_to_six_chars() {
        let report = ScrapedInspectionReport {
            player_name_reported: Some("西岡拓朗(1着)".to_string()),
            report_text: "強い風でした".to_string(),
            player_id: None,
        };
        assert_eq!(report_player_key(&report), "西岡拓朗(1");

        let by_id = ScrapedInspectionReport {
            player_name_reported: None,
            report_text: "x".to_string(),
            player_id: Some("01548099".to_string()),
        };
        assert_eq!(report_player_key(&by_id), "015480");
    }

    #[test]
    fn unknown_sections_are_ignored() {
        let mut sections = BTreeMap::new();
        sections.insert("未知区間".to_string(), Vec::new());
        let row = LapPositionRow::from_sections("r1", &sections);
        assert!(row.is_empty());
    }
}
