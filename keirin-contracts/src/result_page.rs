//! Contract between the Yenjoy result-page parser and the stage-5 updater.
//!
//! The parser fills these structs from HTML alone; player-identity
//! reconciliation against the database happens afterwards in the updater,
//! which sets the `player_id` fields.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{SeqAccess, Visitor};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Rank stored for a rider who fell (`落`).
pub const RANK_FELL: i64 = 99;

/// Everything extracted from one result page.
#[derive(Debug, Clone, Default)]
pub struct ParsedRacePage {
    pub race_id: String,
    pub race_results: Vec<ScrapedRaceResult>,
    pub race_comment: Option<String>,
    /// Section label (周回 / 赤板 / 打鐘 / HS / BS) to icon rows, in
    /// document order. Sections with no rows are omitted.
    pub lap_positions: BTreeMap<String, Vec<LapIcon>>,
    pub inspection_reports: Vec<ScrapedInspectionReport>,
    /// True when none of the four sections yielded a row.
    pub is_empty: bool,
    /// True when any section extractor failed.
    pub parse_error: bool,
    /// Raw HTML of result rows that could not be extracted.
    pub problematic_rows: Vec<String>,
}

impl ParsedRacePage {
    pub fn new(race_id: impl Into<String>) -> Self {
        Self {
            race_id: race_id.into(),
            ..Default::default()
        }
    }

    pub fn finalize(&mut self) {
        self.is_empty = self.race_results.is_empty()
            && self.race_comment.is_none()
            && self.lap_positions.is_empty()
            && self.inspection_reports.is_empty();
    }
}

/// One row of the finishing-order table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScrapedRaceResult {
    pub bracket_number: i64,
    pub rank: Option<i64>,
    pub rank_text: String,
    pub mark: String,
    pub player_name: String,
    /// Rider id scraped from the profile link, if any.
    pub player_id_scraped: Option<String>,
    /// Rider id resolved against `entries`; set by the updater.
    pub player_id: Option<String>,
    pub age: Option<i64>,
    pub prefecture: String,
    pub period: Option<i64>,
    pub class: String,
    pub diff: String,
    pub time: Option<f64>,
    pub last_lap_time: String,
    pub winning_technique: String,
    pub symbols: String,
    pub win_factor: String,
    pub personal_status: String,
}

/// One post-race rider comment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScrapedInspectionReport {
    /// Reported name with the rank suffix preserved and spaces removed,
    /// e.g. `西岡拓朗(1着)`. None when the page did not attribute the text.
    pub player_name_reported: Option<String>,
    pub report_text: String,
    /// Resolved against `entries` via the results table; set by the updater.
    pub player_id: Option<String>,
}

/// One bike icon in a lap-position section.
///
/// Serializes to the stored wire format, a 5-element array:
/// `[bracket_number, racer_name, x, y, has_arrow]`.
#[derive(Debug, Clone, PartialEq)]
pub struct LapIcon {
    pub bracket_number: i64,
    pub racer_name: String,
    pub x: i64,
    pub y: i64,
    pub has_arrow: bool,
}

impl Serialize for LapIcon {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(5))?;
        seq.serialize_element(&self.bracket_number)?;
        seq.serialize_element(&self.racer_name)?;
        seq.serialize_element(&self.x)?;
        seq.serialize_element(&self.y)?;
        seq.serialize_element(&self.has_arrow)?;
        seq.end()
    }
}

impl<'de> Deserialize<'de> for LapIcon {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TupleVisitor;

        impl<'de> Visitor<'de> for TupleVisitor {
            type Value = LapIcon;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a [bracket, name, x, y, arrow] array")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<LapIcon, A::Error> {
                let bracket_number = seq
                    .next_element()?
                    .ok_or_else(|| serde::de::Error::invalid_length(0, &self))?;
                let racer_name = seq
                    .next_element()?
                    .ok_or_else(|| serde::de::Error::invalid_length(1, &self))?;
                let x = seq
                    .next_element()?
                    .ok_or_else(|| serde::de::Error::invalid_length(2, &self))?;
                let y = seq
                    .next_element()?
                    .ok_or_else(|| serde::de::Error::invalid_length(3, &self))?;
                let has_arrow = seq
                    .next_element()?
                    .ok_or_else(|| serde::de::Error::invalid_length(4, &self))?;
                Ok(LapIcon {
                    bracket_number,
                    racer_name,
                    x,
                    y,
                    has_arrow,
                })
            }
        }

        deserializer.deserialize_seq(TupleVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lap_icon_round_trips_as_five_tuple() {
        let icon = LapIcon {
            bracket_number: 3,
            racer_name: "山田太郎".to_string(),
            x: 120,
            y: 45,
            has_arrow: true,
        };
        let json = serde_json::to_string(&icon).unwrap();
        assert_eq!(json, r#"[3,"山田太郎",120,45,true]"#);

        let back: LapIcon = serde_json::from_str(&json).unwrap();
        assert_eq!(back, icon);
    }

    #[test]
    fn page_is_empty_only_when_every_section_is() {
        let mut page = ParsedRacePage::new("r1");
        page.finalize();
        assert!(page.is_empty);

        let mut page = ParsedRacePage::new("r1");
        page.race_comment = Some("snappy finish".to_string());
        page.finalize();
        assert!(!page.is_empty);
    }
}
