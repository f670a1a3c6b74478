//! Typed views of the Winticket JSON API responses.
//!
//! Field sets follow what the pipeline consumes; unknown fields are
//! ignored. All scalars go through the tolerant deserializers in
//! [`crate::de`] because the upstream mixes strings and numbers freely.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::de;

/// `GET /cups?date=YYYYMMDD&fields=month&pfm=web`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MonthlyCupsResponse {
    #[serde(default)]
    pub month: Option<MonthBlock>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MonthBlock {
    #[serde(default)]
    pub regions: Vec<ApiRegion>,
    #[serde(default)]
    pub venues: Vec<ApiVenue>,
    #[serde(default)]
    pub cups: Vec<ApiCup>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiRegion {
    #[serde(default, deserialize_with = "de::flex_string_opt")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiVenue {
    #[serde(default, deserialize_with = "de::flex_string_opt")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub name1: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub website_url: Option<String>,
    #[serde(default)]
    pub bank_feature: Option<String>,
    #[serde(default, deserialize_with = "de::flex_f64_opt")]
    pub track_straight_distance: Option<f64>,
    #[serde(default, deserialize_with = "de::flex_string_opt")]
    pub track_angle_center: Option<String>,
    #[serde(default, deserialize_with = "de::flex_string_opt")]
    pub track_angle_straight: Option<String>,
    #[serde(default, deserialize_with = "de::flex_i64_opt")]
    pub home_width: Option<i64>,
    #[serde(default, deserialize_with = "de::flex_i64_opt")]
    pub back_width: Option<i64>,
    #[serde(default, deserialize_with = "de::flex_f64_opt")]
    pub center_width: Option<f64>,
    #[serde(default, deserialize_with = "de::flex_string_opt")]
    pub region_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiCup {
    #[serde(default, deserialize_with = "de::flex_string_opt")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default, deserialize_with = "de::flex_i64_opt")]
    pub duration: Option<i64>,
    #[serde(default, deserialize_with = "de::flex_i64_opt")]
    pub grade: Option<i64>,
    #[serde(default, deserialize_with = "de::flex_string_opt")]
    pub venue_id: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default, deserialize_with = "de::flex_bool")]
    pub players_unfixed: bool,
}

/// `GET /cups/{cup_id}?fields=cup,schedules,races&pfm=web`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CupDetailResponse {
    #[serde(default)]
    pub cup: Option<ApiCupRef>,
    #[serde(default)]
    pub schedules: Vec<ApiSchedule>,
    #[serde(default)]
    pub races: Vec<ApiRace>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiCupRef {
    #[serde(default, deserialize_with = "de::flex_string_opt")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiSchedule {
    #[serde(default, deserialize_with = "de::flex_string_opt")]
    pub id: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default, deserialize_with = "de::flex_i64_opt")]
    pub day: Option<i64>,
    #[serde(default, deserialize_with = "de::flex_i64_opt")]
    pub index: Option<i64>,
    #[serde(default, deserialize_with = "de::flex_bool")]
    pub entries_unfixed: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiRace {
    #[serde(default, deserialize_with = "de::flex_string_opt")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "de::flex_string_opt")]
    pub schedule_id: Option<String>,
    #[serde(default, deserialize_with = "de::flex_i64_opt")]
    pub number: Option<i64>,
    #[serde(default, rename = "class")]
    pub class_name: Option<String>,
    #[serde(default)]
    pub race_type: Option<String>,
    #[serde(default, deserialize_with = "de::unix_ts_opt")]
    pub start_at: Option<i64>,
    #[serde(default, deserialize_with = "de::unix_ts_opt")]
    pub close_at: Option<i64>,
    #[serde(default, deserialize_with = "de::unix_ts_opt")]
    pub decided_at: Option<i64>,
    #[serde(default, deserialize_with = "de::flex_i64_opt")]
    pub status: Option<i64>,
    #[serde(default, deserialize_with = "de::flex_bool")]
    pub cancel: bool,
    #[serde(default)]
    pub cancel_reason: Option<String>,
    #[serde(default)]
    pub weather: Option<String>,
    #[serde(default, deserialize_with = "de::flex_string_opt")]
    pub wind_speed: Option<String>,
    #[serde(default)]
    pub race_type3: Option<String>,
    #[serde(default, deserialize_with = "de::flex_i64_opt")]
    pub distance: Option<i64>,
    #[serde(default, alias = "lapCount", deserialize_with = "de::flex_i64_opt")]
    pub lap: Option<i64>,
    #[serde(
        default,
        alias = "entriesCount",
        deserialize_with = "de::flex_i64_opt"
    )]
    pub entries_number: Option<i64>,
    #[serde(default, deserialize_with = "de::flex_bool")]
    pub is_grade_race: bool,
    #[serde(default, deserialize_with = "de::flex_bool")]
    pub has_digest_video: bool,
    #[serde(
        default,
        alias = "digestVideoUrl",
        deserialize_with = "de::flex_string_opt"
    )]
    pub digest_video: Option<String>,
    #[serde(
        default,
        alias = "digestVideoProviderName",
        deserialize_with = "de::flex_string_opt"
    )]
    pub digest_video_provider: Option<String>,
}

/// `GET /cups/{cup_id}/schedules/{index}/races/{race_number}`
/// with `fields=players,entries,records,linePrediction`.
///
/// The three list sections keep `Option` so presence can be checked: a
/// response carrying none of them fails the minimal shape check.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RaceCardResponse {
    #[serde(default)]
    pub players: Option<Vec<ApiPlayer>>,
    #[serde(default)]
    pub entries: Option<Vec<ApiEntry>>,
    #[serde(default)]
    pub records: Option<Vec<ApiPlayerRecord>>,
    #[serde(default)]
    pub line_prediction: Option<ApiLinePrediction>,
}

impl RaceCardResponse {
    /// At least one of players / entries / records must be present.
    pub fn has_required_sections(&self) -> bool {
        self.players.is_some() || self.entries.is_some() || self.records.is_some()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiPlayer {
    #[serde(default, deserialize_with = "de::flex_string_opt")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "class", deserialize_with = "de::flex_string_opt")]
    pub class_name: Option<String>,
    #[serde(default, rename = "group", deserialize_with = "de::flex_string_opt")]
    pub player_group: Option<String>,
    #[serde(default)]
    pub prefecture: Option<String>,
    #[serde(default, deserialize_with = "de::flex_i64_opt")]
    pub term: Option<i64>,
    #[serde(default, deserialize_with = "de::flex_string_opt")]
    pub region_id: Option<String>,
    #[serde(default)]
    pub yomi: Option<String>,
    #[serde(default, deserialize_with = "de::flex_string_opt")]
    pub birthday: Option<String>,
    #[serde(default, deserialize_with = "de::flex_i64_opt")]
    pub age: Option<i64>,
    #[serde(default, deserialize_with = "de::flex_string_opt")]
    pub gender: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiEntry {
    #[serde(default, deserialize_with = "de::flex_i64_opt")]
    pub number: Option<i64>,
    #[serde(default, deserialize_with = "de::flex_string_opt")]
    pub race_id: Option<String>,
    #[serde(default, deserialize_with = "de::flex_bool")]
    pub absent: bool,
    #[serde(default, deserialize_with = "de::flex_string_opt")]
    pub player_id: Option<String>,
    #[serde(default, deserialize_with = "de::flex_i64_opt")]
    pub bracket_number: Option<i64>,
    #[serde(default, deserialize_with = "de::flex_i64_opt")]
    pub player_current_term_class: Option<i64>,
    #[serde(default, deserialize_with = "de::flex_i64_opt")]
    pub player_current_term_group: Option<i64>,
    #[serde(default, deserialize_with = "de::flex_i64_opt")]
    pub player_previous_term_class: Option<i64>,
    #[serde(default, deserialize_with = "de::flex_i64_opt")]
    pub player_previous_term_group: Option<i64>,
    #[serde(default, deserialize_with = "de::flex_bool")]
    pub has_previous_class_group: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiPlayerRecord {
    #[serde(default, deserialize_with = "de::flex_string_opt")]
    pub player_id: Option<String>,
    #[serde(default, deserialize_with = "de::flex_f64_opt")]
    pub gear_ratio: Option<f64>,
    #[serde(default, deserialize_with = "de::flex_string_opt")]
    pub style: Option<String>,
    #[serde(default, deserialize_with = "de::flex_f64_opt")]
    pub race_point: Option<f64>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default, deserialize_with = "de::flex_i64_opt")]
    pub prediction_mark: Option<i64>,
    #[serde(default, deserialize_with = "de::flex_f64_opt")]
    pub first_rate: Option<f64>,
    #[serde(default, deserialize_with = "de::flex_f64_opt")]
    pub second_rate: Option<f64>,
    #[serde(default, deserialize_with = "de::flex_f64_opt")]
    pub third_rate: Option<f64>,
    #[serde(default, deserialize_with = "de::flex_bool")]
    pub has_modified_gear_ratio: bool,
    #[serde(default, deserialize_with = "de::flex_f64_opt")]
    pub modified_gear_ratio: Option<f64>,
    #[serde(default, deserialize_with = "de::flex_string_opt")]
    pub modified_gear_ratio_str: Option<String>,
    #[serde(default, deserialize_with = "de::flex_string_opt")]
    pub gear_ratio_str: Option<String>,
    #[serde(default, deserialize_with = "de::flex_string_opt")]
    pub race_point_str: Option<String>,
    #[serde(default, deserialize_with = "de::flex_string_opt")]
    pub previous_cup_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiLinePrediction {
    #[serde(default)]
    pub line_type: Option<String>,
    #[serde(default)]
    pub lines: Vec<ApiLineGroup>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ApiLineGroup {
    #[serde(default)]
    pub numbers: Vec<i64>,
    #[serde(default)]
    pub entries: Vec<ApiLineEntry>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ApiLineEntry {
    #[serde(default)]
    pub numbers: Vec<i64>,
}

/// `GET /cups/{cup_id}/schedules/{index}/races/{race_number}/odds?pfm=web`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OddsResponse {
    #[serde(default)]
    pub exacta: Vec<ApiOddsItem>,
    #[serde(default)]
    pub quinella: Vec<ApiOddsItem>,
    #[serde(default)]
    pub quinella_place: Vec<ApiOddsItem>,
    #[serde(default)]
    pub trifecta: Vec<ApiOddsItem>,
    #[serde(default)]
    pub trio: Vec<ApiOddsItem>,
    #[serde(default)]
    pub bracket_exacta: Vec<ApiOddsItem>,
    #[serde(default)]
    pub bracket_quinella: Vec<ApiOddsItem>,
    #[serde(default, deserialize_with = "de::flex_string_opt")]
    pub payout_status: Option<String>,
    #[serde(default, deserialize_with = "de::flex_bool")]
    pub is_aggregated: bool,
    #[serde(default, deserialize_with = "de::unix_ts_opt")]
    pub updated_at: Option<i64>,
    #[serde(default, deserialize_with = "de::flex_bool")]
    pub odds_delayed: bool,
    #[serde(default, deserialize_with = "de::flex_bool")]
    pub final_odds: bool,
}

impl OddsResponse {
    /// A response with no rows under any bet-type key carries no odds at
    /// all, which stage 4 records as `no_data`.
    pub fn is_effectively_empty(&self) -> bool {
        self.exacta.is_empty()
            && self.quinella.is_empty()
            && self.quinella_place.is_empty()
            && self.trifecta.is_empty()
            && self.trio.is_empty()
            && self.bracket_exacta.is_empty()
            && self.bracket_quinella.is_empty()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiOddsItem {
    #[serde(default)]
    pub key: Vec<Value>,
    #[serde(default)]
    pub numbers: Vec<Value>,
    #[serde(default)]
    pub brackets: Vec<Value>,
    #[serde(default, deserialize_with = "de::flex_f64_opt")]
    pub odds: Option<f64>,
    #[serde(default, deserialize_with = "de::flex_f64_opt")]
    pub min_odds: Option<f64>,
    #[serde(default, deserialize_with = "de::flex_f64_opt")]
    pub max_odds: Option<f64>,
    #[serde(default, rename = "type", deserialize_with = "de::flex_i64_opt")]
    pub type_code: Option<i64>,
    #[serde(default, deserialize_with = "de::flex_i64_opt")]
    pub popularity_order: Option<i64>,
    #[serde(default, deserialize_with = "de::flex_string_opt")]
    pub odds_str: Option<String>,
    #[serde(default, deserialize_with = "de::flex_string_opt")]
    pub min_odds_str: Option<String>,
    #[serde(default, deserialize_with = "de::flex_string_opt")]
    pub max_odds_str: Option<String>,
    #[serde(default, deserialize_with = "de::flex_i64_opt")]
    pub unit_price: Option<i64>,
    #[serde(default, deserialize_with = "de::flex_i64_opt")]
    pub payoff_unit_price: Option<i64>,
    #[serde(default, deserialize_with = "de::flex_bool_opt")]
    pub absent: Option<bool>,
}

impl ApiOddsItem {
    /// The combination array, wherever the API put it (`key`, then
    /// `numbers`, then `brackets`). `None` when any element is not an
    /// integer-like value.
    pub fn combination(&self) -> Option<Vec<i64>> {
        let raw = if !self.key.is_empty() {
            &self.key
        } else if !self.numbers.is_empty() {
            &self.numbers
        } else {
            &self.brackets
        };
        if raw.is_empty() {
            return None;
        }
        raw.iter().map(de::value_to_i64).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn monthly_response_deserializes_mixed_scalars() {
        let payload = json!({
            "month": {
                "regions": [{"id": 1, "name": "東日本"}],
                "venues": [{"id": "v1", "name": "川崎", "homeWidth": "10", "regionId": "r1"}],
                "cups": [{
                    "id": "c1", "name": "T1",
                    "startDate": "2024-01-10", "endDate": "2024-01-12",
                    "duration": "3", "grade": 2, "venueId": "v1",
                    "labels": ["GI"], "playersUnfixed": "false"
                }]
            }
        });
        let parsed: MonthlyCupsResponse = serde_json::from_value(payload).unwrap();
        let month = parsed.month.unwrap();
        assert_eq!(month.regions[0].id.as_deref(), Some("1"));
        assert_eq!(month.venues[0].home_width, Some(10));
        let cup = &month.cups[0];
        assert_eq!(cup.duration, Some(3));
        assert!(!cup.players_unfixed);
    }

    #[test]
    fn race_timestamps_normalize_to_unix_seconds() {
        let payload = json!({
            "races": [{
                "id": "r1",
                "startAt": "2024-01-10T05:00:00Z",
                "closeAt": "2024-01-10 04:50:00",
                "decidedAt": "0000-00-00 00:00:00",
                "status": "2",
                "cancel": "false",
                "lapCount": 4
            }]
        });
        let parsed: CupDetailResponse = serde_json::from_value(payload).unwrap();
        let race = &parsed.races[0];
        assert_eq!(race.start_at, Some(1_704_862_800));
        assert_eq!(race.close_at, Some(1_704_862_200));
        assert_eq!(race.decided_at, None);
        assert_eq!(race.status, Some(2));
        assert!(!race.cancel);
        assert_eq!(race.lap, Some(4));
    }

    #[test]
    fn race_card_shape_check_requires_one_section() {
        let empty: RaceCardResponse = serde_json::from_value(json!({})).unwrap();
        assert!(!empty.has_required_sections());

        let with_entries: RaceCardResponse =
            serde_json::from_value(json!({"entries": []})).unwrap();
        assert!(with_entries.has_required_sections());
    }

    #[test]
    fn odds_response_empty_when_no_bet_type_has_rows() {
        let parsed: OddsResponse =
            serde_json::from_value(json!({"updatedAt": "2024-01-10T05:00:00Z"})).unwrap();
        assert!(parsed.is_effectively_empty());
        assert_eq!(parsed.updated_at, Some(1_704_862_800));

        let with_rows: OddsResponse = serde_json::from_value(json!({
            "exacta": [{"numbers": [1, 2], "odds": 3.5}]
        }))
        .unwrap();
        assert!(!with_rows.is_effectively_empty());
    }

    #[test]
    fn odds_combination_prefers_key_and_tolerates_strings() {
        let item: ApiOddsItem =
            serde_json::from_value(json!({"key": ["2", 1], "numbers": [9]})).unwrap();
        assert_eq!(item.combination(), Some(vec![2, 1]));

        let fallback: ApiOddsItem =
            serde_json::from_value(json!({"brackets": [3, 4]})).unwrap();
        assert_eq!(fallback.combination(), Some(vec![3, 4]));

        let broken: ApiOddsItem =
            serde_json::from_value(json!({"numbers": [1, "x"]})).unwrap();
        assert_eq!(broken.combination(), None);
    }
}
