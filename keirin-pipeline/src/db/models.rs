//! Read-side row shapes shared across queries and updaters.

use chrono::NaiveDate;
use serde::Serialize;

/// One race an API stage (3 or 4) should work on.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct RaceWorkItem {
    pub race_id: String,
    pub cup_id: String,
    /// Schedule index within the cup, the `{index}` URL segment.
    pub race_index: i64,
    pub race_number: i64,
}

/// One race stage 5 should scrape, with the URL ingredients.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ResultWorkItem {
    pub race_id: String,
    pub race_date: NaiveDate,
    pub venue_code: String,
    pub race_number: i64,
    pub cup_start_date: NaiveDate,
}
