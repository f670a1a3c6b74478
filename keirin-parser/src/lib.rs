//! # Keirin Parser
//!
//! Extracts structured data from Yenjoy race result pages:
//!
//! - finishing order (results table)
//! - the race comment from the payouts table footer
//! - per-section lap positions (周回 / 赤板 / 打鐘 / HS / BS)
//! - post-race inspection reports
//!
//! The parser never touches the database; rider-identity reconciliation is
//! layered on top by the stage-5 updater.

pub mod error;
pub mod text;

mod comment;
mod laps;
mod reports;
mod results;

pub use error::{ParseError, ParseResult};
pub use reports::split_reports;

use keirin_contracts::ParsedRacePage;
use scraper::Html;
use tracing::error;

/// Parse one result page. Section extractors fail independently: a broken
/// section sets `parse_error` and the remaining sections still run.
pub fn parse_result_page(html: &str, race_id: &str) -> ParsedRacePage {
    let document = Html::parse_document(html);
    let mut page = ParsedRacePage::new(race_id);

    if let Err(e) = results::extract(&document, &mut page) {
        error!(race_id, error = %e, "results table extraction failed");
        page.parse_error = true;
    }
    if let Err(e) = comment::extract(&document, &mut page) {
        error!(race_id, error = %e, "race comment extraction failed");
        page.parse_error = true;
    }
    if let Err(e) = laps::extract(&document, &mut page) {
        error!(race_id, error = %e, "lap position extraction failed");
        page.parse_error = true;
    }
    if let Err(e) = reports::extract(&document, &mut page) {
        error!(race_id, error = %e, "inspection report extraction failed");
        page.parse_error = true;
    }

    page.finalize();
    page
}
