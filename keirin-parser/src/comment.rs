//! Race comment extraction from the payouts table footer.

use keirin_contracts::ParsedRacePage;
use scraper::Html;

use crate::error::{ParseResult, selector};
use crate::text::element_text;

pub(crate) fn extract(document: &Html, page: &mut ParsedRacePage) -> ParseResult<()> {
    let footer_sel = selector("table.result-pay tfoot td")?;

    page.race_comment = document
        .select(&footer_sel)
        .map(element_text)
        .find(|text| !text.is_empty());

    Ok(())
}
