//! Finishing-order table extraction.

use keirin_contracts::{ParsedRacePage, RANK_FELL, ScrapedRaceResult};
use scraper::Html;
use tracing::warn;

use crate::error::{ParseResult, selector};
use crate::text::{element_text, normalize};

/// Rows above this index in the tbody are headers.
const HEADER_ROWS: usize = 2;
/// Columns expected per result row, up to 個人状況.
const MIN_CELLS: usize = 14;

pub(crate) fn extract(document: &Html, page: &mut ParsedRacePage) -> ParseResult<()> {
    let table_sel = selector("table.result-table-detail")?;
    let row_sel = selector("tbody tr")?;
    let cell_sel = selector("td")?;
    let bracket_sel = selector("span, div, i")?;
    let link_sel = selector("a")?;

    let Some(table) = document.select(&table_sel).next() else {
        warn!(race_id = %page.race_id, "result table not found");
        return Ok(());
    };

    let rows: Vec<_> = table.select(&row_sel).collect();
    if rows.len() <= HEADER_ROWS {
        warn!(race_id = %page.race_id, rows = rows.len(), "result table has no data rows");
        return Ok(());
    }

    for row in &rows[HEADER_ROWS..] {
        let cells: Vec<_> = row.select(&cell_sel).collect();
        if cells.len() < MIN_CELLS {
            warn!(
                race_id = %page.race_id,
                cells = cells.len(),
                "result row has too few cells"
            );
            page.problematic_rows.push(row.html());
            continue;
        }

        let bracket_number = cells[1]
            .select(&bracket_sel)
            .next()
            .map(element_text)
            .and_then(|t| t.parse::<i64>().ok());
        let Some(bracket_number) = bracket_number else {
            warn!(race_id = %page.race_id, "result row without bracket number");
            page.problematic_rows.push(row.html());
            continue;
        };

        let rank_text = element_text(cells[0]);
        let rank = if rank_text == "落" {
            Some(RANK_FELL)
        } else {
            rank_text.parse::<i64>().ok()
        };

        let player_link = cells[3].select(&link_sel).next();
        let player_name = player_link
            .map(element_text)
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| element_text(cells[3]));
        let player_id_scraped = player_link
            .and_then(|link| link.value().attr("href"))
            .and_then(trailing_numeric_segment);

        let last_lap_time = element_text(cells[9]);

        page.race_results.push(ScrapedRaceResult {
            bracket_number,
            rank,
            rank_text,
            mark: element_text(cells[2]),
            player_name,
            player_id_scraped,
            player_id: None,
            age: element_text(cells[4]).parse().ok(),
            prefecture: element_text(cells[5]),
            period: normalize(&element_text(cells[6]).replace('期', ""))
                .parse()
                .ok(),
            class: element_text(cells[7]),
            diff: element_text(cells[8]),
            time: last_lap_time.parse().ok(),
            last_lap_time,
            winning_technique: element_text(cells[10]),
            symbols: element_text(cells[11]),
            win_factor: element_text(cells[12]),
            personal_status: element_text(cells[13]),
        });
    }

    Ok(())
}

/// Rider id from a profile link: the last path segment when it is numeric.
fn trailing_numeric_segment(href: &str) -> Option<String> {
    let segment = href.trim_end_matches('/').rsplit('/').next()?;
    if !segment.is_empty() && segment.chars().all(|c| c.is_ascii_digit()) {
        Some(segment.to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_trailing_segment_is_the_rider_id() {
        assert_eq!(
            trailing_numeric_segment("/racer/data/015480").as_deref(),
            Some("015480")
        );
        assert_eq!(trailing_numeric_segment("/racer/data/profile"), None);
        assert_eq!(trailing_numeric_segment(""), None);
    }
}
