//! Lap-position extraction: per track section, the bike icons with their
//! CSS-class-encoded bracket number and coordinates.

use keirin_contracts::{LapIcon, ParsedRacePage};
use scraper::{ElementRef, Html};
use tracing::warn;

use crate::error::{ParseResult, selector};
use crate::text::{element_text, remove_spaces};

pub(crate) fn extract(document: &Html, page: &mut ParsedRacePage) -> ParseResult<()> {
    let wrapper_sel = selector("div.result-b-hyo-lap-wrapper")?;
    let block_sel = selector("div.b-hyo")?;
    let table_sel = selector("table.mawari")?;
    let header_sel = selector("th")?;
    let lap_cell_sel = selector("td.lap-wrapper")?;
    let icon_sel = selector("span.bike-icon-wrapper")?;
    let name_sel = selector("span.racer-nm")?;
    let bike_icon_sel = selector("span.bike-icon")?;

    let Some(wrapper) = document.select(&wrapper_sel).next() else {
        return Ok(());
    };

    for block in wrapper.select(&block_sel) {
        let Some(table) = block.select(&table_sel).next() else {
            continue;
        };
        let section_name = table
            .select(&header_sel)
            .next()
            .map(|th| remove_spaces(&element_text(th)))
            .unwrap_or_default();
        if section_name.is_empty() {
            warn!(race_id = %page.race_id, "lap block without a section label");
            continue;
        }

        let Some(lap_cell) = table.select(&lap_cell_sel).next() else {
            continue;
        };

        let mut icons = Vec::new();
        for icon_wrapper in lap_cell.select(&icon_sel) {
            let Some((bracket_number, x, y)) = positional_classes(icon_wrapper) else {
                warn!(
                    race_id = %page.race_id,
                    section = %section_name,
                    "bike icon missing positional classes"
                );
                continue;
            };

            let racer_name = icon_wrapper
                .select(&name_sel)
                .next()
                .map(element_text)
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| {
                    if bracket_number == 0 {
                        "誘導員".to_string()
                    } else {
                        "不明".to_string()
                    }
                });

            // the arrow marker lives on the child bike-icon element
            let has_arrow = icon_wrapper
                .select(&bike_icon_sel)
                .next()
                .map(|icon| icon.value().classes().any(|class| class == "arrow"))
                .unwrap_or(false);

            icons.push(LapIcon {
                bracket_number,
                racer_name,
                x,
                y,
                has_arrow,
            });
        }

        if !icons.is_empty() {
            page.lap_positions.insert(section_name, icons);
        }
    }

    Ok(())
}

/// `bikeno-N`, `x-N` and `y-N` classes on the icon wrapper.
fn positional_classes(element: ElementRef<'_>) -> Option<(i64, i64, i64)> {
    let mut bracket = None;
    let mut x = None;
    let mut y = None;
    for class in element.value().classes() {
        if let Some(rest) = class.strip_prefix("bikeno-") {
            bracket = rest.parse().ok();
        } else if let Some(rest) = class.strip_prefix("x-") {
            x = rest.parse().ok();
        } else if let Some(rest) = class.strip_prefix("y-") {
            y = rest.parse().ok();
        }
    }
    Some((bracket?, x?, y?))
}
