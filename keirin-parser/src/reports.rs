//! Inspection-report extraction and splitting.
//!
//! Report paragraphs carry several riders' comments in one text blob,
//! delimited as `【Name(rank)】「content」` or `【Name(rank)】content`. A blob
//! with no such delimiters becomes a single unattributed report.

use keirin_contracts::{ParsedRacePage, ScrapedInspectionReport};
use scraper::Html;

use crate::error::{ParseResult, selector};
use crate::text::{element_text, remove_spaces};

pub(crate) fn extract(document: &Html, page: &mut ParsedRacePage) -> ParseResult<()> {
    let report_sel = selector("p.result-kensya-report-text")?;

    for paragraph in document.select(&report_sel) {
        let blob = element_text(paragraph);
        if blob.is_empty() {
            continue;
        }

        let split = split_reports(&blob);
        if split.is_empty() {
            page.inspection_reports.push(ScrapedInspectionReport {
                player_name_reported: None,
                report_text: blob,
                player_id: None,
            });
        } else {
            page.inspection_reports.extend(split);
        }
    }

    Ok(())
}

/// Split a report blob on `【Name】` delimiters. Quoted content keeps only
/// the text up to the closing `」`; unquoted content runs to the next `【`.
/// Names keep their rank suffix and lose all spaces.
pub fn split_reports(blob: &str) -> Vec<ScrapedInspectionReport> {
    let mut reports = Vec::new();

    for block in blob.split('【').skip(1) {
        let Some((name_part, rest)) = block.split_once('】') else {
            continue;
        };
        let name = remove_spaces(name_part.trim());

        let rest = rest.trim();
        let content = match rest.strip_prefix('「') {
            Some(quoted) => quoted.split('」').next().unwrap_or(""),
            None => rest,
        }
        .trim();

        if !name.is_empty() && !content.is_empty() {
            reports.push(ScrapedInspectionReport {
                player_name_reported: Some(name),
                report_text: content.to_string(),
                player_id: None,
            });
        }
    }

    reports
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoted_reports_split_per_rider() {
        let blob = "【西岡 拓朗(1着)】「強い風でした」【山田 太郎(2着)】「追込み届かず」";
        let reports = split_reports(blob);
        assert_eq!(reports.len(), 2);
        assert_eq!(
            reports[0].player_name_reported.as_deref(),
            Some("西岡拓朗(1着)")
        );
        assert_eq!(reports[0].report_text, "強い風でした");
        assert_eq!(
            reports[1].player_name_reported.as_deref(),
            Some("山田太郎(2着)")
        );
        assert_eq!(reports[1].report_text, "追込み届かず");
    }

    #[test]
    fn unquoted_reports_run_to_the_next_delimiter() {
        let blob = "【佐藤(3着)】展開が向かなかった【鈴木(4着)】脚は仕上がっていた";
        let reports = split_reports(blob);
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].report_text, "展開が向かなかった");
        assert_eq!(reports[1].report_text, "脚は仕上がっていた");
    }

    #[test]
    fn unterminated_quote_keeps_the_tail() {
        let blob = "【高橋(5着)】「悔しい一戦";
        let reports = split_reports(blob);
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].report_text, "悔しい一戦");
    }

    #[test]
    fn text_after_a_closing_quote_is_dropped() {
        let blob = "【中村(6着)】「仕掛けが早すぎた」と振り返った";
        let reports = split_reports(blob);
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].report_text, "仕掛けが早すぎた");
    }

    #[test]
    fn blob_without_delimiters_yields_nothing() {
        assert!(split_reports("本日の検車場は平穏でした").is_empty());
    }
}
