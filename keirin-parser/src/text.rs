//! Text normalization helpers for scraped content.

use scraper::ElementRef;
use unicode_normalization::UnicodeNormalization;

/// NFKC-normalize and collapse runs of whitespace to single spaces.
pub fn normalize(text: &str) -> String {
    let normalized: String = text.nfkc().collect();
    normalized.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Concatenated, normalized text content of an element.
pub fn element_text(element: ElementRef<'_>) -> String {
    normalize(&element.text().collect::<String>())
}

/// Remove ASCII and full-width spaces.
pub fn remove_spaces(text: &str) -> String {
    text.chars().filter(|c| *c != ' ' && *c != '　').collect()
}

/// Strip a trailing `(1着)`-style rank suffix from a reported rider name.
pub fn name_without_rank(reported: &str) -> String {
    let trimmed = reported.trim();
    let cut = trimmed
        .find(['(', '（'])
        .map(|idx| &trimmed[..idx])
        .unwrap_or(trimmed);
    normalize(cut)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_applies_nfkc_and_collapses_whitespace() {
        // full-width digits and spaces fold to ASCII
        assert_eq!(normalize("１２３　 ａｂｃ"), "123 abc");
        assert_eq!(normalize("  周回\n data  "), "周回 data");
    }

    #[test]
    fn space_removal_covers_full_width() {
        assert_eq!(remove_spaces("西岡 拓朗　(1着)"), "西岡拓朗(1着)");
    }

    #[test]
    fn rank_suffix_is_stripped_for_both_paren_kinds() {
        assert_eq!(name_without_rank("西岡拓朗(1着)"), "西岡拓朗");
        assert_eq!(name_without_rank("山田太郎（2着）"), "山田太郎");
        assert_eq!(name_without_rank("佐藤次郎"), "佐藤次郎");
    }
}
