//! Line-formation string composition.
//!
//! The predicted line structure from the API becomes a compact string:
//! groups joined with `―`, entries within a group joined with `・`, and
//! multi-rider entries bracketed with their numbers sorted ascending,
//! e.g. `1・2―[4・7]―6`.

use keirin_contracts::ApiLineGroup;

pub const GROUP_SEPARATOR: &str = "―";
pub const ENTRY_SEPARATOR: &str = "・";

pub fn line_formation(lines: &[ApiLineGroup]) -> String {
    let parts: Vec<String> = lines
        .iter()
        .map(group_part)
        .filter(|part| !part.is_empty())
        .collect();
    parts.join(GROUP_SEPARATOR)
}

fn group_part(group: &ApiLineGroup) -> String {
    let mut parts: Vec<String> = group
        .entries
        .iter()
        .filter_map(|entry| numbers_part(&entry.numbers))
        .collect();
    if let Some(direct) = numbers_part(&group.numbers) {
        parts.push(direct);
    }
    parts.join(ENTRY_SEPARATOR)
}

fn numbers_part(numbers: &[i64]) -> Option<String> {
    match numbers {
        [] => None,
        [single] => Some(single.to_string()),
        many => {
            let mut sorted = many.to_vec();
            sorted.sort_unstable();
            let joined = sorted
                .iter()
                .map(i64::to_string)
                .collect::<Vec<_>>()
                .join(ENTRY_SEPARATOR);
            Some(format!("[{joined}]"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keirin_contracts::ApiLineEntry;
    use proptest::prelude::*;

    fn group(entries: Vec<Vec<i64>>) -> ApiLineGroup {
        ApiLineGroup {
            numbers: Vec::new(),
            entries: entries
                .into_iter()
                .map(|numbers| ApiLineEntry { numbers })
                .collect(),
        }
    }

    #[test]
    fn composes_the_documented_example() {
        let lines = vec![
            group(vec![vec![1], vec![2]]),
            group(vec![vec![4, 7]]),
            group(vec![vec![6]]),
        ];
        assert_eq!(line_formation(&lines), "1・2―[4・7]―6");
    }

    #[test]
    fn direct_numbers_on_a_group_are_a_bare_entry() {
        let lines = vec![ApiLineGroup {
            numbers: vec![5],
            entries: Vec::new(),
        }];
        assert_eq!(line_formation(&lines), "5");
    }

    #[test]
    fn multi_rider_entries_sort_ascending() {
        let lines = vec![group(vec![vec![7, 4, 9]])];
        assert_eq!(line_formation(&lines), "[4・7・9]");
    }

    #[test]
    fn empty_groups_vanish() {
        let lines = vec![group(vec![]), group(vec![vec![3]]), group(vec![vec![]])];
        assert_eq!(line_formation(&lines), "3");
    }

    proptest! {
        /// The grammar holds for arbitrary group structures: one segment
        /// per non-empty group, singleton entries are bare numbers, and
        /// multi-number entries are bracketed ascending joins.
        #[test]
        fn formation_follows_the_grammar(
            groups in proptest::collection::vec(
                proptest::collection::vec(
                    proptest::collection::vec(1i64..=9, 1..4),
                    1..4,
                ),
                1..4,
            )
        ) {
            let lines: Vec<ApiLineGroup> = groups.iter().cloned().map(group).collect();
            let formation = line_formation(&lines);

            let expected = groups
                .iter()
                .map(|entries| {
                    entries
                        .iter()
                        .map(|numbers| {
                            if numbers.len() == 1 {
                                numbers[0].to_string()
                            } else {
                                let mut sorted = numbers.clone();
                                sorted.sort_unstable();
                                format!(
                                    "[{}]",
                                    sorted
                                        .iter()
                                        .map(i64::to_string)
                                        .collect::<Vec<_>>()
                                        .join(ENTRY_SEPARATOR)
                                )
                            }
                        })
                        .collect::<Vec<_>>()
                        .join(ENTRY_SEPARATOR)
                })
                .collect::<Vec<_>>()
                .join(GROUP_SEPARATOR);

            prop_assert_eq!(formation, expected);
        }
    }
}
