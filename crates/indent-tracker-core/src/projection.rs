//! Filtered, sorted view over an indent snapshot. Pure functions only.

use std::cmp::Reverse;
use std::collections::BTreeMap;

use crate::models::Indent;

/// Which units to show.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum UnitFilter {
    #[default]
    All,
    Unit(String),
}

impl UnitFilter {
    pub fn matches(&self, indent: &Indent) -> bool {
        match self {
            UnitFilter::All => true,
            UnitFilter::Unit(unit) => indent.unit == *unit,
        }
    }
}

/// Inputs of the list view.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewQuery {
    pub unit: UnitFilter,
    /// Matched case-insensitively against ward and staff; empty matches all.
    pub search: String,
}

impl ViewQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = UnitFilter::Unit(unit.into());
        self
    }

    pub fn search(mut self, search: impl Into<String>) -> Self {
        self.search = search.into();
        self
    }
}

fn matches_search(indent: &Indent, needle: &str) -> bool {
    needle.is_empty()
        || indent.ward.to_uppercase().contains(needle)
        || indent.staff.to_uppercase().contains(needle)
}

/// Filter then sort: collected indents after the rest, newest first within
/// each group. The sort is stable.
pub fn project(indents: &[Indent], query: &ViewQuery) -> Vec<Indent> {
    let needle = query.search.to_uppercase();
    let mut view: Vec<Indent> = indents
        .iter()
        .filter(|i| query.unit.matches(i) && matches_search(i, &needle))
        .cloned()
        .collect();
    view.sort_by_key(|i| (i.is_collected(), Reverse(i.created_at)));
    view
}

/// Ids of every collected indent, the input of "clear collected".
pub fn collected_ids(indents: &[Indent]) -> Vec<String> {
    indents
        .iter()
        .filter(|i| i.is_collected())
        .map(|i| i.id.clone())
        .collect()
}

/// Indent count per unit. Only units referenced by at least one indent
/// appear, whether or not they are still configured.
pub fn workload_by_unit(indents: &[Indent]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for indent in indents {
        *counts.entry(indent.unit.clone()).or_default() += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::IndentStatus;
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;

    fn indent(id: &str, unit: &str, ward: &str, status: IndentStatus, minute: u32) -> Indent {
        let created_at = Utc.with_ymd_and_hms(2024, 5, 1, 8, minute, 0).unwrap();
        Indent {
            id: id.into(),
            unit: unit.into(),
            ward: ward.into(),
            staff: "TIADA NAMA".into(),
            category: "Floor Stock".into(),
            status,
            created_at,
            done_at: (status != IndentStatus::Pending).then_some(created_at),
            collected_at: (status == IndentStatus::Collected).then_some(created_at),
            collected_by: (status == IndentStatus::Collected).then(|| "ALI".to_string()),
            note: String::new(),
        }
    }

    fn ids(view: &[Indent]) -> Vec<&str> {
        view.iter().map(|i| i.id.as_str()).collect()
    }

    #[test]
    fn test_collected_sorted_last_even_when_newest() {
        let indents = vec![
            indent("done", "A", "1A", IndentStatus::Done, 10),
            indent("collected", "A", "1A", IndentStatus::Collected, 59),
            indent("pending", "A", "1A", IndentStatus::Pending, 20),
        ];
        let view = project(&indents, &ViewQuery::all());
        assert_eq!(ids(&view), vec!["pending", "done", "collected"]);
    }

    #[test]
    fn test_search_matches_ward_case_insensitively() {
        let indents = vec![
            indent("a", "A", "4A-ICU", IndentStatus::Pending, 1),
            indent("b", "A", "5B", IndentStatus::Pending, 2),
            indent("c", "A", "4A", IndentStatus::Pending, 3),
        ];
        let view = project(&indents, &ViewQuery::all().search("4a"));
        assert_eq!(ids(&view), vec!["c", "a"]);
    }

    #[test]
    fn test_search_matches_staff() {
        let mut with_staff = indent("s", "A", "7C", IndentStatus::Pending, 1);
        with_staff.staff = "NURUL AIN".into();
        let indents = vec![with_staff, indent("x", "A", "8D", IndentStatus::Pending, 2)];
        assert_eq!(ids(&project(&indents, &ViewQuery::all().search("nurul"))), vec!["s"]);
    }

    #[test]
    fn test_unit_filter() {
        let indents = vec![
            indent("a", "Farmasi Satelit 1", "1A", IndentStatus::Pending, 1),
            indent("b", "Farmasi Kecemasan", "ED", IndentStatus::Pending, 2),
        ];
        let view = project(&indents, &ViewQuery::all().unit("Farmasi Kecemasan"));
        assert_eq!(ids(&view), vec!["b"]);
    }

    #[test]
    fn test_workload_counts_only_units_with_indents() {
        let indents = vec![
            indent("a", "Farmasi Satelit 1", "1A", IndentStatus::Pending, 1),
            indent("b", "Farmasi Satelit 1", "2A", IndentStatus::Done, 2),
            indent("c", "Farmasi Lama", "3A", IndentStatus::Pending, 3),
        ];
        let counts = workload_by_unit(&indents);
        assert_eq!(counts.len(), 2);
        assert_eq!(counts["Farmasi Satelit 1"], 2);
        assert_eq!(counts["Farmasi Lama"], 1);
        assert!(!counts.contains_key("Farmasi Kecemasan"));
        assert!(workload_by_unit(&[]).is_empty());
        assert_eq!(collected_ids(&indents), Vec::<String>::new());
    }

    fn status_strategy() -> impl Strategy<Value = IndentStatus> {
        prop_oneof![
            Just(IndentStatus::Pending),
            Just(IndentStatus::Done),
            Just(IndentStatus::Collected),
        ]
    }

    proptest! {
        #[test]
        fn test_projection_ordering(entries in prop::collection::vec((status_strategy(), 0u32..60), 0..30)) {
            let indents: Vec<Indent> = entries
                .iter()
                .enumerate()
                .map(|(n, (status, minute))| indent(&n.to_string(), "A", "1A", *status, *minute))
                .collect();
            let view = project(&indents, &ViewQuery::all());
            prop_assert_eq!(view.len(), indents.len());

            let first_collected = view.iter().position(|i| i.is_collected()).unwrap_or(view.len());
            prop_assert!(view[first_collected..].iter().all(|i| i.is_collected()));
            for pair in view.windows(2) {
                if pair[0].is_collected() == pair[1].is_collected() {
                    prop_assert!(pair[0].created_at >= pair[1].created_at);
                }
            }
        }
    }
}
