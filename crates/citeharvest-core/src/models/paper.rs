use std::collections::BTreeMap;
use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

/// Inclusive range of years tracked in the per-year citation columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct YearRange {
    pub min: i32,
    pub max: i32,
}

impl Default for YearRange {
    fn default() -> Self {
        Self {
            min: 2014,
            max: 2024,
        }
    }
}

impl YearRange {
    pub fn new(min: i32, max: i32) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, year: i32) -> bool {
        self.min <= year && year <= self.max
    }

    pub fn years(&self) -> RangeInclusive<i32> {
        self.min..=self.max
    }

    pub fn is_valid(&self) -> bool {
        self.min <= self.max
    }
}

/// A row of a conference table, seen through the columns this crate owns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaperRecord {
    pub title: String,
    pub publication_year: Option<i32>,
    pub external_id: Option<String>,
    pub citation_count: Option<u32>,
    pub yearly_citations: Option<BTreeMap<i32, u32>>,
    pub top_conf_citations: Option<u32>,
    pub top_journal_citations: Option<u32>,
    pub top_venue_citation_count: Option<u32>,
}

impl PaperRecord {
    /// A record is resolved once it carries an external identifier.
    pub fn is_resolved(&self) -> bool {
        self.external_id.is_some()
    }

    /// Derived fields are either all present or all absent.
    pub fn is_consistent(&self) -> bool {
        let derived = [
            self.citation_count.is_some(),
            self.yearly_citations.is_some(),
            self.top_conf_citations.is_some(),
            self.top_journal_citations.is_some(),
            self.top_venue_citation_count.is_some(),
        ];
        let resolved = self.is_resolved();
        derived.iter().all(|present| *present == resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn year_range_bounds_are_inclusive() {
        let range = YearRange::default();
        assert!(range.contains(2014));
        assert!(range.contains(2024));
        assert!(!range.contains(2013));
        assert!(!range.contains(2025));
        assert_eq!(range.years().count(), 11);
    }

    #[test]
    fn unresolved_record_without_derived_fields_is_consistent() {
        let record = PaperRecord {
            title: "A".to_string(),
            ..Default::default()
        };
        assert!(!record.is_resolved());
        assert!(record.is_consistent());
    }

    #[test]
    fn record_with_id_but_no_counts_is_inconsistent() {
        let record = PaperRecord {
            title: "A".to_string(),
            external_id: Some("X".to_string()),
            ..Default::default()
        };
        assert!(!record.is_consistent());
    }
}
