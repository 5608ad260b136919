use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::paper::YearRange;

/// One paper citing the paper being enriched, as reported by a source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitationEvent {
    pub citing_paper_id: String,
    #[serde(default)]
    pub citing_venue: Option<String>,
    #[serde(default)]
    pub citing_year: Option<i32>,
}

impl CitationEvent {
    pub fn new(
        citing_paper_id: impl Into<String>,
        citing_venue: Option<String>,
        citing_year: Option<i32>,
    ) -> Self {
        Self {
            citing_paper_id: citing_paper_id.into(),
            citing_venue,
            citing_year,
        }
    }
}

/// Aggregated citation counts for one paper.
///
/// `yearly` always holds every year of the range it was built for, so a
/// written record never has a partial histogram.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitationStats {
    pub yearly: BTreeMap<i32, u32>,
    pub top_conf_citations: u32,
    pub top_journal_citations: u32,
    pub top_venue_citations: u32,
}

impl CitationStats {
    pub fn zeroed(range: YearRange) -> Self {
        Self {
            yearly: range.years().map(|year| (year, 0)).collect(),
            top_conf_citations: 0,
            top_journal_citations: 0,
            top_venue_citations: 0,
        }
    }

    /// Sum of the per-year buckets.
    pub fn in_range_total(&self) -> u32 {
        self.yearly.values().sum()
    }
}

/// Everything a successful fetch writes into one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CitationFields {
    pub external_id: String,
    pub citation_count: u32,
    pub stats: CitationStats,
}
