use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use citeharvest_core::{CitationFields, VenueConfig, YearRange};
use serde::Serialize;
use tracing::{debug, warn};

use crate::aggregate::aggregate;
use crate::matcher::TitleMatcher;
use crate::sources::CitationSource;

pub mod fallback;
pub mod pool;
pub mod primary;

pub use fallback::FallbackFetcher;
pub use primary::PrimaryFetcher;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Pass {
    Primary,
    Fallback,
    Classify,
}

impl fmt::Display for Pass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Primary => "primary",
            Self::Fallback => "fallback",
            Self::Classify => "classify",
        };
        f.write_str(name)
    }
}

/// Why a title could not be resolved this time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unresolved {
    NoMatch,
    /// Source failure that survived the retry budget.
    SourceError(String),
}

impl fmt::Display for Unresolved {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoMatch => f.write_str("no matching paper"),
            Self::SourceError(msg) => f.write_str(msg),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowOutcome {
    Resolved(CitationFields),
    Unresolved(Unresolved),
}

/// Summary of one pass over one dataset.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub file: String,
    pub pass: Pass,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub attempted: usize,
    pub resolved: usize,
    pub unresolved: usize,
    pub skipped: usize,
    pub errors: Vec<String>,
}

impl RunReport {
    pub fn start(file: impl Into<String>, pass: Pass) -> Self {
        let now = Utc::now();
        Self {
            file: file.into(),
            pass,
            started_at: now,
            finished_at: now,
            attempted: 0,
            resolved: 0,
            unresolved: 0,
            skipped: 0,
            errors: Vec::new(),
        }
    }

    pub fn record(&mut self, title: &str, outcome: &RowOutcome) {
        self.attempted += 1;
        match outcome {
            RowOutcome::Resolved(_) => self.resolved += 1,
            RowOutcome::Unresolved(reason) => {
                self.unresolved += 1;
                if let Unresolved::SourceError(msg) = reason {
                    self.add_error(format!("{title}: {msg}"));
                }
            }
        }
    }

    pub fn add_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
    }

    pub fn finish(mut self) -> Self {
        self.finished_at = Utc::now();
        self
    }

    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}]: attempted {}, resolved {}, unresolved {}, skipped {}, errors {} ({:.1}s)",
            self.file,
            self.pass,
            self.attempted,
            self.resolved,
            self.unresolved,
            self.skipped,
            self.errors.len(),
            self.elapsed().num_milliseconds() as f64 / 1000.0
        )
    }
}

/// Search → match → list citations → aggregate, for a single title.
///
/// Source errors are folded into [`RowOutcome::Unresolved`]; nothing here
/// touches the dataset.
#[derive(Clone)]
pub struct Resolver {
    source: Arc<dyn CitationSource>,
    matcher: TitleMatcher,
    venues: Arc<VenueConfig>,
    years: YearRange,
}

impl Resolver {
    pub fn new(
        source: Arc<dyn CitationSource>,
        matcher: TitleMatcher,
        venues: Arc<VenueConfig>,
        years: YearRange,
    ) -> Self {
        Self {
            source,
            matcher,
            venues,
            years,
        }
    }

    pub fn source_name(&self) -> &'static str {
        self.source.name()
    }

    pub async fn resolve_title(&self, title: &str) -> RowOutcome {
        let source = self.source.name();

        let candidates = match self.source.search_by_title(title).await {
            Ok(candidates) => candidates,
            Err(err) => {
                warn!(source, title, "search failed: {err}");
                return RowOutcome::Unresolved(Unresolved::SourceError(err.to_string()));
            }
        };

        let Some(paper) = self.matcher.best_match(title, &candidates) else {
            debug!(source, title, candidates = candidates.len(), "no match");
            return RowOutcome::Unresolved(Unresolved::NoMatch);
        };

        let events = if paper.citation_count == Some(0) {
            Vec::new()
        } else {
            match self.source.citation_events(paper).await {
                Ok(events) => events,
                Err(err) => {
                    warn!(source, title, paper = %paper.id, "citation listing failed: {err}");
                    return RowOutcome::Unresolved(Unresolved::SourceError(err.to_string()));
                }
            }
        };

        let stats = aggregate(&events, self.years, &self.venues);
        let citation_count = paper
            .citation_count
            .unwrap_or_else(|| u32::try_from(events.len()).unwrap_or(u32::MAX));
        debug!(
            source,
            title,
            paper = %paper.id,
            events = events.len(),
            citation_count,
            "resolved"
        );

        RowOutcome::Resolved(CitationFields {
            external_id: paper.id.clone(),
            citation_count,
            stats,
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::{HashMap, HashSet};
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use citeharvest_core::{CitationEvent, DataLayout, DatasetPaths};

    use crate::error::{HarvestError, Result};
    use crate::sources::{Candidate, CitationSource};

    /// In-memory source keyed by exact query title.
    #[derive(Default)]
    pub struct FixtureSource {
        pub papers: HashMap<String, Candidate>,
        pub events: HashMap<String, Vec<CitationEvent>>,
        pub failing: HashSet<String>,
        pub searches: AtomicUsize,
        pub listings: AtomicUsize,
    }

    impl FixtureSource {
        pub fn with_paper(mut self, title: &str, id: &str, events: Vec<CitationEvent>) -> Self {
            self.papers.insert(
                title.to_string(),
                Candidate {
                    id: id.to_string(),
                    title: title.to_string(),
                    year: Some(2018),
                    citation_count: Some(events.len() as u32),
                },
            );
            self.events.insert(id.to_string(), events);
            self
        }

        pub fn failing_on(mut self, title: &str) -> Self {
            self.failing.insert(title.to_string());
            self
        }

        pub fn searches(&self) -> usize {
            self.searches.load(Ordering::SeqCst)
        }

        pub fn listings(&self) -> usize {
            self.listings.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CitationSource for FixtureSource {
        fn name(&self) -> &'static str {
            "fixture"
        }

        async fn search_by_title(&self, title: &str) -> Result<Vec<Candidate>> {
            self.searches.fetch_add(1, Ordering::SeqCst);
            if self.failing.contains(title) {
                return Err(HarvestError::Server("fixture".to_string(), 503));
            }
            Ok(self.papers.get(title).cloned().into_iter().collect())
        }

        async fn citation_events(&self, paper: &Candidate) -> Result<Vec<CitationEvent>> {
            self.listings.fetch_add(1, Ordering::SeqCst);
            Ok(self.events.get(&paper.id).cloned().unwrap_or_default())
        }
    }

    pub fn event(year: i32, venue: &str) -> CitationEvent {
        CitationEvent::new("citing", Some(venue.to_string()), Some(year))
    }

    /// Write `data/<name>.csv` (and optionally its queue) under `root`.
    pub fn write_dataset(root: &Path, name: &str, csv: &str, queue: Option<&str>) -> DatasetPaths {
        let layout = DataLayout::new(root.join("data"), root.join("data-false"));
        std::fs::create_dir_all(layout.data_dir()).unwrap();
        std::fs::create_dir_all(layout.failures_dir()).unwrap();
        let paths = layout.dataset(name);
        std::fs::write(&paths.table, csv).unwrap();
        if let Some(queue) = queue {
            std::fs::write(&paths.queue, queue).unwrap();
        }
        paths
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{FixtureSource, event};
    use super::*;

    fn resolver(source: Arc<FixtureSource>) -> Resolver {
        Resolver::new(
            source,
            TitleMatcher::default(),
            Arc::new(VenueConfig::new(["NeurIPS"], ["Nature"])),
            YearRange::new(2014, 2024),
        )
    }

    #[tokio::test]
    async fn resolves_and_aggregates_matched_paper() {
        let source = Arc::new(FixtureSource::default().with_paper(
            "Deep Learning",
            "P1",
            vec![event(2019, "NeurIPS"), event(2020, "Nature"), event(2020, "arXiv")],
        ));

        let outcome = resolver(source.clone()).resolve_title("Deep Learning").await;
        let RowOutcome::Resolved(fields) = outcome else {
            panic!("expected a resolved outcome");
        };
        assert_eq!(fields.external_id, "P1");
        assert_eq!(fields.citation_count, 3);
        assert_eq!(fields.stats.yearly.get(&2020), Some(&2));
        assert_eq!(fields.stats.top_venue_citations, 2);
        assert_eq!(source.listings(), 1);
    }

    #[tokio::test]
    async fn zero_citations_skip_the_listing() {
        let source = Arc::new(FixtureSource::default().with_paper("Quiet Paper", "P2", vec![]));

        let outcome = resolver(source.clone()).resolve_title("Quiet Paper").await;
        let RowOutcome::Resolved(fields) = outcome else {
            panic!("expected a resolved outcome");
        };
        assert_eq!(fields.citation_count, 0);
        assert_eq!(fields.stats.in_range_total(), 0);
        assert_eq!(fields.stats.yearly.len(), 11);
        assert_eq!(source.listings(), 0);
    }

    #[tokio::test]
    async fn no_match_and_source_errors_are_unresolved() {
        let source = Arc::new(FixtureSource::default().failing_on("Broken"));
        let resolver = resolver(source);

        assert_eq!(
            resolver.resolve_title("Unknown").await,
            RowOutcome::Unresolved(Unresolved::NoMatch)
        );
        assert!(matches!(
            resolver.resolve_title("Broken").await,
            RowOutcome::Unresolved(Unresolved::SourceError(_))
        ));
    }

    #[test]
    fn report_counts_outcomes() {
        let mut report = RunReport::start("iclr", Pass::Primary);
        report.record("a", &RowOutcome::Unresolved(Unresolved::NoMatch));
        report.record(
            "b",
            &RowOutcome::Unresolved(Unresolved::SourceError("HTTP 503".to_string())),
        );
        let report = report.finish();

        assert_eq!(report.attempted, 2);
        assert_eq!(report.unresolved, 2);
        assert_eq!(report.errors, vec!["b: HTTP 503".to_string()]);
        assert!(report.to_string().starts_with("iclr [primary]"));
    }
}
