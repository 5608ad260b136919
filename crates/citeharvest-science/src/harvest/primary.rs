use std::collections::HashSet;
use std::sync::Arc;

use citeharvest_core::{AppConfig, Dataset, VenueConfig};
use tracing::{info, warn};

use crate::error::{HarvestError, Result};
use crate::harvest::pool::{run_bounded, store_blocking};
use crate::harvest::{Pass, Resolver, RowOutcome, RunReport};
use crate::http::RetryPolicy;
use crate::matcher::TitleMatcher;
use crate::sources::SemanticScholarSource;

/// First pass over a dataset: every row without an external id is looked
/// up once; misses go to the failure queue.
pub struct PrimaryFetcher {
    resolver: Resolver,
    workers: usize,
}

impl PrimaryFetcher {
    pub fn new(resolver: Resolver, workers: usize) -> Self {
        Self {
            resolver,
            workers: workers.max(1),
        }
    }

    /// Semantic Scholar with the configured matcher, retries and pool size.
    pub fn from_config(config: &AppConfig, venues: Arc<VenueConfig>) -> Result<Self> {
        let source = SemanticScholarSource::new(
            &config.semantic_scholar,
            RetryPolicy::from_config(&config.retry),
        )?;
        let resolver = Resolver::new(
            Arc::new(source),
            TitleMatcher::from_config(&config.matcher),
            venues,
            config.years,
        );
        Ok(Self::new(resolver, config.semantic_scholar.workers))
    }

    pub async fn run(&self, dataset: &Dataset) -> Result<RunReport> {
        let mut report = RunReport::start(dataset.name(), Pass::Primary);

        dataset.reconcile()?;
        report.skipped = dataset
            .records()
            .iter()
            .filter(|r| r.is_resolved())
            .map(|r| r.title.clone())
            .collect::<HashSet<_>>()
            .len();

        let pending = dataset.pending_titles();
        info!(
            dataset = %dataset.name(),
            source = self.resolver.source_name(),
            pending = pending.len(),
            skipped = report.skipped,
            workers = self.workers,
            "primary pass started"
        );

        let outcomes = run_bounded(pending, self.workers, |title| async move {
            let outcome = self.resolver.resolve_title(&title).await;
            match &outcome {
                RowOutcome::Resolved(fields) => {
                    store_blocking(|| dataset.resolve(&title, fields))?;
                }
                RowOutcome::Unresolved(reason) => {
                    warn!(dataset = %dataset.name(), title = %title, "unresolved: {reason}");
                    store_blocking(|| dataset.append_failure(&title))?;
                }
            }
            Ok::<_, HarvestError>((title, outcome))
        })
        .await?;

        for (title, outcome) in &outcomes {
            report.record(title, outcome);
        }
        let report = report.finish();
        info!(dataset = %dataset.name(), "{report}");
        Ok(report)
    }
}
