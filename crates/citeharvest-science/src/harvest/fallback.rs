use std::sync::Arc;

use citeharvest_core::{AppConfig, Dataset, VenueConfig};
use tracing::{debug, info};

use crate::error::{HarvestError, Result};
use crate::harvest::pool::{run_bounded, store_blocking};
use crate::harvest::{Pass, Resolver, RowOutcome, RunReport};
use crate::http::RetryPolicy;
use crate::matcher::TitleMatcher;
use crate::sources::OpenAlexSource;

/// Second pass: works through a dataset's failure queue against the
/// secondary source. Titles that fail again stay queued as they were.
pub struct FallbackFetcher {
    resolver: Resolver,
    workers: usize,
}

impl FallbackFetcher {
    pub fn new(resolver: Resolver, workers: usize) -> Self {
        Self {
            resolver,
            workers: workers.max(1),
        }
    }

    pub fn from_config(config: &AppConfig, venues: Arc<VenueConfig>) -> Result<Self> {
        let source =
            OpenAlexSource::new(&config.openalex, RetryPolicy::from_config(&config.retry))?;
        let resolver = Resolver::new(
            Arc::new(source),
            TitleMatcher::from_config(&config.matcher),
            venues,
            config.years,
        );
        Ok(Self::new(resolver, config.openalex.workers))
    }

    pub async fn run(&self, dataset: &Dataset) -> Result<RunReport> {
        let mut report = RunReport::start(dataset.name(), Pass::Fallback);

        // Leftovers of an interrupted run need no query.
        report.skipped = dataset.reconcile()?;

        let queued = dataset.queued_titles();
        if queued.is_empty() {
            debug!(dataset = %dataset.name(), "failure queue empty");
            return Ok(report.finish());
        }
        info!(
            dataset = %dataset.name(),
            source = self.resolver.source_name(),
            queued = queued.len(),
            workers = self.workers,
            "fallback pass started"
        );

        let outcomes = run_bounded(queued, self.workers, |title| async move {
            let outcome = self.resolver.resolve_title(&title).await;
            match &outcome {
                RowOutcome::Resolved(fields) => {
                    let rows = store_blocking(|| dataset.resolve(&title, fields))?;
                    if rows == 0 {
                        debug!(
                            dataset = %dataset.name(),
                            title = %title,
                            "queued title has no row"
                        );
                    }
                }
                RowOutcome::Unresolved(reason) => {
                    debug!(dataset = %dataset.name(), title = %title, "still unresolved: {reason}");
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
