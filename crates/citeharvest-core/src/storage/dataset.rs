use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};

use crate::error::Result;
use crate::models::{CitationFields, PaperRecord, YearRange};
use crate::storage::failure_queue::FailureQueue;
use crate::storage::layout::DatasetPaths;
use crate::storage::table::PaperTable;

struct DatasetState {
    table: PaperTable,
    queue: FailureQueue,
}

/// A source file and its failure queue, shared by all workers of a pass.
///
/// Every mutation takes the internal lock, changes the in-memory copy and
/// atomically rewrites the affected file before returning, so an
/// interrupted run loses at most the row that was in flight.
pub struct Dataset {
    name: String,
    state: Mutex<DatasetState>,
}

/// Snapshot of a dataset's resolution state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetStatus {
    pub name: String,
    pub rows: usize,
    pub resolved: usize,
    pub unresolved: usize,
    pub queued: usize,
    /// Unresolved titles missing from the failure queue.
    pub unqueued: Vec<String>,
    /// Queued titles whose rows already carry an external id.
    pub stale: Vec<String>,
    /// Resolved rows with partially written derived fields.
    pub inconsistent: Vec<String>,
}

impl DatasetStatus {
    /// A title is queued iff its record is unresolved, and no record is
    /// half written.
    pub fn invariant_holds(&self) -> bool {
        self.unqueued.is_empty() && self.stale.is_empty() && self.inconsistent.is_empty()
    }
}

impl Dataset {
    pub fn open(paths: &DatasetPaths, years: YearRange) -> Result<Self> {
        let table = PaperTable::load(&paths.table, years)?;
        let queue = FailureQueue::load(&paths.queue)?;
        debug!(
            dataset = %paths.name,
            rows = table.len(),
            queued = queue.len(),
            "opened dataset"
        );
        Ok(Self::from_parts(paths.name.clone(), table, queue))
    }

    pub fn from_parts(name: impl Into<String>, table: PaperTable, queue: FailureQueue) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(DatasetState { table, queue }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> MutexGuard<'_, DatasetState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Distinct titles of rows without an external id.
    pub fn pending_titles(&self) -> Vec<String> {
        self.lock().table.pending_titles()
    }

    pub fn queued_titles(&self) -> Vec<String> {
        self.lock().queue.titles().to_vec()
    }

    pub fn is_resolved(&self, title: &str) -> bool {
        self.lock().table.is_resolved(title)
    }

    pub fn records(&self) -> Vec<PaperRecord> {
        self.lock().table.records().collect()
    }

    /// Write a row's full field set. Returns the number of rows updated.
    pub fn apply_update(&self, title: &str, fields: &CitationFields) -> Result<usize> {
        let mut state = self.lock();
        let updated = state.table.apply_fields(title, fields);
        if updated > 0 {
            state.table.save()?;
        }
        Ok(updated)
    }

    /// Queue a title for the fallback pass. Returns `true` if it was added.
    pub fn append_failure(&self, title: &str) -> Result<bool> {
        let mut state = self.lock();
        let added = state.queue.push(title);
        if added {
            state.queue.save()?;
        }
        Ok(added)
    }

    /// Returns `true` if the title was queued.
    pub fn remove_failure(&self, title: &str) -> Result<bool> {
        let mut state = self.lock();
        let removed = state.queue.remove(title);
        if removed {
            state.queue.save()?;
        }
        Ok(removed)
    }

    /// Record a successful fetch: write the row, then drop the title from
    /// the failure queue. Both files are on disk when this returns.
    pub fn resolve(&self, title: &str, fields: &CitationFields) -> Result<usize> {
        let mut state = self.lock();
        let updated = state.table.apply_fields(title, fields);
        if updated > 0 {
            state.table.save()?;
        }
        if state.queue.remove(title) {
            state.queue.save()?;
        }
        Ok(updated)
    }

    /// Drop queued titles whose rows are already resolved, which happens
    /// when a run stops between the row write and the queue write.
    pub fn reconcile(&self) -> Result<usize> {
        let mut state = self.lock();
        let stale = state
            .queue
            .titles()
            .iter()
            .filter(|title| state.table.is_resolved(title))
            .cloned()
            .collect::<Vec<_>>();
        if stale.is_empty() {
            return Ok(0);
        }
        for title in &stale {
            state.queue.remove(title);
        }
        state.queue.save()?;
        info!(
            dataset = %self.name,
            removed = stale.len(),
            "removed already resolved titles from failure queue"
        );
        Ok(stale.len())
    }

    pub fn status(&self) -> DatasetStatus {
        let state = self.lock();
        let records = state.table.records().collect::<Vec<_>>();
        let pending = state.table.pending_titles();

        let unqueued = pending
            .iter()
            .filter(|title| !state.queue.contains(title))
            .cloned()
            .collect();
        let stale = state
            .queue
            .titles()
            .iter()
            .filter(|title| state.table.is_resolved(title))
            .cloned()
            .collect();
        let inconsistent = records
            .iter()
            .filter(|r| !r.is_consistent())
            .map(|r| r.title.clone())
            .collect();
        let resolved = records.iter().filter(|r| r.is_resolved()).count();

        DatasetStatus {
            name: self.name.clone(),
            rows: records.len(),
            resolved,
            unresolved: records.len() - resolved,
            queued: state.queue.len(),
            unqueued,
            stale,
            inconsistent,
        }
    }
}
