use std::path::{Path, PathBuf};

use tracing::warn;

use crate::config::PathsConfig;
use crate::error::{CoreError, Result};

/// Where a source file and its failure queue live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetPaths {
    pub name: String,
    pub table: PathBuf,
    pub queue: PathBuf,
}

/// `data_dir/<name>.csv` paired with `failures_dir/<name>.txt`.
#[derive(Debug, Clone)]
pub struct DataLayout {
    data_dir: PathBuf,
    failures_dir: PathBuf,
}

impl DataLayout {
    pub fn new(data_dir: impl Into<PathBuf>, failures_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            failures_dir: failures_dir.into(),
        }
    }

    pub fn from_config(paths: &PathsConfig) -> Self {
        Self::new(&paths.data_dir, &paths.failures_dir)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn failures_dir(&self) -> &Path {
        &self.failures_dir
    }

    /// Paths for one dataset, given as `iclr` or `iclr.csv`.
    pub fn dataset(&self, name: &str) -> DatasetPaths {
        let name = name.strip_suffix(".csv").unwrap_or(name);
        DatasetPaths {
            name: name.to_string(),
            table: self.data_dir.join(format!("{name}.csv")),
            queue: self.failures_dir.join(format!("{name}.txt")),
        }
    }

    /// Every `*.csv` in the data directory, sorted by name.
    pub fn datasets(&self) -> Result<Vec<DatasetPaths>> {
        let mut names = list_with_extension(&self.data_dir, "csv")?;
        names.sort();
        Ok(names.iter().map(|name| self.dataset(name)).collect())
    }

    /// Datasets whose names end with `suffix` (e.g. `.final.csv`).
    pub fn datasets_with_suffix(&self, suffix: &str) -> Result<Vec<DatasetPaths>> {
        Ok(self
            .datasets()?
            .into_iter()
            .filter(|paths| {
                paths
                    .table
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.ends_with(suffix))
            })
            .collect())
    }

    /// Every failure queue that has a matching CSV file. Queues without one
    /// are skipped with a warning.
    pub fn queued_datasets(&self) -> Result<Vec<DatasetPaths>> {
        if !self.failures_dir.exists() {
            return Ok(Vec::new());
        }
        let mut names = list_with_extension(&self.failures_dir, "txt")?;
        names.sort();

        let mut out = Vec::new();
        for name in names {
            let paths = self.dataset(&name);
            if paths.table.exists() {
                out.push(paths);
            } else {
                warn!(
                    queue = %paths.queue.display(),
                    "no CSV file for failure queue, skipping"
                );
            }
        }
        Ok(out)
    }
}

fn list_with_extension(dir: &Path, extension: &str) -> Result<Vec<String>> {
    if !dir.is_dir() {
        return Err(CoreError::Config(format!(
            "directory not found: {}",
            dir.display()
        )));
    }
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file()
            && path.extension().is_some_and(|ext| ext == extension)
            && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
        {
            names.push(stem.to_string());
        }
    }
    Ok(names)
}
