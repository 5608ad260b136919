use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::storage::atomic::write_atomic;
use crate::storage::table::title_key;

/// Titles of one source file that no source has matched yet.
///
/// Stored as plain text, one title per line, so titles are kept in their
/// [`title_key`] form. Order is insertion order and every title appears at
/// most once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureQueue {
    path: PathBuf,
    titles: Vec<String>,
}

impl FailureQueue {
    pub fn empty(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            titles: Vec::new(),
        }
    }

    /// Load a queue file; a missing file is an empty queue.
    pub fn load(path: &Path) -> Result<Self> {
        let mut queue = Self::empty(path);
        if !path.exists() {
            return Ok(queue);
        }
        let contents = std::fs::read_to_string(path)?;
        for line in contents.lines() {
            queue.push(line);
        }
        Ok(queue)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn titles(&self) -> &[String] {
        &self.titles
    }

    pub fn len(&self) -> usize {
        self.titles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.titles.is_empty()
    }

    pub fn contains(&self, title: &str) -> bool {
        let title = title_key(title);
        self.titles.iter().any(|t| *t == title)
    }

    /// Returns `true` if the title was not queued yet.
    pub fn push(&mut self, title: &str) -> bool {
        let title = title_key(title);
        if title.is_empty() || self.contains(&title) {
            return false;
        }
        self.titles.push(title);
        true
    }

    /// Returns `true` if the title was queued.
    pub fn remove(&mut self, title: &str) -> bool {
        let title = title_key(title);
        let before = self.titles.len();
        self.titles.retain(|t| *t != title);
        self.titles.len() != before
    }

    pub fn to_text(&self) -> String {
        self.titles.iter().map(|t| format!("{t}\n")).collect()
    }

    pub fn save(&self) -> Result<()> {
        write_atomic(&self.path, self.to_text().as_bytes())
    }
}
