use std::collections::{BTreeMap, HashSet};
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::error::{CoreError, Result};
use crate::models::{CitationFields, PaperRecord, YearRange};
use crate::storage::atomic::write_atomic;

pub const TITLE_COLUMN: &str = "title";
pub const YEAR_COLUMN: &str = "year";
pub const ID_COLUMN: &str = "paperId";
pub const CITATION_COUNT_COLUMN: &str = "citationCount";
pub const TOP_CONF_COLUMN: &str = "top_conf_citations";
pub const TOP_JOURNAL_COLUMN: &str = "top_journal_citations";
pub const TOP_VENUE_COLUMN: &str = "top_venue_citations";

pub fn year_column(year: i32) -> String {
    format!("citations_{year}")
}

/// The form under which a title is compared and queued: every run of
/// whitespace, line breaks included, becomes one space.
pub fn title_key(title: &str) -> String {
    title.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// One conference CSV file held in memory.
///
/// Columns that this crate does not own are carried through untouched and
/// keep their position; owned columns missing from the file are appended
/// the first time a row is resolved.
#[derive(Debug, Clone)]
pub struct PaperTable {
    path: PathBuf,
    years: YearRange,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
    titles: Vec<String>,
}

impl PaperTable {
    pub fn load(path: &Path, years: YearRange) -> Result<Self> {
        if !path.exists() {
            return Err(CoreError::FileNotFound(path.display().to_string()));
        }
        let file = std::fs::File::open(path)?;
        Self::from_reader(file, path, years)
    }

    pub fn from_reader<R: Read>(reader: R, path: &Path, years: YearRange) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(reader);

        let mut headers = csv_reader
            .headers()?
            .iter()
            .map(ToOwned::to_owned)
            .collect::<Vec<_>>();
        if let Some(first) = headers.first_mut()
            && let Some(stripped) = first.strip_prefix('\u{feff}')
        {
            *first = stripped.to_string();
        }

        if !headers.iter().any(|h| h == TITLE_COLUMN) {
            return Err(CoreError::MissingColumn {
                path: path.display().to_string(),
                column: TITLE_COLUMN.to_string(),
            });
        }

        let mut rows = Vec::new();
        for (idx, record) in csv_reader.records().enumerate() {
            let record = record?;
            if record.len() > headers.len() {
                return Err(CoreError::Config(format!(
                    "{}: row {} has {} fields but the header has {}",
                    path.display(),
                    idx + 2,
                    record.len(),
                    headers.len()
                )));
            }
            let mut cells = record.iter().map(ToOwned::to_owned).collect::<Vec<_>>();
            cells.resize(headers.len(), String::new());
            rows.push(cells);
        }

        let title_idx = headers.iter().position(|h| h == TITLE_COLUMN).unwrap_or(0);
        let titles = rows.iter().map(|cells| title_key(&cells[title_idx])).collect();

        Ok(Self {
            path: path.to_path_buf(),
            years,
            headers,
            rows,
            titles,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn years(&self) -> YearRange {
        self.years
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.column_index(column).is_some()
    }

    /// Title of a row in its [`title_key`] form.
    pub fn title(&self, row: usize) -> &str {
        self.titles.get(row).map(String::as_str).unwrap_or_default()
    }

    /// Trimmed cell value; empty cells and missing columns read as `None`.
    pub fn get(&self, row: usize, column: &str) -> Option<&str> {
        let idx = self.column_index(column)?;
        self.rows
            .get(row)
            .and_then(|cells| cells.get(idx))
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
    }

    pub fn set(&mut self, row: usize, column: &str, value: impl Into<String>) {
        let idx = self.ensure_column(column);
        if let Some(cells) = self.rows.get_mut(row) {
            cells[idx] = value.into();
            if column == TITLE_COLUMN {
                self.titles[row] = title_key(&cells[idx]);
            }
        }
    }

    pub fn record(&self, row: usize) -> PaperRecord {
        let external_id = self.get(row, ID_COLUMN).map(ToOwned::to_owned);

        let yearly_citations = self
            .years
            .years()
            .map(|year| {
                self.get(row, &year_column(year))
                    .and_then(parse_count)
                    .map(|count| (year, count))
            })
            .collect::<Option<BTreeMap<_, _>>>();

        PaperRecord {
            title: self.title(row).to_string(),
            publication_year: self
                .get(row, YEAR_COLUMN)
                .and_then(|s| s.parse::<i32>().ok()),
            external_id,
            citation_count: self.get(row, CITATION_COUNT_COLUMN).and_then(parse_count),
            yearly_citations,
            top_conf_citations: self.get(row, TOP_CONF_COLUMN).and_then(parse_count),
            top_journal_citations: self.get(row, TOP_JOURNAL_COLUMN).and_then(parse_count),
            top_venue_citation_count: self.get(row, TOP_VENUE_COLUMN).and_then(parse_count),
        }
    }

    pub fn records(&self) -> impl Iterator<Item = PaperRecord> + '_ {
        (0..self.rows.len()).map(|row| self.record(row))
    }

    /// Indices of the rows whose title has the same [`title_key`] as `title`.
    pub fn rows_with_title(&self, title: &str) -> Vec<usize> {
        let wanted = title_key(title);
        let wanted = wanted.as_str();
        (0..self.rows.len())
            .filter(|&row| !wanted.is_empty() && self.title(row) == wanted)
            .collect()
    }

    pub fn is_resolved(&self, title: &str) -> bool {
        self.rows_with_title(title)
            .into_iter()
            .any(|row| self.get(row, ID_COLUMN).is_some())
    }

    /// Distinct titles without an external id, in file order.
    pub fn pending_titles(&self) -> Vec<String> {
        let resolved = self.resolved_titles();
        let mut seen = HashSet::new();
        (0..self.rows.len())
            .map(|row| self.title(row))
            .filter(|title| !title.is_empty() && !resolved.contains(title))
            .filter(|title| seen.insert(*title))
            .map(ToOwned::to_owned)
            .collect()
    }

    pub fn resolved_titles(&self) -> HashSet<&str> {
        (0..self.rows.len())
            .filter(|&row| self.get(row, ID_COLUMN).is_some())
            .map(|row| self.title(row))
            .filter(|title| !title.is_empty())
            .collect()
    }

    /// Write the full owned field set into every row titled `title`.
    ///
    /// Returns the number of rows updated.
    pub fn apply_fields(&mut self, title: &str, fields: &CitationFields) -> usize {
        let rows = self.rows_with_title(title);
        if rows.is_empty() {
            return 0;
        }

        let mut values = vec![
            (ID_COLUMN.to_string(), fields.external_id.clone()),
            (
                CITATION_COUNT_COLUMN.to_string(),
                fields.citation_count.to_string(),
            ),
            (
                TOP_CONF_COLUMN.to_string(),
                fields.stats.top_conf_citations.to_string(),
            ),
            (
                TOP_JOURNAL_COLUMN.to_string(),
                fields.stats.top_journal_citations.to_string(),
            ),
            (
                TOP_VENUE_COLUMN.to_string(),
                fields.stats.top_venue_citations.to_string(),
            ),
        ];
        for year in self.years.years() {
            let count = fields.stats.yearly.get(&year).copied().unwrap_or(0);
            values.push((year_column(year), count.to_string()));
        }

        let indexed = values
            .into_iter()
            .map(|(column, value)| (self.ensure_column(&column), value))
            .collect::<Vec<_>>();
        for row in &rows {
            for (idx, value) in &indexed {
                self.rows[*row][*idx] = value.clone();
            }
        }
        rows.len()
    }

    pub fn to_csv_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(&self.headers)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer
            .into_inner()
            .map_err(|e| CoreError::Io(e.into_error()))
    }

    /// Atomically rewrite the file this table was loaded from.
    pub fn save(&self) -> Result<()> {
        write_atomic(&self.path, &self.to_csv_bytes()?)
    }

    fn column_index(&self, column: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == column)
    }

    fn ensure_column(&mut self, column: &str) -> usize {
        if let Some(idx) = self.column_index(column) {
            return idx;
        }
        self.headers.push(column.to_string());
        for row in &mut self.rows {
            row.push(String::new());
        }
        self.headers.len() - 1
    }
}

// Tables round-tripped through dataframe tools may hold counts as `12.0`.
fn parse_count(value: &str) -> Option<u32> {
    value.parse::<u32>().ok().or_else(|| {
        value
            .parse::<f64>()
            .ok()
            .filter(|f| f.fract() == 0.0 && *f >= 0.0 && *f <= f64::from(u32::MAX))
            .map(|f| f as u32)
    })
}
