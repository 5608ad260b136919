use std::collections::BTreeSet;
use std::path::Path;

use serde::Deserialize;

use crate::error::{CoreError, Result};

/// Which configured list a citing venue matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VenueTier {
    TopConference,
    TopJournal,
}

#[derive(Debug, Default, Deserialize)]
struct VenueFile {
    #[serde(default)]
    top_conferences: Vec<String>,
    #[serde(default)]
    top_journals: Vec<String>,
}

/// Top conferences and journals, loaded once and shared read-only.
///
/// Entries are stored normalized (see [`normalize_venue`]).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VenueConfig {
    top_conferences: BTreeSet<String>,
    top_journals: BTreeSet<String>,
}

impl VenueConfig {
    pub fn new<C, J>(top_conferences: C, top_journals: J) -> Self
    where
        C: IntoIterator,
        C::Item: AsRef<str>,
        J: IntoIterator,
        J::Item: AsRef<str>,
    {
        Self {
            top_conferences: normalized_set(top_conferences),
            top_journals: normalized_set(top_journals),
        }
    }

    /// Load the venue lists from a YAML file. The file must exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CoreError::FileNotFound(format!(
                "venue config {}",
                path.display()
            )));
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        let file: VenueFile = serde_yaml::from_str(contents)?;
        Ok(Self::new(file.top_conferences, file.top_journals))
    }

    pub fn top_conferences(&self) -> &BTreeSet<String> {
        &self.top_conferences
    }

    pub fn top_journals(&self) -> &BTreeSet<String> {
        &self.top_journals
    }

    pub fn is_empty(&self) -> bool {
        self.top_conferences.is_empty() && self.top_journals.is_empty()
    }

    /// Classify a citing venue. Conferences are checked before journals.
    pub fn tier_of(&self, venue: &str) -> Option<VenueTier> {
        let normalized = normalize_venue(venue);
        if normalized.is_empty() {
            return None;
        }
        if contains_any(&normalized, &self.top_conferences) {
            Some(VenueTier::TopConference)
        } else if contains_any(&normalized, &self.top_journals) {
            Some(VenueTier::TopJournal)
        } else {
            None
        }
    }
}

/// Lowercase, turn every non-alphanumeric character into a space and
/// collapse runs of whitespace.
pub fn normalize_venue(venue: &str) -> String {
    venue
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn normalized_set<I>(items: I) -> BTreeSet<String>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    items
        .into_iter()
        .map(|item| normalize_venue(item.as_ref()))
        .filter(|item| !item.is_empty())
        .collect()
}

// Whole-word containment: "icml" matches "proceedings of icml 2020" but
// not "icmla".
fn contains_any(venue: &str, entries: &BTreeSet<String>) -> bool {
    let padded = format!(" {venue} ");
    entries
        .iter()
        .any(|entry| padded.contains(&format!(" {entry} ")))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    fn venues() -> VenueConfig {
        VenueConfig::new(["NeurIPS", "ICML", "CVPR"], ["Nature", "JMLR"])
    }

    #[test]
    fn tier_is_case_insensitive() {
        let cfg = venues();
        assert_eq!(cfg.tier_of("neurips"), Some(VenueTier::TopConference));
        assert_eq!(cfg.tier_of("NATURE"), Some(VenueTier::TopJournal));
    }

    #[test]
    fn tier_matches_entry_inside_longer_venue_name() {
        let cfg = venues();
        assert_eq!(
            cfg.tier_of("Proceedings of the 37th ICML, 2020"),
            Some(VenueTier::TopConference)
        );
        assert_eq!(
            cfg.tier_of("2021 IEEE/CVF Conference (CVPR)"),
            Some(VenueTier::TopConference)
        );
    }

    #[test]
    fn tier_requires_whole_words() {
        let cfg = venues();
        assert_eq!(cfg.tier_of("ICMLA 2019"), None);
        assert_eq!(cfg.tier_of("Nature-inspired Computing"), Some(VenueTier::TopJournal));
        assert_eq!(cfg.tier_of(""), None);
    }

    #[test]
    fn conference_wins_over_journal() {
        let cfg = VenueConfig::new(["nature"], ["nature"]);
        assert_eq!(cfg.tier_of("Nature"), Some(VenueTier::TopConference));
    }

    #[test]
    fn load_from_yaml_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "top_conferences:\n  - NeurIPS\n  - ICLR\ntop_journals:\n  - Nature\n"
        )
        .unwrap();

        let cfg = VenueConfig::load_from(file.path()).unwrap();
        assert_eq!(cfg.top_conferences().len(), 2);
        assert!(cfg.top_conferences().contains("iclr"));
        assert!(cfg.top_journals().contains("nature"));
    }

    #[test]
    fn missing_venue_file_is_a_configuration_error() {
        let err = VenueConfig::load_from(Path::new("/nonexistent/venues_top.yaml")).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn missing_lists_default_to_empty() {
        let cfg = VenueConfig::from_yaml("top_conferences:\n  - ICML\n").unwrap();
        assert!(cfg.top_journals().is_empty());
        assert!(!cfg.is_empty());
    }
}
