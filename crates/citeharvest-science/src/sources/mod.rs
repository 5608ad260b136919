use async_trait::async_trait;
use citeharvest_core::CitationEvent;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub mod openalex;
pub mod semantic_scholar;

pub use openalex::OpenAlexSource;
pub use semantic_scholar::SemanticScholarSource;

/// One hit of a title search, reduced to what matching needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Candidate {
    pub id: String,
    pub title: String,
    pub year: Option<i32>,
    /// Total citations as reported by the source, when it says.
    pub citation_count: Option<u32>,
}

/// A bibliographic API that can find papers by title and list who cites them.
#[async_trait]
pub trait CitationSource: Send + Sync {
    fn name(&self) -> &'static str;

    async fn search_by_title(&self, title: &str) -> Result<Vec<Candidate>>;

    /// Every citing paper, already normalized to [`CitationEvent`].
    async fn citation_events(&self, paper: &Candidate) -> Result<Vec<CitationEvent>>;
}

pub(crate) fn user_agent(contact: Option<&str>) -> String {
    let version = env!("CARGO_PKG_VERSION");
    match contact.map(str::trim).filter(|s| !s.is_empty()) {
        Some(mail) => format!("citeharvest/{version} (mailto:{mail})"),
        None => format!("citeharvest/{version}"),
    }
}
