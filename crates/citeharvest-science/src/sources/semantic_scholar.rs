use std::time::Duration;

use async_trait::async_trait;
use citeharvest_core::CitationEvent;
use citeharvest_core::config::SemanticScholarConfig;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{HarvestError, Result};
use crate::http::{RateLimitedClient, RetryPolicy, join_segments};
use crate::sources::{Candidate, CitationSource, user_agent};

const SEARCH_FIELDS: &str = "paperId,title,year,citationCount";
const CITATION_FIELDS: &str = "paperId,year,venue";
const API_KEY_HEADER: &str = "x-api-key";
// The citations endpoint rejects windows reaching past this offset.
const MAX_CITATION_WINDOW: u32 = 10_000;

// Envelopes are decoded inside the client's retry loop, so a reply of the
// wrong shape is retried like any other malformed body.

/// `/paper/search` reply. No hits come back as an object without `data`.
#[derive(Debug, Deserialize)]
struct SearchPage {
    #[serde(default)]
    data: Vec<Value>,
}

/// `/paper/{id}/citations` reply.
#[derive(Debug, Deserialize)]
struct CitationPage {
    data: Vec<Value>,
    #[serde(default)]
    next: Option<u64>,
}

/// Semantic Scholar Graph API, the primary source.
pub struct SemanticScholarSource {
    client: RateLimitedClient,
    api_key: Option<String>,
    base_url: String,
    search_limit: u32,
    page_size: u32,
}

impl SemanticScholarSource {
    pub fn new(config: &SemanticScholarConfig, retry: RetryPolicy) -> Result<Self> {
        let client = RateLimitedClient::new(
            Self::NAME,
            Duration::from_millis(config.min_interval_ms),
            retry,
            &user_agent(None),
        )?;
        Ok(Self {
            client,
            api_key: config.resolved_api_key(),
            base_url: config.base_url.clone(),
            search_limit: config.search_limit.max(1),
            page_size: config.page_size.clamp(1, 1_000),
        })
    }

    pub const NAME: &'static str = "semantic_scholar";

    fn auth_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if let Some(key) = self
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            let value =
                HeaderValue::from_str(key).map_err(|e| HarvestError::Parse(e.to_string()))?;
            headers.insert(API_KEY_HEADER, value);
        }
        Ok(headers)
    }

    async fn citation_page(&self, paper_id: &str, offset: u32) -> Result<CitationPage> {
        let mut url = join_segments(&self.base_url, &["paper", paper_id, "citations"])?;
        url.query_pairs_mut()
            .append_pair("fields", CITATION_FIELDS)
            .append_pair("offset", &offset.to_string())
            .append_pair("limit", &self.page_size.to_string());
        self.client
            .get_json_with_headers(&url, &self.auth_headers()?)
            .await
    }
}

#[async_trait]
impl CitationSource for SemanticScholarSource {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn search_by_title(&self, title: &str) -> Result<Vec<Candidate>> {
        let mut url = join_segments(&self.base_url, &["paper", "search"])?;
        url.query_pairs_mut()
            .append_pair("query", title.trim())
            .append_pair("limit", &self.search_limit.to_string())
            .append_pair("fields", SEARCH_FIELDS);

        let page: SearchPage = self
            .client
            .get_json_with_headers(&url, &self.auth_headers()?)
            .await?;
        Ok(page.data.iter().filter_map(parse_candidate).collect())
    }

    async fn citation_events(&self, paper: &Candidate) -> Result<Vec<CitationEvent>> {
        let mut events = Vec::new();
        let mut offset = 0u32;

        loop {
            let page = self.citation_page(&paper.id, offset).await?;
            let batch = &page.data;
            if batch.is_empty() {
                break;
            }

            events.extend(batch.iter().filter_map(parse_citation));
            offset += batch.len() as u32;

            if page.next.is_none() || batch.len() < self.page_size as usize {
                break;
            }
            if offset + self.page_size > MAX_CITATION_WINDOW {
                debug!(paper = %paper.id, offset, "citation window limit reached");
                break;
            }
        }

        Ok(events)
    }
}

fn parse_candidate(item: &Value) -> Option<Candidate> {
    let id = item
        .get("paperId")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())?
        .to_string();

    Some(Candidate {
        id,
        title: item
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim()
            .to_string(),
        year: item
            .get("year")
            .and_then(Value::as_i64)
            .and_then(|n| i32::try_from(n).ok()),
        citation_count: item
            .get("citationCount")
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok()),
    })
}

fn parse_citation(item: &Value) -> Option<CitationEvent> {
    let citing = item.get("citingPaper").filter(|v| v.is_object())?;

    let citing_paper_id = citing
        .get("paperId")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let citing_venue = citing
        .get("venue")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToOwned::to_owned);
    let citing_year = citing
        .get("year")
        .and_then(Value::as_i64)
        .and_then(|n| i32::try_from(n).ok());

    Some(CitationEvent {
        citing_paper_id,
        citing_venue,
        citing_year,
    })
}
