use std::time::Duration;

use async_trait::async_trait;
use citeharvest_core::CitationEvent;
use citeharvest_core::config::OpenAlexConfig;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::Result;
use crate::http::{RateLimitedClient, RetryPolicy, join_segments};
use crate::sources::{Candidate, CitationSource, user_agent};

const SEARCH_SELECT: &str = "id,display_name,publication_year,cited_by_count";
const CITATION_SELECT: &str = "id,publication_year,primary_location";

/// One page of `/works`. Decoded by the client, so a page without
/// `results` counts as a malformed body and is retried.
#[derive(Debug, Deserialize)]
struct WorksPage {
    results: Vec<Value>,
    #[serde(default)]
    meta: WorksMeta,
}

#[derive(Debug, Default, Deserialize)]
struct WorksMeta {
    #[serde(default)]
    next_cursor: Option<String>,
}

/// OpenAlex works API, the fallback source.
pub struct OpenAlexSource {
    client: RateLimitedClient,
    base_url: String,
    mailto: Option<String>,
    search_limit: u32,
    page_size: u32,
}

impl OpenAlexSource {
    pub const NAME: &'static str = "openalex";

    pub fn new(config: &OpenAlexConfig, retry: RetryPolicy) -> Result<Self> {
        let mailto = config
            .mailto
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToOwned::to_owned);
        let client = RateLimitedClient::new(
            Self::NAME,
            Duration::from_millis(config.min_interval_ms),
            retry,
            &user_agent(mailto.as_deref()),
        )?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            mailto,
            search_limit: config.search_limit.clamp(1, 200),
            page_size: config.page_size.clamp(1, 200),
        })
    }

    fn works_url(&self, filter: &str, select: &str, per_page: u32) -> Result<reqwest::Url> {
        let mut url = join_segments(&self.base_url, &["works"])?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("filter", filter)
                .append_pair("select", select)
                .append_pair("per-page", &per_page.to_string());
            if let Some(mail) = &self.mailto {
                query.append_pair("mailto", mail);
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl CitationSource for OpenAlexSource {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn search_by_title(&self, title: &str) -> Result<Vec<Candidate>> {
        let query = title_filter_value(title);
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let url = self.works_url(
            &format!("title.search:{query}"),
            SEARCH_SELECT,
            self.search_limit,
        )?;
        let page: WorksPage = self.client.get_json(&url).await?;
        Ok(page.results.iter().filter_map(parse_work).collect())
    }

    async fn citation_events(&self, paper: &Candidate) -> Result<Vec<CitationEvent>> {
        let work_id = short_id(&paper.id);
        let mut events = Vec::new();
        let mut cursor = "*".to_string();

        loop {
            let mut url =
                self.works_url(&format!("cites:{work_id}"), CITATION_SELECT, self.page_size)?;
            url.query_pairs_mut().append_pair("cursor", &cursor);

            let page: WorksPage = self.client.get_json(&url).await?;
            events.extend(page.results.iter().filter_map(parse_citing_work));

            match page.meta.next_cursor.filter(|c| !c.is_empty()) {
                Some(next) if !page.results.is_empty() && next != cursor => cursor = next,
                _ => break,
            }
        }

        debug!(work = %work_id, count = events.len(), "collected citing works");
        Ok(events)
    }
}

/// `https://openalex.org/W123` → `W123`.
fn short_id(id: &str) -> &str {
    id.trim().rsplit('/').next().unwrap_or(id)
}

// Commas separate filters and `|` means OR inside a filter value; a leading
// `!` negates it.
fn title_filter_value(title: &str) -> String {
    let cleaned = title
        .chars()
        .map(|c| if matches!(c, ',' | '|' | ':') { ' ' } else { c })
        .collect::<String>();
    cleaned
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_start_matches('!')
        .trim()
        .to_string()
}

fn parse_work(item: &Value) -> Option<Candidate> {
    let id = item
        .get("id")
        .and_then(Value::as_str)
        .map(short_id)
        .filter(|s| !s.is_empty())?
        .to_string();

    Some(Candidate {
        id,
        title: item
            .get("display_name")
            .or_else(|| item.get("title"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim()
            .to_string(),
        year: item
            .get("publication_year")
            .and_then(Value::as_i64)
            .and_then(|n| i32::try_from(n).ok()),
        citation_count: item
            .get("cited_by_count")
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok()),
    })
}

fn parse_citing_work(item: &Value) -> Option<CitationEvent> {
    if !item.is_object() {
        return None;
    }
    let id = item
        .get("id")
        .and_then(Value::as_str)
        .map(short_id)
        .unwrap_or_default()
        .to_string();
    let venue = item
        .pointer("/primary_location/source/display_name")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToOwned::to_owned);
    let year = item
        .get("publication_year")
        .and_then(Value::as_i64)
        .and_then(|n| i32::try_from(n).ok());

    Some(CitationEvent::new(id, venue, year))
}

#[cfg(test)]
mod tests {
    use mockito::{Matcher, Server};
    use serde_json::json;

    use super::*;
    use crate::error::HarvestError;

    fn source(base_url: String, page_size: u32) -> OpenAlexSource {
        let config = OpenAlexConfig {
            base_url,
            mailto: Some("lab@example.org".to_string()),
            min_interval_ms: 0,
            page_size,
            ..Default::default()
        };
        let retry = RetryPolicy {
            max_retries: 1,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        };
        OpenAlexSource::new(&config, retry).unwrap()
    }

    #[test]
    fn short_id_strips_url_prefix() {
        assert_eq!(short_id("https://openalex.org/W2741809807"), "W2741809807");
        assert_eq!(short_id("W1"), "W1");
    }

    #[test]
    fn title_filter_drops_filter_syntax() {
        assert_eq!(
            title_filter_value("BERT: Pre-training, of | Deep Transformers"),
            "BERT Pre-training of Deep Transformers"
        );
        assert_eq!(title_filter_value("!Not a negation"), "Not a negation");
        assert_eq!(title_filter_value(" , | "), "");
    }

    #[test]
    fn citing_work_takes_venue_from_primary_location() {
        let value = json!({
            "id": "https://openalex.org/W9",
            "publication_year": 2022,
            "primary_location": {"source": {"display_name": "Nature Communications"}}
        });
        let event = parse_citing_work(&value).unwrap();
        assert_eq!(event.citing_paper_id, "W9");
        assert_eq!(event.citing_year, Some(2022));
        assert_eq!(event.citing_venue.as_deref(), Some("Nature Communications"));

        let no_source = json!({"id": "W10", "primary_location": {"source": null}});
        let event = parse_citing_work(&no_source).unwrap();
        assert_eq!(event.citing_venue, None);
        assert_eq!(event.citing_year, None);
    }

    #[tokio::test]
    async fn search_uses_title_filter_and_mailto() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/works")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded(
                    "filter".to_string(),
                    "title.search:Deep Residual Learning".to_string(),
                ),
                Matcher::UrlEncoded("mailto".to_string(), "lab@example.org".to_string()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "meta": {"count": 1},
                    "results": [{
                        "id": "https://openalex.org/W2194775991",
                        "display_name": "Deep Residual Learning for Image Recognition",
                        "publication_year": 2016,
                        "cited_by_count": 150000
                    }]
                })
                .to_string(),
            )
            .expect(1)
            .create_async()
            .await;

        let openalex = source(server.url(), 200);
        let candidates = openalex.search_by_title("Deep Residual: Learning").await.unwrap();

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].id, "W2194775991");
        assert_eq!(candidates[0].year, Some(2016));
        assert_eq!(candidates[0].citation_count, Some(150_000));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn citation_events_follow_cursor() {
        let mut server = Server::new_async().await;
        let first = server
            .mock("GET", "/works")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("filter".to_string(), "cites:W1".to_string()),
                Matcher::UrlEncoded("cursor".to_string(), "*".to_string()),
            ]))
            .with_status(200)
            .with_body(
                json!({
                    "meta": {"next_cursor": "page2"},
                    "results": [
                        {"id": "https://openalex.org/W10", "publication_year": 2019,
                         "primary_location": {"source": {"display_name": "ICML"}}},
                        {"id": "https://openalex.org/W11", "publication_year": 2020,
                         "primary_location": null}
                    ]
                })
                .to_string(),
            )
            .expect(1)
            .create_async()
            .await;
        let second = server
            .mock("GET", "/works")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("filter".to_string(), "cites:W1".to_string()),
                Matcher::UrlEncoded("cursor".to_string(), "page2".to_string()),
            ]))
            .with_status(200)
            .with_body(
                json!({
                    "meta": {"next_cursor": null},
                    "results": [
                        {"id": "https://openalex.org/W12", "publication_year": 2021}
                    ]
                })
                .to_string(),
            )
            .expect(1)
            .create_async()
            .await;

        let openalex = source(server.url(), 2);
        let paper = Candidate {
            id: "https://openalex.org/W1".to_string(),
            ..Default::default()
        };
        let events = openalex.citation_events(&paper).await.unwrap();

        assert_eq!(events.len(), 3);
        assert_eq!(events[0].citing_venue.as_deref(), Some("ICML"));
        assert_eq!(events[2].citing_paper_id, "W12");
        first.assert_async().await;
        second.assert_async().await;
    }

    #[tokio::test]
    async fn missing_results_array_is_retried_then_malformed() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/works")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"meta": {}}"#)
            .expect(2)
            .create_async()
            .await;

        let openalex = source(server.url(), 200);
        let err = openalex.search_by_title("Anything").await.unwrap_err();
        assert!(matches!(err, HarvestError::MalformedResponse(..)));
        mock.assert_async().await;
    }
}
