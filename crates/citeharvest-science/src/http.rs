use std::sync::Arc;
use std::time::{Duration, Instant};

use citeharvest_core::config::RetryConfig;
use reqwest::Url;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::{HarvestError, Result};

// ─── RetryPolicy ──────────────────────────────────────────────────────────────

/// Bounded exponential backoff: `base · 2^attempt`, capped at `max_delay`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

// ─── RateLimitedClient ────────────────────────────────────────────────────────

/// HTTP client for one external source.
///
/// All workers of a pass share one instance, so the minimum interval
/// between requests holds for the source as a whole.
pub struct RateLimitedClient {
    client: reqwest::Client,
    source_name: String,
    min_interval: Duration,
    last_request: Arc<Mutex<Option<Instant>>>,
    retry: RetryPolicy,
}

impl RateLimitedClient {
    pub fn new(
        source_name: &str,
        min_interval: Duration,
        retry: RetryPolicy,
        user_agent: &str,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .gzip(true)
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            source_name: source_name.to_string(),
            min_interval,
            last_request: Arc::new(Mutex::new(None)),
            retry,
        })
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    async fn wait_for_rate_limit(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(t) = *last {
            let elapsed = t.elapsed();
            if elapsed < self.min_interval {
                sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    pub async fn get_json<T: DeserializeOwned>(&self, url: &Url) -> Result<T> {
        self.get_json_with_headers(url, &HeaderMap::new()).await
    }

    /// GET and decode JSON, retrying transient failures (network errors,
    /// 429, 5xx, undecodable bodies) within the retry budget.
    pub async fn get_json_with_headers<T: DeserializeOwned>(
        &self,
        url: &Url,
        headers: &HeaderMap,
    ) -> Result<T> {
        let mut attempt = 0u32;
        loop {
            self.wait_for_rate_limit().await;
            match self.try_get_json(url, headers).await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.retry.max_retries => {
                    let wait = err
                        .retry_after()
                        .map(|d| d.min(self.retry.max_delay))
                        .unwrap_or_else(|| self.retry.delay_for(attempt));
                    warn!(
                        source = %self.source_name,
                        attempt = attempt + 1,
                        max = self.retry.max_retries,
                        wait_ms = wait.as_millis() as u64,
                        "{err}, retrying"
                    );
                    sleep(wait).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// POST a JSON body and decode the JSON reply, with the same retry rules.
    pub async fn post_json_with_headers<B: Serialize, R: DeserializeOwned>(
        &self,
        url: &Url,
        body: &B,
        headers: &HeaderMap,
    ) -> Result<R> {
        let mut attempt = 0u32;
        loop {
            self.wait_for_rate_limit().await;
            let request = self
                .client
                .post(url.clone())
                .headers(headers.clone())
                .json(body);
            match self.execute_json(request, url).await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.retry.max_retries => {
                    let wait = err
                        .retry_after()
                        .map(|d| d.min(self.retry.max_delay))
                        .unwrap_or_else(|| self.retry.delay_for(attempt));
                    warn!(
                        source = %self.source_name,
                        attempt = attempt + 1,
                        max = self.retry.max_retries,
                        "{err}, retrying"
                    );
                    sleep(wait).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn try_get_json<T: DeserializeOwned>(&self, url: &Url, headers: &HeaderMap) -> Result<T> {
        let request = self.client.get(url.clone()).headers(headers.clone());
        self.execute_json(request, url).await
    }

    async fn execute_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        url: &Url,
    ) -> Result<T> {
        debug!(source = %self.source_name, %url, "request");
        let resp = request.send().await?;
        let status = resp.status();

        if status.as_u16() == 429 {
            let retry_after = resp
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse::<u64>().ok());
            return Err(HarvestError::RateLimit(self.source_name.clone(), retry_after));
        }
        if status.is_server_error() {
            return Err(HarvestError::Server(
                self.source_name.clone(),
                status.as_u16(),
            ));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(HarvestError::ApiError(
                self.source_name.clone(),
                format!("HTTP {}: {}", status.as_u16(), truncate(&body, 200)),
            ));
        }

        let text = resp.text().await?;
        serde_json::from_str(&text)
            .map_err(|e| HarvestError::MalformedResponse(self.source_name.clone(), e.to_string()))
    }
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

pub fn parse_base_url(base_url: &str) -> Result<Url> {
    Url::parse(base_url).map_err(|e| HarvestError::Parse(format!("invalid URL {base_url}: {e}")))
}

/// Append path segments to a base URL, keeping any path it already has.
pub fn join_segments(base_url: &str, segments: &[&str]) -> Result<Url> {
    let mut url = parse_base_url(base_url)?;
    {
        let mut segs = url
            .path_segments_mut()
            .map_err(|_| HarvestError::Parse(format!("invalid base URL {base_url}")))?;
        segs.pop_if_empty();
        for seg in segments {
            segs.push(seg);
        }
    }
    Ok(url)
}
