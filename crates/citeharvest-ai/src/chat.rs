use std::time::Duration;

use async_trait::async_trait;
use citeharvest_core::config::ClassifyConfig;
use citeharvest_science::http::{RateLimitedClient, RetryPolicy, join_segments};
use reqwest::Url;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::classifier::{Classification, Classifier, clean_title};
use crate::error::{ClassifyError, Result};

const MAX_ATTEMPTS: u32 = 3;
const TEMPERATURE: f64 = 0.1;

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    temperature: f64,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Classifier backed by an OpenAI-compatible `/chat/completions` endpoint.
pub struct ChatClassifier {
    client: RateLimitedClient,
    endpoint: Url,
    model: String,
    api_key: String,
    categories: Vec<String>,
    attempt_delay: Duration,
}

impl ChatClassifier {
    /// Reads the key from `classify.api_key` or the configured env var.
    pub fn new(config: &ClassifyConfig) -> Result<Self> {
        let api_key = config
            .resolved_api_key()
            .ok_or_else(|| ClassifyError::MissingApiKey(config.api_key_env.clone()))?;
        Self::with_key(config, api_key)
    }

    pub fn with_key(config: &ClassifyConfig, api_key: String) -> Result<Self> {
        // Attempts are counted here, not in the HTTP client.
        let no_retry = RetryPolicy {
            max_retries: 0,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        };
        let client = RateLimitedClient::new(
            "classifier",
            Duration::from_millis(config.min_interval_ms),
            no_retry,
            concat!("citeharvest/", env!("CARGO_PKG_VERSION")),
        )?;
        let endpoint = join_segments(&config.base_url, &["chat", "completions"])?;

        Ok(Self {
            client,
            endpoint,
            model: config.model.clone(),
            api_key,
            categories: config.categories.clone(),
            attempt_delay: Duration::from_secs(2),
        })
    }

    /// Wait before attempt `n + 1` is `n · delay`.
    pub fn with_attempt_delay(mut self, delay: Duration) -> Self {
        self.attempt_delay = delay;
        self
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    fn prompt(&self, titles: &[String]) -> String {
        let mut prompt = format!(
            "As an AI expert, please classify the following papers into one of the categories below.\n\
             Select strictly from the provided list:\n{}\n\n\
             Return the result in JSON format as follows:\n\
             {{\n  \"results\": [\n    {{\"title\": \"Paper Title 1\", \"category\": \"Category Name\"}},\n    ...\n  ]\n}}\n\n\
             Note:\n\
             1. The \"title\" field in the JSON must match the provided title exactly (including symbols).\n\
             2. If the title contains LaTeX formulas or special characters, keep them as is. \
             Do not escape or modify them to ensure valid JSON.\n\n\
             Papers to classify:\n",
            self.categories.join(", ")
        );
        for (i, title) in titles.iter().enumerate() {
            prompt.push_str(&format!("{}. {}\n", i + 1, clean_title(title)));
        }
        prompt
    }

    async fn request(&self, prompt: &str) -> Result<Vec<Classification>> {
        let body = ChatRequest {
            model: &self.model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: TEMPERATURE,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.api_key))
            .map_err(|e| ClassifyError::Reply(format!("invalid API key header: {e}")))?;
        headers.insert(AUTHORIZATION, bearer);

        let response: ChatResponse = self
            .client
            .post_json_with_headers(&self.endpoint, &body, &headers)
            .await?;
        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ClassifyError::Reply("no choices in response".to_string()))?;

        parse_reply(&content)
    }
}

#[async_trait]
impl Classifier for ChatClassifier {
    async fn classify(&self, titles: &[String]) -> Vec<Classification> {
        if titles.is_empty() {
            return Vec::new();
        }
        let prompt = self.prompt(titles);

        for attempt in 1..=MAX_ATTEMPTS {
            match self.request(&prompt).await {
                Ok(results) => {
                    debug!(titles = titles.len(), results = results.len(), "batch classified");
                    return results;
                }
                Err(err) => warn!(attempt, max = MAX_ATTEMPTS, "classification failed: {err}"),
            }
            if attempt < MAX_ATTEMPTS {
                sleep(self.attempt_delay * attempt).await;
            }
        }

        warn!(titles = titles.len(), "no valid classification for batch");
        Vec::new()
    }
}

/// Models often wrap JSON in a Markdown fence despite the response format.
fn strip_code_fence(content: &str) -> &str {
    let inner = if let Some((_, rest)) = content.split_once("```json") {
        rest
    } else if let Some((_, rest)) = content.split_once("```") {
        rest
    } else {
        return content.trim();
    };
    inner.split("```").next().unwrap_or(inner).trim()
}

fn parse_reply(content: &str) -> Result<Vec<Classification>> {
    let value: Value = serde_json::from_str(strip_code_fence(content)).map_err(|e| {
        let preview = content.chars().take(100).collect::<String>();
        ClassifyError::Reply(format!("{e}; content starts with {preview:?}"))
    })?;

    let items = match &value {
        Value::Array(items) => items.as_slice(),
        Value::Object(_) => value
            .get("results")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default(),
        _ => return Err(ClassifyError::Reply("reply is neither object nor array".to_string())),
    };

    Ok(items
        .iter()
        .filter_map(|item| serde_json::from_value::<Classification>(item.clone()).ok())
        .collect())
}
