use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A category the model assigned to one title.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub category: String,
}

/// Assigns one topic category to each title of a batch.
///
/// Failures are absorbed: a batch that cannot be classified comes back
/// empty and its rows stay pending for the next run.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, titles: &[String]) -> Vec<Classification>;
}

/// Form a title takes in the prompt: backslashes and newlines become
/// spaces, double quotes become single quotes.
pub fn clean_title(title: &str) -> String {
    title
        .replace('\\', " ")
        .replace('"', "'")
        .replace(['\n', '\r'], " ")
        .trim()
        .to_string()
}
