use citeharvest_core::CoreError;
use citeharvest_science::HarvestError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("no API key for the classifier: set {0} or classify.api_key")]
    MissingApiKey(String),

    #[error("request failed: {0}")]
    Request(#[from] HarvestError),

    #[error("unusable model reply: {0}")]
    Reply(String),

    #[error("store error: {0}")]
    Store(#[from] CoreError),
}

pub type Result<T> = std::result::Result<T, ClassifyError>;
