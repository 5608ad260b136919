use std::time::Duration;

use citeharvest_core::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("rate limit from {0}")]
    RateLimit(String, Option<u64>),

    #[error("server error from {0}: HTTP {1}")]
    Server(String, u16),

    #[error("API error from {0}: {1}")]
    ApiError(String, String),

    #[error("malformed response from {0}: {1}")]
    MalformedResponse(String, String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("store error: {0}")]
    Store(#[from] CoreError),
}

impl HarvestError {
    /// Errors worth another attempt after a pause.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Http(_) | Self::RateLimit(..) | Self::Server(..) | Self::MalformedResponse(..)
        )
    }

    /// Errors that must stop the whole run rather than a single row.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Store(_))
    }

    /// Server-requested wait, from a `Retry-After` header.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimit(_, Some(secs)) => Some(Duration::from_secs(*secs)),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, HarvestError>;
