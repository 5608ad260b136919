pub mod config;
pub mod error;
pub mod models;
pub mod storage;

pub use config::{AppConfig, MatchMetric};
pub use error::{CoreError, ExitCode, Result};
pub use models::*;

pub use storage::dataset::{Dataset, DatasetStatus};
pub use storage::failure_queue::FailureQueue;
pub use storage::layout::{DataLayout, DatasetPaths};
pub use storage::table::{PaperTable, TITLE_COLUMN, title_key};
