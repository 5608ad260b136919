//! citeharvest AI: topic classification of paper titles through an
//! OpenAI-compatible chat model.

pub mod chat;
pub mod classifier;
pub mod error;
pub mod pass;

pub use chat::ChatClassifier;
pub use classifier::{Classification, Classifier, clean_title};
pub use error::{ClassifyError, Result};
pub use pass::classify_table;
