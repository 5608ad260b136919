//! citeharvest science: citation sources, title matching, aggregation and
//! the primary and fallback harvest passes.

pub mod aggregate;
pub mod error;
pub mod harvest;
pub mod http;
pub mod matcher;
pub mod sources;

pub use aggregate::aggregate;
pub use error::{HarvestError, Result};
pub use harvest::{
    FallbackFetcher, Pass, PrimaryFetcher, Resolver, RowOutcome, RunReport, Unresolved,
};
pub use matcher::{TitleMatcher, normalize_title};
pub use sources::{Candidate, CitationSource};
