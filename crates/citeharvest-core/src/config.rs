use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::models::{VenueConfig, YearRange};

/// Root application configuration, loaded from `~/.config/citeharvest/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub paths: PathsConfig,
    pub years: YearRange,
    pub matcher: MatcherConfig,
    pub retry: RetryConfig,
    pub semantic_scholar: SemanticScholarConfig,
    pub openalex: OpenAlexConfig,
    pub classify: ClassifyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub data_dir: PathBuf,
    pub failures_dir: PathBuf,
    pub venues_file: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMetric {
    /// Longest-matching-block ratio, `2·M / T`.
    Ratcliff,
    Levenshtein,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Minimum similarity for a fuzzy match. Higher values trade missed
    /// matches for fewer wrong ones.
    pub threshold: f64,
    pub metric: MatchMetric,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SemanticScholarConfig {
    pub base_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub api_key_env: String,
    pub min_interval_ms: u64,
    pub search_limit: u32,
    pub page_size: u32,
    pub workers: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAlexConfig {
    pub base_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mailto: Option<String>,
    pub min_interval_ms: u64,
    pub search_limit: u32,
    pub page_size: u32,
    pub workers: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifyConfig {
    pub base_url: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub api_key_env: String,
    /// Pause between completion requests.
    pub min_interval_ms: u64,
    pub batch_size: usize,
    pub column: String,
    pub file_suffix: String,
    pub categories: Vec<String>,
}

// ─── Defaults ──────────────────────────────────────────────

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            failures_dir: PathBuf::from("data-false"),
            venues_file: PathBuf::from("config").join("venues_top.yaml"),
        }
    }
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            threshold: 0.85,
            metric: MatchMetric::Ratcliff,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay_ms: 2_000,
            max_delay_ms: 60_000,
        }
    }
}

impl Default for SemanticScholarConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.semanticscholar.org/graph/v1".to_string(),
            api_key: None,
            api_key_env: "S2_API_KEY".to_string(),
            min_interval_ms: 1_000,
            search_limit: 5,
            page_size: 1_000,
            workers: 3,
        }
    }
}

impl Default for OpenAlexConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openalex.org".to_string(),
            mailto: None,
            min_interval_ms: 200,
            search_limit: 5,
            page_size: 200,
            workers: 5,
        }
    }
}

impl Default for ClassifyConfig {
    fn default() -> Self {
        Self {
            base_url: "https://dashscope.aliyuncs.com/compatible-mode/v1".to_string(),
            model: "deepseek-v3".to_string(),
            api_key: None,
            api_key_env: "CITEHARVEST_LLM_KEY".to_string(),
            min_interval_ms: 1_000,
            batch_size: 5,
            column: "ai_category".to_string(),
            file_suffix: ".final.csv".to_string(),
            categories: [
                "Machine Learning (including Deep Learning)",
                "Representation Learning and Optimization",
                "Probability, Statistics, and Inference",
                "Natural Language Processing",
                "Computer Vision",
                "Multimodal Learning",
                "AI Foundations and Theory",
                "Reinforcement Learning and Decision Making",
                "Interpretability, Fairness, and Applied Systems",
            ]
            .into_iter()
            .map(ToOwned::to_owned)
            .collect(),
        }
    }
}

impl SemanticScholarConfig {
    /// Inline key first, then the configured environment variable.
    pub fn resolved_api_key(&self) -> Option<String> {
        resolve_secret(self.api_key.as_deref(), &self.api_key_env)
    }
}

impl ClassifyConfig {
    pub fn resolved_api_key(&self) -> Option<String> {
        resolve_secret(self.api_key.as_deref(), &self.api_key_env)
    }
}

fn resolve_secret(inline: Option<&str>, env_name: &str) -> Option<String> {
    inline
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToOwned::to_owned)
        .or_else(|| {
            std::env::var(env_name)
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        })
}

// ─── Load / Save ───────────────────────────────────────────

impl AppConfig {
    /// Standard config file path: `~/.config/citeharvest/config.toml`
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("CITEHARVEST_CONFIG") {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("citeharvest")
            .join("config.toml")
    }

    /// Load config from disk, falling back to defaults if file doesn't exist.
    pub fn load() -> Result<Self> {
        let path = Self::config_path();
        Self::load_from(&path)
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save config to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let toml_str = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_str)?;
        Ok(())
    }

    /// Reject settings that would make a run meaningless.
    pub fn validate(&self) -> Result<()> {
        if !self.years.is_valid() {
            return Err(CoreError::Config(format!(
                "years.min ({}) is greater than years.max ({})",
                self.years.min, self.years.max
            )));
        }
        if !(0.0..=1.0).contains(&self.matcher.threshold) {
            return Err(CoreError::Config(format!(
                "matcher.threshold must be within 0.0..=1.0, got {}",
                self.matcher.threshold
            )));
        }
        if self.semantic_scholar.workers == 0 || self.openalex.workers == 0 {
            return Err(CoreError::Config("workers must be at least 1".to_string()));
        }
        if self.semantic_scholar.page_size == 0
            || self.openalex.page_size == 0
            || self.semantic_scholar.search_limit == 0
            || self.openalex.search_limit == 0
        {
            return Err(CoreError::Config(
                "page_size and search_limit must be at least 1".to_string(),
            ));
        }
        if self.classify.batch_size == 0 {
            return Err(CoreError::Config(
                "classify.batch_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Load the venue lists named by `paths.venues_file`.
    pub fn load_venues(&self) -> Result<VenueConfig> {
        VenueConfig::load_from(&self.paths.venues_file)
    }
}
