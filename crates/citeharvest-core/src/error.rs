use thiserror::Error;

/// All errors that can occur in citeharvest-core.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Missing required column '{column}' in {path}")]
    MissingColumn { path: String, column: String },

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl CoreError {
    /// Configuration problems are detected before any worker starts.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Config(_)
                | Self::MissingColumn { .. }
                | Self::FileNotFound(_)
                | Self::TomlParse(_)
                | Self::Yaml(_)
        )
    }
}

/// Exit codes used by the CLI.
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    GeneralError = 1,
    ConfigError = 2,
    PersistenceError = 4,
}

pub type Result<T> = std::result::Result<T, CoreError>;
