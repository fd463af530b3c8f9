//! Error types for the runner.

use std::path::PathBuf;

use nanofolio::ErrorKind;

/// All errors that can occur while driving a run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("failed to read config file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("price file error: {0}")]
    Prices(String),

    #[error("failed to read price file {path}: {source}")]
    PricesRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse price JSON: {0}")]
    PricesParse(#[from] serde_json::Error),

    #[error(transparent)]
    Core(#[from] nanofolio::Error),

    #[error("aborted: {0}")]
    Aborted(String),

    #[error("results file error: {0}")]
    Output(#[from] std::io::Error),
}

impl Error {
    /// Whether the error stems from configuration (exit code 2).
    pub fn is_config(&self) -> bool {
        match self {
            Error::Config(_) | Error::ConfigRead { .. } | Error::ConfigParse(_) => true,
            Error::Core(e) => e.kind() == ErrorKind::Configuration,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
