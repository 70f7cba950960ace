use std::path::PathBuf;

use notesim_core::{ConfigError, PricingError};

/// Failure to read or interpret an input document
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid YAML in {}: {source}", path.display())]
    Yaml {
        path: PathBuf,
        source: serde_saphyr::Error,
    },

    #[error("Invalid JSON in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Unsupported market data format: {}", path.display())]
    UnsupportedFormat { path: PathBuf },

    #[error("Invalid sweep configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to price note table: {0}")]
    Pricing(#[from] PricingError),
}

/// Failure talking to the results database or writing exports
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
