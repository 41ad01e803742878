// src/errors.rs

//! Crate-wide error type and result alias.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EthosError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Goal not found: {0}")]
    GoalNotFound(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Job is disabled: {0}")]
    JobDisabled(String),

    #[error("Store error during {op} on '{collection}': {message}")]
    Store {
        op: &'static str,
        collection: String,
        message: String,
    },

    #[error("{provider} provider error: {message}")]
    Provider {
        provider: &'static str,
        message: String,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Settlement failed: {0}")]
    Settlement(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl EthosError {
    /// Wrap a backend failure with the operation and collection it happened in.
    pub fn store(
        op: &'static str,
        collection: impl Into<String>,
        err: impl std::fmt::Display,
    ) -> Self {
        EthosError::Store {
            op,
            collection: collection.into(),
            message: err.to_string(),
        }
    }

    pub fn provider(provider: &'static str, message: impl Into<String>) -> Self {
        EthosError::Provider {
            provider,
            message: message.into(),
        }
    }

    /// True for errors an HTTP layer should report as "not found".
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            EthosError::GoalNotFound(_) | EthosError::JobNotFound(_)
        )
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, EthosError>;
