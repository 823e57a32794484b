//! Error types for LinkChain

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ChainError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),
    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),
    #[error("Invalid block: {0}")]
    InvalidBlock(String),
    #[error("Invalid block linkage at index {index}")]
    InvalidBlockLinkage { index: u64 },
    #[error("Invalid proof of work at index {index}")]
    InvalidProofOfWork { index: u64 },
    #[error("Ledger holds no blocks")]
    EmptyChain,
    #[error("Invalid difficulty target: {0}")]
    InvalidDifficulty(String),
    #[error("Invalid peer address: {0}")]
    InvalidPeerAddress(String),
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Mining was cancelled")]
    MiningCancelled,
    #[error("Mining failed: {0}")]
    MiningFailed(String),
    #[error("IO error: {0}")]
    IoError(String),
}

impl From<std::io::Error> for ChainError {
    fn from(err: std::io::Error) -> Self {
        ChainError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for ChainError {
    fn from(err: serde_json::Error) -> Self {
        ChainError::InvalidBlock(format!("serialization failed: {}", err))
    }
}

impl From<toml::de::Error> for ChainError {
    fn from(err: toml::de::Error) -> Self {
        ChainError::ConfigError(err.to_string())
    }
}

impl From<url::ParseError> for ChainError {
    fn from(err: url::ParseError) -> Self {
        ChainError::InvalidPeerAddress(err.to_string())
    }
}

impl From<reqwest::Error> for ChainError {
    fn from(err: reqwest::Error) -> Self {
        ChainError::NetworkError(err.to_string())
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, ChainError>;
