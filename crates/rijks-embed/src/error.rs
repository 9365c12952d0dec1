//! Error types for rijks-embed.

use thiserror::Error;

/// Errors that can occur in rijks-embed operations.
#[derive(Error, Debug)]
pub enum EmbedError {
    /// Store error
    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    /// Embedding/inference error (tokenization, model load, forward pass)
    #[error("embedding error: {0}")]
    Embedding(String),

    /// Embedding provider unavailable
    #[error("embedding provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Embedding dimension mismatch
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<candle_core::Error> for EmbedError {
    fn from(err: candle_core::Error) -> Self {
        EmbedError::Embedding(err.to_string())
    }
}

/// Result type for rijks-embed operations
pub type Result<T> = std::result::Result<T, EmbedError>;
