//! Embedding provider trait and status types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Type of embedding provider. Only a local Candle-based provider is
/// implemented; the variant still exists so `ProviderStatus` has something
/// stable to report, matching the shape of diagnostics the rest of the
/// pipeline logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum EmbeddingProviderType {
    /// Local inference using Candle (CPU/Metal/CUDA)
    #[default]
    Local,
}

impl std::fmt::Display for EmbeddingProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmbeddingProviderType::Local => write!(f, "local"),
        }
    }
}

/// Status of an embedding provider.
#[derive(Debug, Clone)]
pub struct ProviderStatus {
    /// Whether the provider is available and responding
    pub available: bool,
    /// Type of provider
    pub provider_type: EmbeddingProviderType,
    /// Device being used ("CPU", "Metal", "CUDA")
    pub device: String,
    /// Last health check latency in milliseconds
    pub latency_ms: Option<u64>,
    /// Whether the model is loaded and ready to encode
    pub ready: bool,
    /// Error message if provider is unavailable
    pub error: Option<String>,
}

impl ProviderStatus {
    /// Create a status for a healthy provider
    pub fn healthy(provider_type: EmbeddingProviderType, device: impl Into<String>) -> Self {
        Self {
            available: true,
            provider_type,
            device: device.into(),
            latency_ms: None,
            ready: true,
            error: None,
        }
    }

    /// Create a status for an unavailable provider
    pub fn unavailable(provider_type: EmbeddingProviderType, error: impl Into<String>) -> Self {
        Self {
            available: false,
            provider_type,
            device: "N/A".into(),
            latency_ms: None,
            ready: false,
            error: Some(error.into()),
        }
    }

    /// Set latency from a health check
    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = Some(latency_ms);
        self
    }

    /// Check if the provider is available and its model is ready
    pub fn all_ready(&self) -> bool {
        self.available && self.ready
    }
}

/// Embedding provider trait.
///
/// The encoder contract (spec.md §4.6) is a callable from a list of strings,
/// with a provider-specified per-query prefix, to an L2-normalized float
/// matrix of shape (N, `embedding_dim()`). The E5 model family distinguishes
/// documents from queries via the `passage: `/`query: ` prefixes, so the
/// trait exposes both as separate methods rather than taking the prefix as a
/// parameter callers could get wrong.
///
/// All methods are async so a local Candle provider can bridge its
/// synchronous inference onto `spawn_blocking` without the trait itself
/// caring how.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Encode texts as documents (`passage: ` prefix), for storage.
    async fn encode_passages(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>>;

    /// Encode texts as search queries (`query: ` prefix).
    async fn encode_queries(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>>;

    /// Check provider connectivity and status.
    async fn check_status(&self) -> Result<ProviderStatus>;

    /// Preload the model into memory.
    async fn warmup(&self) -> Result<()>;

    /// Dimensionality of generated embeddings.
    fn embedding_dim(&self) -> usize;

    /// Provider type identifier.
    fn provider_type(&self) -> EmbeddingProviderType;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_type_display() {
        assert_eq!(EmbeddingProviderType::Local.to_string(), "local");
    }

    #[test]
    fn provider_type_default() {
        assert_eq!(EmbeddingProviderType::default(), EmbeddingProviderType::Local);
    }

    #[test]
    fn provider_status_healthy() {
        let status = ProviderStatus::healthy(EmbeddingProviderType::Local, "CPU");
        assert!(status.available);
        assert!(status.ready);
        assert!(status.all_ready());
        assert_eq!(status.device, "CPU");
        assert!(status.error.is_none());
    }

    #[test]
    fn provider_status_unavailable() {
        let status = ProviderStatus::unavailable(EmbeddingProviderType::Local, "model not cached");
        assert!(!status.available);
        assert!(!status.all_ready());
        assert_eq!(status.error, Some("model not cached".to_string()));
    }

    #[test]
    fn provider_status_with_latency() {
        let status = ProviderStatus::healthy(EmbeddingProviderType::Local, "CPU").with_latency(12);
        assert_eq!(status.latency_ms, Some(12));
    }
}
