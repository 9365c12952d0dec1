//! Provider factory for creating an embedding provider from configuration.

use std::sync::Arc;

use rijks_config::EmbeddingConfig;

use crate::error::{EmbedError, Result};

use super::local::LocalProvider;
use super::provider::EmbeddingProvider;

/// Build a provider from the embedding configuration, validating that its
/// reported dimension matches `config.dimension` before handing it back.
pub fn create_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    let provider = LocalProvider::with_config(config)?;
    let actual = provider.embedding_dim();
    if actual != config.dimension {
        return Err(EmbedError::DimensionMismatch {
            expected: config.dimension,
            actual,
        });
    }
    Ok(Arc::new(provider))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_local_provider_with_matching_dimension() {
        let config = EmbeddingConfig::default();
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.embedding_dim(), 384);
    }
}
