//! Embedding generation for semantic artwork search.
//!
//! A single local provider backed by Candle, loading
//! `intfloat/multilingual-e5-small` from the Hugging Face Hub. spec.md §4.6
//! fixes the encoder version and output dimension; re-embedding must reuse
//! the same model.
//!
//! ```text
//! EmbeddingProvider (trait)
//!     └── LocalProvider - Candle + e5-small, CPU/Metal/CUDA
//! ```

pub mod factory;
mod local;
mod provider;

pub use factory::create_provider;
pub use local::{LocalProvider, PASSAGE_PREFIX, QUERY_PREFIX};
pub use provider::{EmbeddingProvider, EmbeddingProviderType, ProviderStatus};
