//! Text-to-vector embedding pipeline for artwork semantic search (spec.md
//! §4.6): composite-text construction, a local Candle inference provider,
//! int8 quantization, and a streaming writer into the BLOB + `vec0` KNN
//! tables.

pub mod embeddings;
pub mod error;
pub mod quantize;
pub mod text;
pub mod writer;

pub use embeddings::{create_provider, EmbeddingProvider, EmbeddingProviderType, LocalProvider, ProviderStatus};
pub use error::{EmbedError, Result};
pub use text::{load_composite_texts, CompositeText};
pub use writer::{run as embed_and_write, validate as validate_embeddings, ValidationMismatch, WriteStats};
