//! Local embedding provider using Candle and `intfloat/multilingual-e5-small`.
//!
//! GPU acceleration via compile-time features:
//! - `--features metal` for macOS Metal/MPS
//! - `--features cuda` for NVIDIA CUDA

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use hf_hub::{api::sync::Api, Repo, RepoType};
use once_cell::sync::OnceCell;
use rijks_config::EmbeddingConfig;
use tokenizers::{PaddingParams, PaddingStrategy, Tokenizer};
use tracing::{debug, info};

use crate::error::{EmbedError, Result};

use super::provider::{EmbeddingProvider, EmbeddingProviderType, ProviderStatus};

/// Data type for model inference.
const DTYPE: DType = DType::F32;

/// E5-family document prefix (spec.md §4.6).
pub const PASSAGE_PREFIX: &str = "passage: ";

/// E5-family query prefix (spec.md §4.6).
pub const QUERY_PREFIX: &str = "query: ";

/// Local embedding provider backed by a single Candle BERT model.
///
/// Uses `Arc<LocalProviderInner>` for interior clonability, required for
/// `spawn_blocking` to move the provider into the blocking task.
#[derive(Clone)]
pub struct LocalProvider {
    inner: Arc<LocalProviderInner>,
}

struct LocalProviderInner {
    model: OnceCell<LoadedModel>,
    device: Device,
    model_id: String,
    dimension: usize,
}

struct LoadedModel {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
}

impl LocalProvider {
    /// Create a provider using the default e5-small configuration.
    /// Device is selected automatically: Metal > CUDA > CPU.
    pub fn new() -> Result<Self> {
        Self::with_config(&EmbeddingConfig::default())
    }

    /// Create a provider for a specific model/dimension (spec.md §4.6: "the
    /// spec fixes D ... and requires the same encoder version for
    /// re-embedding").
    pub fn with_config(config: &EmbeddingConfig) -> Result<Self> {
        let device = select_device()?;
        Ok(Self {
            inner: Arc::new(LocalProviderInner {
                model: OnceCell::new(),
                device,
                model_id: config.model_id.clone(),
                dimension: config.dimension,
            }),
        })
    }

    /// Get the device being used.
    pub fn device(&self) -> &Device {
        &self.inner.device
    }

    fn device_name(&self) -> String {
        match &self.inner.device {
            Device::Cpu => "CPU".to_string(),
            #[cfg(feature = "metal")]
            Device::Metal(_) => "Metal".to_string(),
            #[cfg(feature = "cuda")]
            Device::Cuda(_) => "CUDA".to_string(),
            #[allow(unreachable_patterns)]
            _ => "Unknown".to_string(),
        }
    }

    fn ensure_model(&self) -> Result<&LoadedModel> {
        self.inner
            .model
            .get_or_try_init(|| load_model(&self.inner.device, &self.inner.model_id))
    }

    /// Whether the model has already been loaded into memory.
    pub fn is_loaded(&self) -> bool {
        self.inner.model.get().is_some()
    }

    fn encode_sync(&self, texts: &[String], prefix: &str) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let prefixed: Vec<String> = texts.iter().map(|t| format!("{prefix}{t}")).collect();
        let refs: Vec<&str> = prefixed.iter().map(String::as_str).collect();
        debug!(count = refs.len(), prefix, "encoding texts");

        let loaded = self.ensure_model()?;
        encode_with_model(&loaded.model, &loaded.tokenizer, &loaded.device, &refs)
    }
}

#[async_trait]
impl EmbeddingProvider for LocalProvider {
    async fn encode_passages(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let provider = self.clone();
        tokio::task::spawn_blocking(move || provider.encode_sync(&texts, PASSAGE_PREFIX))
            .await
            .map_err(|e| EmbedError::Embedding(format!("blocking task panicked: {e}")))?
    }

    async fn encode_queries(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let provider = self.clone();
        tokio::task::spawn_blocking(move || provider.encode_sync(&texts, QUERY_PREFIX))
            .await
            .map_err(|e| EmbedError::Embedding(format!("blocking task panicked: {e}")))?
    }

    async fn check_status(&self) -> Result<ProviderStatus> {
        let loaded = self.is_loaded();
        let device = self.device_name();
        let model_id = self.inner.model_id.clone();

        let available = loaded || check_model_cached(&model_id).is_ok();
        let error = if !available {
            Some("model not available - download required".to_string())
        } else {
            None
        };

        Ok(ProviderStatus {
            available,
            provider_type: EmbeddingProviderType::Local,
            device,
            latency_ms: None,
            ready: loaded,
            error,
        })
    }

    async fn warmup(&self) -> Result<()> {
        let provider = self.clone();
        let start = Instant::now();

        tokio::task::spawn_blocking(move || {
            provider.ensure_model()?;
            Ok::<_, EmbedError>(())
        })
        .await
        .map_err(|e| EmbedError::Embedding(format!("warmup task panicked: {e}")))??;

        info!(elapsed = ?start.elapsed(), "local provider warmup complete");
        Ok(())
    }

    fn embedding_dim(&self) -> usize {
        self.inner.dimension
    }

    fn provider_type(&self) -> EmbeddingProviderType {
        EmbeddingProviderType::Local
    }
}

fn select_device() -> Result<Device> {
    #[cfg(feature = "metal")]
    {
        match Device::new_metal(0) {
            Ok(device) => {
                info!("using Metal GPU acceleration");
                return Ok(device);
            }
            Err(e) => debug!("metal not available: {e}"),
        }
    }

    #[cfg(feature = "cuda")]
    {
        match Device::new_cuda(0) {
            Ok(device) => {
                info!("using CUDA GPU acceleration");
                return Ok(device);
            }
            Err(e) => debug!("cuda not available: {e}"),
        }
    }

    info!("using CPU (no GPU acceleration available)");
    Ok(Device::Cpu)
}

fn check_model_cached(model_id: &str) -> std::result::Result<bool, String> {
    let api = Api::new().map_err(|e| format!("HuggingFace API unavailable: {e}"))?;
    let repo = Repo::with_revision(model_id.to_string(), RepoType::Model, "main".to_string());
    api.repo(repo).info().map(|_| true).map_err(|e| e.to_string())
}

fn download_model_files(model_id: &str) -> Result<(PathBuf, PathBuf, PathBuf)> {
    let api = Api::new().map_err(|e| EmbedError::ProviderUnavailable(format!("HF API unavailable: {e}")))?;
    let repo = Repo::with_revision(model_id.to_string(), RepoType::Model, "main".to_string());
    let api_repo = api.repo(repo);

    let config = api_repo
        .get("config.json")
        .map_err(|e| EmbedError::ProviderUnavailable(format!("failed to download config.json: {e}")))?;
    let tokenizer = api_repo
        .get("tokenizer.json")
        .map_err(|e| EmbedError::ProviderUnavailable(format!("failed to download tokenizer.json: {e}")))?;
    let weights = api_repo
        .get("model.safetensors")
        .map_err(|e| EmbedError::ProviderUnavailable(format!("failed to download model.safetensors: {e}")))?;

    Ok((config, tokenizer, weights))
}

fn load_model(device: &Device, model_id: &str) -> Result<LoadedModel> {
    info!(model_id, "loading embedding model");

    let (config_path, tokenizer_path, weights_path) = download_model_files(model_id)?;

    let config_str = std::fs::read_to_string(&config_path)?;
    let config: BertConfig = serde_json::from_str(&config_str)?;

    let tokenizer = Tokenizer::from_file(&tokenizer_path)
        .map_err(|e| EmbedError::Embedding(format!("failed to load tokenizer: {e}")))?;

    let vb = unsafe {
        VarBuilder::from_mmaped_safetensors(&[weights_path], DTYPE, device)?
    };

    let model = BertModel::load(vb, &config)?;

    info!(model_id, dim = config.hidden_size, "embedding model loaded");

    Ok(LoadedModel {
        model,
        tokenizer,
        device: device.clone(),
    })
}

fn normalize_l2(v: &Tensor) -> Result<Tensor> {
    Ok(v.broadcast_div(&v.sqr()?.sum_keepdim(1)?.sqrt()?)?)
}

fn mean_pool(embeddings: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
    let mask = attention_mask.to_dtype(DTYPE)?.unsqueeze(2)?;
    let sum_mask = mask.sum(1)?;
    let masked = embeddings.broadcast_mul(&mask)?;
    let summed = masked.sum(1)?;
    Ok(summed.broadcast_div(&sum_mask)?)
}

fn encode_with_model(
    model: &BertModel,
    tokenizer: &Tokenizer,
    device: &Device,
    texts: &[&str],
) -> Result<Vec<Vec<f32>>> {
    let mut tokenizer = tokenizer.clone();
    let padding = PaddingParams {
        strategy: PaddingStrategy::BatchLongest,
        ..Default::default()
    };
    tokenizer.with_padding(Some(padding));

    let encodings = tokenizer
        .encode_batch(texts.to_vec(), true)
        .map_err(|e| EmbedError::Embedding(format!("tokenization failed: {e}")))?;

    let token_ids: Vec<Tensor> = encodings
        .iter()
        .map(|enc| Tensor::new(enc.get_ids().to_vec().as_slice(), device))
        .collect::<candle_core::Result<Vec<_>>>()?;
    let attention_masks: Vec<Tensor> = encodings
        .iter()
        .map(|enc| Tensor::new(enc.get_attention_mask().to_vec().as_slice(), device))
        .collect::<candle_core::Result<Vec<_>>>()?;

    let token_ids = Tensor::stack(&token_ids, 0)?;
    let attention_mask = Tensor::stack(&attention_masks, 0)?;
    let token_type_ids = token_ids.zeros_like()?;

    let embeddings = model.forward(&token_ids, &token_type_ids, Some(&attention_mask))?;
    let pooled = mean_pool(&embeddings, &attention_mask)?;
    let normalized = normalize_l2(&pooled)?;

    let result: Vec<Vec<f32>> = (0..normalized.dim(0)?)
        .map(|i| normalized.get(i)?.to_vec1::<f32>())
        .collect::<candle_core::Result<Vec<_>>>()?;

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_creation_does_not_touch_network() {
        let provider = LocalProvider::new();
        assert!(provider.is_ok());
    }

    #[test]
    fn device_selection() {
        let device = select_device();
        assert!(device.is_ok());
    }

    #[test]
    fn provider_type_is_local() {
        let provider = LocalProvider::new().unwrap();
        assert_eq!(provider.provider_type(), EmbeddingProviderType::Local);
    }

    #[test]
    fn embedding_dim_matches_config() {
        let provider = LocalProvider::new().unwrap();
        assert_eq!(provider.embedding_dim(), 384);
    }

    #[test]
    fn empty_input_short_circuits() {
        let provider = LocalProvider::new().unwrap();
        let result = provider.encode_sync(&[], PASSAGE_PREFIX);
        assert!(result.is_ok());
        assert!(result.unwrap().is_empty());
    }

    #[tokio::test]
    async fn check_status_reports_provider_type() {
        let provider = LocalProvider::new().unwrap();
        let status = provider.check_status().await.unwrap();
        assert_eq!(status.provider_type, EmbeddingProviderType::Local);
    }

    #[tokio::test]
    #[ignore] // requires model download
    async fn passage_and_query_encoding() {
        let provider = LocalProvider::new().unwrap();
        let passages = provider
            .encode_passages(vec!["a winter landscape".to_string()])
            .await
            .unwrap();
        assert_eq!(passages[0].len(), 384);

        let queries = provider
            .encode_queries(vec!["winter landscape with ice skating".to_string()])
            .await
            .unwrap();
        assert_eq!(queries[0].len(), 384);
    }

    #[tokio::test]
    #[ignore] // requires model download
    async fn warmup_loads_model() {
        let provider = LocalProvider::new().unwrap();
        provider.warmup().await.unwrap();
        assert!(provider.is_loaded());
    }
}
