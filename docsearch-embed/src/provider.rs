//! Embedding provider implementations

use crate::config::EmbedConfig;
use crate::error::{EmbedError, Result};
use crate::hashing::HashingProvider;
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use fnv::FnvHasher;
use half::f16;
use std::collections::HashMap;
use std::hash::Hasher;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

/// Result of embedding generation
#[derive(Debug, Clone)]
pub struct EmbeddingResult {
    /// The generated embeddings, one per input text
    pub embeddings: Vec<Vec<f16>>,
    /// The dimension of each embedding vector
    pub dimension: usize,
}

impl EmbeddingResult {
    /// Create a new embedding result from a vector of f16 embeddings.
    ///
    /// The dimension is inferred from the first embedding vector, or 0 when the
    /// result is empty.
    pub fn new(embeddings: Vec<Vec<f16>>) -> Self {
        let dimension = embeddings.first().map(|e| e.len()).unwrap_or(0);
        Self {
            embeddings,
            dimension,
        }
    }

    /// Returns the number of embedding vectors in this result.
    pub fn len(&self) -> usize {
        self.embeddings.len()
    }

    /// Returns `true` if this result contains no embedding vectors.
    pub fn is_empty(&self) -> bool {
        self.embeddings.is_empty()
    }
}

/// Trait for embedding providers that can generate embeddings from text
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embeddings for a single text
    async fn embed_text(&self, text: &str) -> Result<Vec<f16>>;

    /// Generate embeddings for multiple texts (batch processing)
    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult>;

    /// Get the dimension of embeddings produced by this provider
    fn embedding_dimension(&self) -> usize;

    /// Get the name/identifier of this provider
    fn provider_name(&self) -> &str;
}

/// Build the provider selected by `config.model_name`.
///
/// `"hashing"` yields the offline [`HashingProvider`]; every other name is
/// resolved as a fastembed model and loaded (downloading it on first use).
pub async fn create_provider(config: EmbedConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    config.validate()?;

    if config.is_hashing() {
        tracing::info!(
            "Using hashing embedding provider with dimension {}",
            config.dimension
        );
        return Ok(Arc::new(
            HashingProvider::new(config.dimension).with_normalize(config.normalize),
        ));
    }

    Ok(Arc::new(FastEmbedProvider::create(config).await?))
}

/// A loaded fastembed model and the dimension it produces.
#[derive(Clone)]
struct LoadedModel {
    model: Arc<Mutex<TextEmbedding>>,
    dimension: usize,
}

/// Models loaded by this process, keyed by [`FastEmbedProvider::cache_key`].
static MODEL_CACHE: OnceLock<Mutex<HashMap<String, LoadedModel>>> = OnceLock::new();

fn model_cache() -> MutexGuard<'static, HashMap<String, LoadedModel>> {
    MODEL_CACHE
        .get_or_init(Default::default)
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Run `texts` through `model` on the blocking pool.
async fn run_model(model: Arc<Mutex<TextEmbedding>>, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
    let embeddings = tokio::task::spawn_blocking(move || {
        let mut guard = model.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.embed(texts, None)
    })
    .await?;
    embeddings.map_err(EmbedError::embedding_gen)
}

/// Map a configured model name onto a fastembed model.
///
/// Accepts the bare name or the `sentence-transformers/` / `BAAI/` qualified form,
/// case-insensitively.
pub fn resolve_model(name: &str) -> Result<EmbeddingModel> {
    let lowered = name.trim().to_ascii_lowercase();
    let bare = lowered
        .strip_prefix("sentence-transformers/")
        .or_else(|| lowered.strip_prefix("baai/"))
        .unwrap_or(&lowered);

    match bare {
        "all-minilm-l6-v2" => Ok(EmbeddingModel::AllMiniLML6V2),
        "all-minilm-l12-v2" => Ok(EmbeddingModel::AllMiniLML12V2),
        "bge-small-en-v1.5" => Ok(EmbeddingModel::BGESmallENV15),
        _ => Err(EmbedError::UnsupportedModel {
            name: name.to_string(),
        }),
    }
}

/// Sentence-transformer embeddings from a local ONNX model via fastembed.
///
/// Loaded models are shared process-wide, so creating several providers for the
/// same model and cache directory only loads it once.
#[derive(Clone)]
pub struct FastEmbedProvider {
    config: EmbedConfig,
    loaded: Option<LoadedModel>,
}

impl std::fmt::Debug for FastEmbedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedProvider")
            .field("config", &self.config)
            .field("loaded", &self.loaded.is_some())
            .field("dimension", &self.embedding_dimension())
            .finish()
    }
}

impl FastEmbedProvider {
    /// An unloaded provider; [`load`](Self::load) must run before embedding.
    pub fn new(config: EmbedConfig) -> Self {
        Self {
            config,
            loaded: None,
        }
    }

    /// Load the model and sanity-check one embedding.
    pub async fn create(config: EmbedConfig) -> Result<Self> {
        let mut provider = Self::new(config);
        provider.load().await?;
        Ok(provider)
    }

    /// Load (or fetch from the process cache) the configured model.
    pub async fn load(&mut self) -> Result<()> {
        let name = self.config.model_name().to_string();
        let model_kind = resolve_model(&name)?;
        let key = self.cache_key()?;

        let cached = model_cache().get(&key).cloned();
        if let Some(loaded) = cached {
            tracing::info!("Reusing loaded model {}", name);
            self.loaded = Some(loaded);
            return Ok(());
        }

        if let Some(cache_dir) = &self.config.cache_dir {
            tokio::fs::create_dir_all(cache_dir).await?;
        }

        tracing::info!("Loading embedding model {}", name);
        let cache_dir = self.config.cache_dir.clone();
        let model = tokio::task::spawn_blocking(move || {
            let mut options = InitOptions::new(model_kind).with_show_download_progress(true);
            if let Some(cache_dir) = cache_dir {
                options = options.with_cache_dir(cache_dir);
            }
            TextEmbedding::try_new(options)
        })
        .await?
        .map_err(|e| EmbedError::model_init(format!("{name}: {e}")))?;
        let model = Arc::new(Mutex::new(model));

        let probe = run_model(Arc::clone(&model), vec!["probe".to_string()]).await?;
        let dimension = check_probe(&probe)?;
        tracing::info!("Loaded {} ({} dimensions)", name, dimension);

        let loaded = LoadedModel { model, dimension };
        model_cache().insert(key, loaded.clone());
        tracing::debug!("{} models loaded in this process", Self::cache_size());
        self.loaded = Some(loaded);
        Ok(())
    }

    /// Process cache key: the lowercase model name and the cache directory.
    /// Batch size and normalization are applied after the model runs.
    fn cache_key(&self) -> Result<String> {
        let identity = serde_json::to_vec(&serde_json::json!({
            "model": self.config.model_name.trim().to_ascii_lowercase(),
            "cache_dir": self.config.cache_dir,
        }))
        .map_err(|e| EmbedError::External { source: e.into() })?;

        let mut hasher = FnvHasher::default();
        hasher.write(&identity);
        Ok(format!("v1:{:x}", hasher.finish()))
    }

    pub fn cache_size() -> usize {
        model_cache().len()
    }

    fn to_f16(&self, embedding: Vec<f32>) -> Vec<f16> {
        let mut vector: Vec<f16> = embedding.into_iter().map(f16::from_f32).collect();
        if self.config.normalize {
            normalize_in_place(&mut vector);
        }
        vector
    }
}

/// Dimension of a probe embedding, rejecting empty or non-finite output.
fn check_probe(probe: &[Vec<f32>]) -> Result<usize> {
    let embedding = probe
        .first()
        .filter(|e| !e.is_empty())
        .ok_or_else(|| EmbedError::model_init("model produced an empty probe embedding"))?;
    if embedding.iter().any(|v| !v.is_finite()) {
        return Err(EmbedError::model_init("model produced non-finite values"));
    }
    Ok(embedding.len())
}

/// Scale `vector` to unit L2 norm; zero vectors are left untouched.
pub(crate) fn normalize_in_place(vector: &mut [f16]) {
    let norm: f32 = vector
        .iter()
        .map(|x| x.to_f32() * x.to_f32())
        .sum::<f32>()
        .sqrt();
    if norm > 0.0 {
        for value in vector.iter_mut() {
            *value = f16::from_f32(value.to_f32() / norm);
        }
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn embed_text(&self, text: &str) -> Result<Vec<f16>> {
        let texts = vec![text.to_string()];
        let result = self.embed_texts(&texts).await?;
        result
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbedError::invalid_config("No embedding generated for text"))
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult> {
        if texts.is_empty() {
            return Ok(EmbeddingResult::new(vec![]));
        }
        let loaded = self
            .loaded
            .as_ref()
            .ok_or_else(|| EmbedError::invalid_config("model not loaded; call load() first"))?;

        let mut embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.config.batch_size.max(1)) {
            tracing::debug!("Embedding batch of {} texts", batch.len());
            let raw = run_model(Arc::clone(&loaded.model), batch.to_vec()).await?;
            embeddings.extend(raw.into_iter().map(|e| self.to_f16(e)));
        }

        Ok(EmbeddingResult::new(embeddings))
    }

    fn embedding_dimension(&self) -> usize {
        self.loaded
            .as_ref()
            .map_or(self.config.dimension, |loaded| loaded.dimension)
    }

    fn provider_name(&self) -> &str {
        "fastembed"
    }
}
