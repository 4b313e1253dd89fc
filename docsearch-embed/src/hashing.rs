//! Offline embeddings via feature hashing.
//!
//! [`HashingProvider`] maps each lowercase alphanumeric token of a text onto one of
//! `dimension` buckets with an FNV hash and accumulates a signed count there. Texts
//! sharing vocabulary end up close under cosine distance. The vectors carry no
//! semantics beyond word overlap, but they are deterministic, need no model
//! download and cost next to nothing, which makes the provider suitable for tests
//! and air-gapped deployments.

use crate::config::DEFAULT_DIMENSION;
use crate::error::{EmbedError, Result};
use crate::provider::{EmbeddingProvider, EmbeddingResult, normalize_in_place};
use async_trait::async_trait;
use fnv::FnvHasher;
use half::f16;
use std::hash::Hasher;

/// Deterministic bag-of-words embedding provider.
#[derive(Debug, Clone)]
pub struct HashingProvider {
    dimension: usize,
    normalize: bool,
}

impl Default for HashingProvider {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSION)
    }
}

impl HashingProvider {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            normalize: true,
        }
    }

    pub fn with_normalize(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }

    fn embed_one(&self, text: &str) -> Vec<f16> {
        let mut buckets = vec![0f32; self.dimension];

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let mut hasher = FnvHasher::default();
            hasher.write(token.to_lowercase().as_bytes());
            let hash = hasher.finish();

            let bucket = (hash % self.dimension as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            buckets[bucket] += sign;
        }

        let mut vector: Vec<f16> = buckets.into_iter().map(f16::from_f32).collect();
        if self.normalize {
            normalize_in_place(&mut vector);
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashingProvider {
    async fn embed_text(&self, text: &str) -> Result<Vec<f16>> {
        if self.dimension == 0 {
            return Err(EmbedError::invalid_config("dimension must be at least 1"));
        }
        Ok(self.embed_one(text))
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult> {
        if self.dimension == 0 {
            return Err(EmbedError::invalid_config("dimension must be at least 1"));
        }
        Ok(EmbeddingResult::new(
            texts.iter().map(|t| self.embed_one(t)).collect(),
        ))
    }

    fn embedding_dimension(&self) -> usize {
        self.dimension
    }

    fn provider_name(&self) -> &str {
        "hashing"
    }
}
