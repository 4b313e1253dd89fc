//! Configuration for embedding models

use crate::error::{EmbedError, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Model name of the default sentence-transformer.
pub const DEFAULT_MODEL: &str = "all-MiniLM-L6-v2";

/// Model name selecting the offline [`HashingProvider`](crate::HashingProvider).
pub const HASHING_MODEL: &str = "hashing";

/// Dimension produced by `all-MiniLM-L6-v2`, also used by the hashing provider.
pub const DEFAULT_DIMENSION: usize = 384;

/// Configuration for embedding models
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmbedConfig {
    /// Name of the embedding model to use
    pub model_name: String,
    /// Maximum number of texts handed to the model at once
    pub batch_size: usize,
    /// Whether to L2-normalize embeddings
    pub normalize: bool,
    /// Output dimension; only honoured by providers with a free dimension
    pub dimension: usize,
    /// Where downloaded model files are cached (fastembed default when unset)
    pub cache_dir: Option<PathBuf>,
}

impl EmbedConfig {
    /// Create a configuration for the named model with default settings.
    pub fn new(model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            ..Self::default()
        }
    }

    /// Configuration for the offline feature-hashing provider.
    pub fn hashing(dimension: usize) -> Self {
        Self::new(HASHING_MODEL).with_dimension(dimension)
    }

    /// Set the batch size for embedding generation (builder style)
    pub fn with_batch_size(self, batch_size: usize) -> Self {
        Self { batch_size, ..self }
    }

    /// Set whether to normalize embeddings (builder style)
    pub fn with_normalize(self, normalize: bool) -> Self {
        Self { normalize, ..self }
    }

    /// Set the output dimension (builder style)
    pub fn with_dimension(self, dimension: usize) -> Self {
        Self { dimension, ..self }
    }

    /// Set the model cache directory (builder style)
    pub fn with_cache_dir<P: AsRef<Path>>(self, cache_dir: P) -> Self {
        Self {
            cache_dir: Some(cache_dir.as_ref().to_path_buf()),
            ..self
        }
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Whether this configuration selects the offline hashing provider
    pub fn is_hashing(&self) -> bool {
        self.model_name.eq_ignore_ascii_case(HASHING_MODEL)
    }

    /// Reject settings no provider can work with.
    pub fn validate(&self) -> Result<()> {
        if self.model_name.trim().is_empty() {
            return Err(EmbedError::invalid_config("model name must not be empty"));
        }
        if self.batch_size == 0 {
            return Err(EmbedError::invalid_config("batch size must be at least 1"));
        }
        if self.dimension == 0 {
            return Err(EmbedError::invalid_config("dimension must be at least 1"));
        }
        Ok(())
    }
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self {
            model_name: DEFAULT_MODEL.to_string(),
            batch_size: 16,
            normalize: true,
            dimension: DEFAULT_DIMENSION,
            cache_dir: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = EmbedConfig::default();

        assert_eq!(config.model_name(), "all-MiniLM-L6-v2");
        assert_eq!(config.batch_size, 16);
        assert_eq!(config.dimension, 384);
        assert!(config.normalize);
        assert!(!config.is_hashing());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder_methods() {
        let temp_dir = tempdir().unwrap();
        let config = EmbedConfig::new("bge-small-en-v1.5")
            .with_batch_size(64)
            .with_normalize(false)
            .with_cache_dir(temp_dir.path());

        assert_eq!(config.batch_size, 64);
        assert!(!config.normalize);
        assert_eq!(config.cache_dir.as_deref(), Some(temp_dir.path()));
    }

    #[test]
    fn test_hashing_config() {
        let config = EmbedConfig::hashing(64);
        assert!(config.is_hashing());
        assert_eq!(config.dimension, 64);
        assert!(EmbedConfig::new("HASHING").is_hashing());
    }

    #[test]
    fn test_validation_rejects_degenerate_settings() {
        assert!(EmbedConfig::new("  ").validate().is_err());
        assert!(EmbedConfig::default().with_batch_size(0).validate().is_err());
        assert!(EmbedConfig::hashing(0).validate().is_err());
    }
}
