//! # docsearch-embed
//!
//! Text embeddings for document search. Providers turn chunk text into
//! fixed-dimension `f16` vectors behind the async [`EmbeddingProvider`] trait, so
//! the indexer and retriever never depend on a particular model backend.
//!
//! ## Providers
//!
//! - [`FastEmbedProvider`]: local ONNX sentence-transformers through fastembed
//!   (`all-MiniLM-L6-v2` by default, 384 dimensions). Models are downloaded on first
//!   use and cached process-wide.
//! - [`HashingProvider`]: deterministic feature hashing. No download, useful for
//!   tests and offline runs.
//!
//! [`create_provider`] picks one from an [`EmbedConfig`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use docsearch_embed::{EmbedConfig, create_provider};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let provider = create_provider(EmbedConfig::default()).await?;
//!
//! let texts = vec!["Hello world".to_string(), "How are you?".to_string()];
//! let result = provider.embed_texts(&texts).await?;
//!
//! println!("Generated {} embeddings of dimension {}",
//!          result.len(), result.dimension);
//! # Ok(())
//! # }
//! ```
//!
//! ## Memory Usage
//!
//! Embeddings are half precision and unit length unless normalization is turned
//! off in the configuration.

pub mod config;
pub mod error;
pub mod hashing;
pub mod provider;

// Re-export main types for easy access
pub use config::{DEFAULT_DIMENSION, DEFAULT_MODEL, EmbedConfig, HASHING_MODEL};
pub use error::{EmbedError, Result};
pub use hashing::HashingProvider;
pub use provider::{
    EmbeddingProvider, EmbeddingResult, FastEmbedProvider, create_provider, resolve_model,
};
