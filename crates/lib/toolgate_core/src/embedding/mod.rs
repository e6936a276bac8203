// @awa-component: EMB-EmbeddingAPI
//
//! Embedding collaborator — text + model name → dense vector.
//!
//! The provider is chosen from a static model-name table (see
//! [`Provider::for_model`]):
//!
//! - OpenAI: `text-embedding-3-small`, `text-embedding-3-large`,
//!   `text-embedding-ada-002`
//! - IBM watsonx: the `slate-*`, `granite-embedding-*`, MiniLM and E5 models
//! - local: any `local-<dimensions>` model (deterministic FNV-1a hash,
//!   offline, no credentials)
//!
//! Requests are made once; there is no retry.

pub mod config;
pub mod local;
pub mod openai;
pub mod watsonx;

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;

pub use config::EmbeddingConfig;

/// Errors that can occur while generating an embedding.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("Unsupported embedding model: {0}")]
    UnsupportedModel(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Provider error: {0}")]
    Provider(String),
}

/// Generates embedding vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn generate_embedding(&self, text: &str, model: &str) -> Result<Vec<f32>, EmbeddingError>;
}

/// Embedding backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenAi,
    Watsonx,
    Local { dimensions: usize },
}

const OPENAI_MODELS: &[&str] = &[
    "text-embedding-3-small",
    "text-embedding-3-large",
    "text-embedding-ada-002",
];

const WATSONX_MODELS: &[&str] = &[
    "all-minilm-l6-v2",
    "granite-embedding-107m-multilingual",
    "granite-embedding-278m-multilingual",
    "ms-marco-minilm-l-12-v2",
    "multilingual-e5-large",
    "slate-30m-english-rtrvr",
    "slate-30m-english-rtrvr-v2",
    "slate-125m-english-rtrvr",
    "slate-125m-english-rtrvr-v2",
];

impl Provider {
    /// Look up the provider serving `model`.
    pub fn for_model(model: &str) -> Option<Self> {
        if OPENAI_MODELS.contains(&model) {
            return Some(Self::OpenAi);
        }
        if WATSONX_MODELS.contains(&model) {
            return Some(Self::Watsonx);
        }
        if model == "local" {
            return Some(Self::Local {
                dimensions: local::DEFAULT_DIMENSIONS,
            });
        }
        model
            .strip_prefix("local-")
            .and_then(|dims| dims.parse::<usize>().ok())
            .filter(|dims| *dims > 0)
            .map(|dimensions| Self::Local { dimensions })
    }
}

/// [`Embedder`] that dispatches on the model-name table.
#[derive(Debug, Clone)]
pub struct ProviderEmbedder {
    client: Client,
    config: EmbeddingConfig,
}

impl ProviderEmbedder {
    pub fn new(config: EmbeddingConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }
}

#[async_trait]
impl Embedder for ProviderEmbedder {
    async fn generate_embedding(&self, text: &str, model: &str) -> Result<Vec<f32>, EmbeddingError> {
        match Provider::for_model(model) {
            Some(Provider::OpenAi) => openai::embed(&self.client, &self.config, text, model).await,
            Some(Provider::Watsonx) => watsonx::embed(&self.client, &self.config, text, model).await,
            Some(Provider::Local { dimensions }) => Ok(local::embed(text, dimensions)),
            None => Err(EmbeddingError::UnsupportedModel(model.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_table_routes_to_providers() {
        assert_eq!(Provider::for_model("text-embedding-3-small"), Some(Provider::OpenAi));
        assert_eq!(Provider::for_model("slate-125m-english-rtrvr-v2"), Some(Provider::Watsonx));
        assert_eq!(
            Provider::for_model("local-8"),
            Some(Provider::Local { dimensions: 8 })
        );
        assert_eq!(
            Provider::for_model("local"),
            Some(Provider::Local { dimensions: local::DEFAULT_DIMENSIONS })
        );
        assert_eq!(Provider::for_model("local-0"), None);
        assert_eq!(Provider::for_model("nomic-embed-text"), None);
    }

    #[tokio::test]
    async fn unknown_model_is_rejected() {
        let embedder = ProviderEmbedder::new(EmbeddingConfig::default());
        let err = embedder.generate_embedding("hi", "mystery").await.unwrap_err();
        assert!(matches!(err, EmbeddingError::UnsupportedModel(m) if m == "mystery"));
    }

    #[tokio::test]
    async fn local_models_need_no_credentials() {
        let embedder = ProviderEmbedder::new(EmbeddingConfig::default());
        let v = embedder.generate_embedding("blue pants", "local-16").await.unwrap();
        assert_eq!(v.len(), 16);
    }

    #[tokio::test]
    async fn openai_without_key_is_a_config_error() {
        let embedder = ProviderEmbedder::new(EmbeddingConfig::default());
        let err = embedder
            .generate_embedding("hi", "text-embedding-3-small")
            .await
            .unwrap_err();
        assert!(matches!(err, EmbeddingError::Config(_)));
    }
}
