// @zen-component: EMB-EmbeddingConfig
//
//! Embedding provider credentials and endpoints.

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Resolved provider settings. Missing credentials only matter once a tool
/// asks that provider for an embedding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddingConfig {
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    /// Full URL of the watsonx embeddings endpoint.
    pub watsonx_base_url: Option<String>,
    pub watsonx_api_key: Option<String>,
    pub watsonx_project_id: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            openai_base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            watsonx_base_url: None,
            watsonx_api_key: None,
            watsonx_project_id: None,
        }
    }
}

impl EmbeddingConfig {
    /// Resolve settings through `lookup` (env-style keys). Empty values count
    /// as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            openai_api_key: get("OPENAI_API_KEY"),
            openai_base_url: get("OPENAI_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
            watsonx_base_url: get("IBM_WATSONX_BASE_URL"),
            watsonx_api_key: get("IBM_WATSONX_API_KEY"),
            watsonx_project_id: get("IBM_WATSONX_PROJECT_ID"),
        }
    }
}
