// @zen-component: EMB-OpenAIProvider
//
//! OpenAI embedding provider (`POST {base}/embeddings`).

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{EmbeddingConfig, EmbeddingError};

#[derive(Serialize)]
struct OpenAIRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    data: Vec<OpenAIEmbedding>,
}

#[derive(Deserialize)]
struct OpenAIEmbedding {
    embedding: Vec<f64>,
}

/// Embed a single text via the OpenAI embeddings API.
pub async fn embed(
    client: &Client,
    config: &EmbeddingConfig,
    text: &str,
    model: &str,
) -> Result<Vec<f32>, EmbeddingError> {
    let api_key = config.openai_api_key.as_deref().ok_or_else(|| {
        EmbeddingError::Config("OPENAI_API_KEY is required for OpenAI models".to_string())
    })?;

    let url = format!("{}/embeddings", config.openai_base_url);
    debug!(model, %url, "requesting OpenAI embedding");

    let resp = client
        .post(&url)
        .bearer_auth(api_key)
        .json(&OpenAIRequest { model, input: text })
        .send()
        .await
        .map_err(|e| EmbeddingError::Provider(format!("OpenAI request failed: {e}")))?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp
            .text()
            .await
            .unwrap_or_else(|_| "<no body>".to_string());
        return Err(EmbeddingError::Provider(format!(
            "OpenAI embeddings failed: {status} {body}"
        )));
    }

    let data: OpenAIResponse = resp
        .json()
        .await
        .map_err(|e| EmbeddingError::Provider(format!("OpenAI response parse error: {e}")))?;

    data.data
        .into_iter()
        .next()
        .map(|d| d.embedding.into_iter().map(|v| v as f32).collect())
        .ok_or_else(|| EmbeddingError::Provider("OpenAI returned empty data array".to_string()))
}
