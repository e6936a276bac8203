// @zen-component: EMB-WatsonxProvider
//
//! IBM watsonx.ai embedding provider.
//!
//! `IBM_WATSONX_BASE_URL` is the full embeddings endpoint; requests carry the
//! model id, a single input and the project id.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{EmbeddingConfig, EmbeddingError};

#[derive(Serialize)]
struct WatsonxRequest<'a> {
    model_id: &'a str,
    inputs: [&'a str; 1],
    project_id: &'a str,
}

#[derive(Deserialize)]
struct WatsonxResponse {
    results: Vec<WatsonxEmbedding>,
}

#[derive(Deserialize)]
struct WatsonxEmbedding {
    embedding: Vec<f64>,
}

fn required<'a>(value: &'a Option<String>, key: &str) -> Result<&'a str, EmbeddingError> {
    value
        .as_deref()
        .ok_or_else(|| EmbeddingError::Config(format!("{key} is required for watsonx models")))
}

/// Embed a single text via watsonx.
pub async fn embed(
    client: &Client,
    config: &EmbeddingConfig,
    text: &str,
    model: &str,
) -> Result<Vec<f32>, EmbeddingError> {
    let url = required(&config.watsonx_base_url, "IBM_WATSONX_BASE_URL")?;
    let api_key = required(&config.watsonx_api_key, "IBM_WATSONX_API_KEY")?;
    let project_id = required(&config.watsonx_project_id, "IBM_WATSONX_PROJECT_ID")?;

    debug!(model, %url, "requesting watsonx embedding");

    let resp = client
        .post(url)
        .bearer_auth(api_key)
        .json(&WatsonxRequest {
            model_id: model,
            inputs: [text],
            project_id,
        })
        .send()
        .await
        .map_err(|e| EmbeddingError::Provider(format!("watsonx request failed: {e}")))?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp
            .text()
            .await
            .unwrap_or_else(|_| "<no body>".to_string());
        return Err(EmbeddingError::Provider(format!(
            "watsonx embeddings failed: {status} {body}"
        )));
    }

    let data: WatsonxResponse = resp
        .json()
        .await
        .map_err(|e| EmbeddingError::Provider(format!("watsonx response parse error: {e}")))?;

    data.results
        .into_iter()
        .next()
        .map(|r| r.embedding.into_iter().map(|v| v as f32).collect())
        .ok_or_else(|| EmbeddingError::Provider("watsonx returned no results".to_string()))
}
