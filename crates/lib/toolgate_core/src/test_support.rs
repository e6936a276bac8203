//! Shared test doubles.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::embedding::{Embedder, EmbeddingError, local};

/// Serve `router` on an ephemeral local port; returns `http://addr`.
pub async fn spawn_http(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

/// Embedder that records `(text, model)` requests.
pub struct RecordingEmbedder {
    requests: Mutex<Vec<(String, String)>>,
    fail_with: Option<String>,
}

impl RecordingEmbedder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            fail_with: None,
        })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            fail_with: Some(message.to_string()),
        })
    }

    /// Vector returned for `text`.
    pub fn vector_for(text: &str) -> Vec<f32> {
        local::embed(text, 4)
    }

    pub fn requests(&self) -> Vec<(String, String)> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Embedder for RecordingEmbedder {
    async fn generate_embedding(&self, text: &str, model: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.requests
            .lock()
            .unwrap()
            .push((text.to_string(), model.to_string()));
        match &self.fail_with {
            Some(message) => Err(EmbeddingError::Provider(message.clone())),
            None => Ok(Self::vector_for(text)),
        }
    }
}
