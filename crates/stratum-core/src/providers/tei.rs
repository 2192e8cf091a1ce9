//! TEI embedder adapter
//!
//! Talks to a text-embeddings-inference style endpoint:
//! `POST {base_url}/embed {"inputs": "..."} -> [[f32, ...]]`.
//!
//! The first successful call pins the dimension for the process
//! lifetime; a later mismatch is reported as an invalid response.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::{Embedder, ProviderError, Result};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Serialize)]
struct EmbedRequest<'a> {
    inputs: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
}

/// HTTP embedder against a TEI-compatible endpoint
pub struct TeiEmbedder {
    client: reqwest::Client,
    base_url: String,
    model: Option<String>,
    dimension: AtomicUsize,
}

impl TeiEmbedder {
    /// Create an embedder for a base URL like `http://localhost:8080`
    pub fn new(base_url: impl Into<String>, model: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model,
            dimension: AtomicUsize::new(0),
        })
    }

    /// The dimension observed on the first successful call, when known
    pub fn dimension(&self) -> Option<usize> {
        match self.dimension.load(Ordering::Relaxed) {
            0 => None,
            d => Some(d),
        }
    }
}

#[async_trait]
impl Embedder for TeiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let request = EmbedRequest {
            inputs: text,
            model: self.model.as_deref(),
        };
        let response = self
            .client
            .post(format!("{}/embed", self.base_url))
            .json(&request)
            .send()
            .await?
            .error_for_status()?;

        let mut batches: Vec<Vec<f32>> = response.json().await?;
        let vector = match batches.len() {
            1 => batches.remove(0),
            n => {
                return Err(ProviderError::InvalidResponse(format!(
                    "expected one embedding, got {n}"
                )));
            }
        };
        if vector.is_empty() {
            return Err(ProviderError::InvalidResponse("empty embedding".into()));
        }

        // Pin the dimension on first success; the store treats drift as
        // mixed dimensions, so refuse to hand it out at the source.
        let previous = self
            .dimension
            .compare_exchange(0, vector.len(), Ordering::Relaxed, Ordering::Relaxed);
        if let Err(existing) = previous {
            if existing != vector.len() {
                return Err(ProviderError::InvalidResponse(format!(
                    "embedding dimension changed from {existing} to {}",
                    vector.len()
                )));
            }
        }

        Ok(vector)
    }
}
