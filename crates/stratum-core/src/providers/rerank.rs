//! Rerank provider adapter
//!
//! TEI-style rerank endpoint:
//! `POST {base_url}/rerank {"query": "...", "texts": [...]}` returning
//! `[{"index": 0, "score": 0.93}, ...]`. The retriever wraps the call in
//! its own timeout and falls back to the prior ranking on failure.

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

use super::{ProviderError, RankedDoc, RerankProvider, Result};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Serialize)]
struct RerankRequest<'a> {
    query: &'a str,
    texts: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
}

/// HTTP reranker against a TEI-compatible rerank endpoint
pub struct HttpReranker {
    client: reqwest::Client,
    base_url: String,
    model: Option<String>,
}

impl HttpReranker {
    /// Create a reranker for a base URL like `http://localhost:8081`
    pub fn new(base_url: impl Into<String>, model: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model,
        })
    }
}

#[async_trait]
impl RerankProvider for HttpReranker {
    async fn rerank(&self, query: &str, documents: &[String]) -> Result<Vec<RankedDoc>> {
        if documents.is_empty() {
            return Ok(vec![]);
        }
        let request = RerankRequest {
            query,
            texts: documents,
            model: self.model.as_deref(),
        };
        let response = self
            .client
            .post(format!("{}/rerank", self.base_url))
            .json(&request)
            .send()
            .await?
            .error_for_status()?;

        let mut ranked: Vec<RankedDoc> = response.json().await?;
        // Out-of-range indices mean the provider answered for a different
        // candidate set; refuse the whole response.
        if ranked.iter().any(|doc| doc.index >= documents.len()) {
            return Err(ProviderError::InvalidResponse(
                "rerank result index out of range".into(),
            ));
        }
        ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        Ok(ranked)
    }
}
