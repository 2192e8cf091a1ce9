//! Provider Module
//!
//! Capability contracts for the opaque model providers:
//! - `Embedder` returns dense vectors
//! - `ChatProvider` returns streamed or blocking text
//! - `RerankProvider` reorders a small candidate set
//!
//! The retrieval engine depends only on these traits; the HTTP adapters
//! (TEI embedder, OpenAI-style chat, rerank endpoint) are one
//! implementation each. Every provider failure is a transient error:
//! callers skip the affected stage or degrade, never abort.

mod cancel;
mod chat;
mod rerank;
mod tei;

pub use cancel::CancellationToken;
pub use chat::HttpChatProvider;
pub use rerank::HttpReranker;
pub use tei::TeiEmbedder;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Provider error type. All variants are transient from the engine's
/// point of view: the affected stage is skipped, the request survives.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// HTTP transport failure
    #[error("provider request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The call exceeded its deadline
    #[error("provider timed out after {0:?}")]
    Timeout(Duration),
    /// The surrounding operation was cancelled
    #[error("operation cancelled")]
    Cancelled,
    /// The provider answered with something unparseable
    #[error("unexpected provider response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// Whether the failure should be handled by skipping the stage
    /// rather than failing the surrounding operation. Currently every
    /// provider failure is recoverable this way.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Http(_)
            | ProviderError::Timeout(_)
            | ProviderError::Cancelled
            | ProviderError::InvalidResponse(_) => true,
        }
    }
}

/// Provider result type
pub type Result<T> = std::result::Result<T, ProviderError>;

// ============================================================================
// MESSAGE TYPES
// ============================================================================

/// One chat message in the OpenAI-compatible shape
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// `system`, `user`, or `assistant`
    pub role: String,
    /// Message text
    pub content: String,
}

impl ChatMessage {
    /// A system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    /// A user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// One reranked document reference
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedDoc {
    /// Index into the candidate list handed to `rerank`
    pub index: usize,
    /// Relevance score, higher is better
    pub score: f32,
}

// ============================================================================
// CAPABILITY TRAITS
// ============================================================================

/// Dense-vector embedding capability.
///
/// The returned dimension must be stable for the lifetime of the process.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Chat text generation capability
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Blocking generation: the full answer in one string
    async fn generate(&self, messages: &[ChatMessage]) -> Result<String>;

    /// Streamed generation. The receiver yields text chunks until the
    /// stream is finite and done; it is not restartable.
    async fn stream_chat(&self, messages: &[ChatMessage]) -> Result<mpsc::Receiver<String>>;
}

/// Candidate reordering capability.
///
/// Returned indices refer into `documents` and must be validated by the
/// caller before use.
#[async_trait]
pub trait RerankProvider: Send + Sync {
    /// Score documents against the query, sorted descending by score
    async fn rerank(&self, query: &str, documents: &[String]) -> Result<Vec<RankedDoc>>;
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_provider_errors_transient() {
        assert!(ProviderError::Cancelled.is_transient());
        assert!(ProviderError::Timeout(Duration::from_secs(5)).is_transient());
        assert!(ProviderError::InvalidResponse("bad".into()).is_transient());
    }

    #[test]
    fn test_chat_message_constructors() {
        assert_eq!(ChatMessage::system("x").role, "system");
        assert_eq!(ChatMessage::user("x").role, "user");
    }
}
