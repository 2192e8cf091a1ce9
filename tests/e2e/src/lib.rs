//! Shared harness for the end-to-end scenario tests
//!
//! Engines are built against a temp project directory with deterministic
//! stub providers, so every scenario is hermetic and repeatable.

use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use stratum_core::providers::Result as ProviderResult;
use stratum_core::{
    Embedder, EngineConfig, KnowledgeEngine, RankedDoc, RerankProvider,
};

// ============================================================================
// TEST PROJECT
// ============================================================================

/// A temp project directory holding one engine
pub struct TestProject {
    /// Keeps the directory alive for the test's duration
    pub dir: tempfile::TempDir,
    /// The engine under test
    pub engine: KnowledgeEngine,
}

/// Engine with default config and no providers
pub fn engine() -> TestProject {
    engine_with(EngineConfig::default(), None, None)
}

/// Engine with a custom config and optional stub providers
pub fn engine_with(
    config: EngineConfig,
    embedder: Option<Arc<dyn Embedder>>,
    reranker: Option<Arc<dyn RerankProvider>>,
) -> TestProject {
    let dir = tempfile::tempdir().expect("temp project dir");
    let mut builder = KnowledgeEngine::builder(dir.path()).config(config);
    if let Some(embedder) = embedder {
        builder = builder.embedder(embedder);
    }
    if let Some(reranker) = reranker {
        builder = builder.reranker(reranker);
    }
    let engine = builder.build().expect("engine build");
    TestProject { dir, engine }
}

// ============================================================================
// STUB EMBEDDER
// ============================================================================

/// Deterministic embedder: exact-text overrides first, then a stable
/// token-bucket vector. No network, no model, same output every run.
pub struct StubEmbedder {
    dimension: usize,
    overrides: Mutex<HashMap<String, Vec<f32>>>,
}

impl StubEmbedder {
    /// A stub producing vectors of the given dimension
    pub fn new(dimension: usize) -> Arc<Self> {
        Arc::new(Self {
            dimension,
            overrides: Mutex::new(HashMap::new()),
        })
    }

    /// Pin the exact vector returned for one text
    pub fn set(&self, text: impl Into<String>, vector: Vec<f32>) {
        self.overrides.lock().unwrap().insert(text.into(), vector);
    }

    fn bucket_vector(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for word in text.to_lowercase().split_whitespace() {
            let mut hasher = DefaultHasher::new();
            word.hash(&mut hasher);
            vector[(hasher.finish() as usize) % self.dimension] += 1.0;
        }
        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl Embedder for StubEmbedder {
    async fn embed(&self, text: &str) -> ProviderResult<Vec<f32>> {
        if let Some(vector) = self.overrides.lock().unwrap().get(text) {
            return Ok(vector.clone());
        }
        Ok(self.bucket_vector(text))
    }
}

// ============================================================================
// STUB RERANKERS
// ============================================================================

/// Reranker that sleeps before answering, for timeout-fallback tests
pub struct SleepyReranker {
    delay: Duration,
}

impl SleepyReranker {
    /// A reranker that takes `delay` to respond
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self { delay })
    }
}

#[async_trait]
impl RerankProvider for SleepyReranker {
    async fn rerank(&self, _query: &str, documents: &[String]) -> ProviderResult<Vec<RankedDoc>> {
        tokio::time::sleep(self.delay).await;
        // Reverse the order so a successful call is observable
        Ok(documents
            .iter()
            .enumerate()
            .rev()
            .enumerate()
            .map(|(rank, (index, _))| RankedDoc {
                index,
                score: 1.0 - rank as f32 * 0.01,
            })
            .collect())
    }
}

/// Reranker that promotes the document containing a marker substring
pub struct MarkerReranker {
    marker: String,
}

impl MarkerReranker {
    /// Documents containing `marker` score 0.99, the rest 0.01
    pub fn new(marker: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            marker: marker.into(),
        })
    }
}

#[async_trait]
impl RerankProvider for MarkerReranker {
    async fn rerank(&self, _query: &str, documents: &[String]) -> ProviderResult<Vec<RankedDoc>> {
        let mut ranked: Vec<RankedDoc> = documents
            .iter()
            .enumerate()
            .map(|(index, doc)| RankedDoc {
                index,
                score: if doc.contains(&self.marker) { 0.99 } else { 0.01 },
            })
            .collect();
        ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap());
        Ok(ranked)
    }
}
