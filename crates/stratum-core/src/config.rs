//! Engine configuration
//!
//! Every retrieval and linking tunable in one place. Defaults match a
//! mid-size project corpus; `validate()` enforces the invariants the
//! pipeline assumes (weights summing to 1.0, thresholds in range).

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Directory under the project root that holds the memory store
pub const MEMORY_DIR: &str = ".stratum/memory";

// ============================================================================
// GRAPH EXPANSION
// ============================================================================

/// Graph-expansion stage tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GraphExpansionConfig {
    /// Whether the expansion stage runs at all
    pub enabled: bool,
    /// Score discount applied per expansion hop
    pub discount: f32,
    /// Maximum expansion depth from the seed set
    pub max_depth: usize,
    /// Edges below this confidence are not followed
    pub min_edge_confidence: f32,
    /// Result slots reserved for expanded nodes (capped by availability)
    pub reserved_slots: usize,
}

impl Default for GraphExpansionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            discount: 0.8,
            max_depth: 1,
            min_edge_confidence: 0.5,
            reserved_slots: 2,
        }
    }
}

// ============================================================================
// RERANKING
// ============================================================================

/// Optional two-stage reranker tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RerankConfig {
    /// Whether reranking runs when a provider is configured
    pub enabled: bool,
    /// How many candidates to hand to the reranker
    pub top_k: usize,
    /// Model name forwarded to the endpoint
    pub model: Option<String>,
    /// Rerank endpoint base URL
    pub base_url: Option<String>,
    /// Dedicated timeout, independent of the outer request deadline
    #[serde(with = "duration_millis")]
    pub timeout: Duration,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            top_k: 20,
            model: None,
            base_url: None,
            timeout: Duration::from_secs(5),
        }
    }
}

// ============================================================================
// EMBEDDER ENDPOINT
// ============================================================================

/// TEI embedder endpoint settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TeiConfig {
    /// Embedder base URL; None disables the vector stage
    pub base_url: Option<String>,
    /// Model name forwarded to the endpoint
    pub model: Option<String>,
}

// ============================================================================
// ENGINE CONFIG
// ============================================================================

/// Top-level engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Weight of the normalized FTS score in the hybrid combination
    pub fts_weight: f32,
    /// Weight of the cosine similarity in the hybrid combination
    pub vector_weight: f32,
    /// Per-node vector contributions below this are dropped
    pub vector_score_threshold: f32,
    /// Final results below this combined score are dropped
    pub min_result_score_threshold: f32,
    /// Ingest-time floor for semantically_similar edge creation
    pub semantic_similarity_threshold: f32,
    /// Near-duplicate detection floor during ingest
    pub deduplication_threshold: f32,
    /// Confidence assigned to depends_on/affects/extends edges
    pub depends_on_weight: f32,
    /// Confidence assigned to relates_to and weak shared-evidence edges
    pub relates_to_weight: f32,
    /// Graph-expansion tunables
    pub graph_expansion: GraphExpansionConfig,
    /// Reranker tunables
    pub rerank: RerankConfig,
    /// Embedder endpoint
    pub tei: TeiConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fts_weight: 0.4,
            vector_weight: 0.6,
            vector_score_threshold: 0.35,
            min_result_score_threshold: 0.10,
            semantic_similarity_threshold: 0.55,
            deduplication_threshold: 0.92,
            depends_on_weight: 0.9,
            relates_to_weight: 0.7,
            graph_expansion: GraphExpansionConfig::default(),
            rerank: RerankConfig::default(),
            tei: TeiConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Validate the invariants the pipeline assumes
    pub fn validate(&self) -> Result<(), String> {
        if (self.fts_weight + self.vector_weight - 1.0).abs() > 1e-6 {
            return Err(format!(
                "fts_weight + vector_weight must equal 1.0, got {}",
                self.fts_weight + self.vector_weight
            ));
        }
        for (name, value) in [
            ("fts_weight", self.fts_weight),
            ("vector_weight", self.vector_weight),
            ("vector_score_threshold", self.vector_score_threshold),
            ("min_result_score_threshold", self.min_result_score_threshold),
            ("semantic_similarity_threshold", self.semantic_similarity_threshold),
            ("deduplication_threshold", self.deduplication_threshold),
            ("depends_on_weight", self.depends_on_weight),
            ("relates_to_weight", self.relates_to_weight),
            ("graph_expansion.discount", self.graph_expansion.discount),
            (
                "graph_expansion.min_edge_confidence",
                self.graph_expansion.min_edge_confidence,
            ),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(format!("{name} must be in [0, 1], got {value}"));
            }
        }
        Ok(())
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

// ============================================================================
// TESTS
// ============================================================================
