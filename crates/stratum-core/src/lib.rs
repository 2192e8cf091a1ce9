//! # Stratum Core
//!
//! Local, project-scoped knowledge retrieval engine. Analysis agents
//! submit structured findings; Stratum persists them with evidence and
//! embeddings, links them into a weighted knowledge graph, and answers
//! natural-language queries through a hybrid pipeline:
//!
//! - **Exact id** lookup for `task-` / `plan-` style identifiers
//! - **Keyword**: FTS5/BM25 with sanitized queries
//! - **Vector**: cosine similarity over stored embeddings
//! - **Graph expansion**: edge-neighbours of top seeds at a discount
//! - **Reserved slots**: guaranteed room for expanded context
//! - **Optional rerank**: cross-encoder reordering with timeout fallback
//!
//! Storage is a dual write: an authoritative SQLite row store (FTS5 +
//! embedding blobs) plus a rebuildable human-readable mirror of features
//! and decisions under `features/<slug>.md`.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use stratum_core::{Finding, IngestBatch, KnowledgeEngine, NodeType};
//!
//! let engine = KnowledgeEngine::builder("/path/to/project").build()?;
//!
//! let finding = Finding::new(
//!     NodeType::Decision,
//!     "Use JWT for authentication",
//!     "Stateless tokens keep the API horizontally scalable",
//!     "security-agent",
//! );
//! let report = engine.ingest(IngestBatch::findings(vec![finding])).await?;
//!
//! let results = engine.search("how is authentication handled", 10, None).await?;
//! ```

#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// MODULES
// ============================================================================

pub mod config;
pub mod engine;
pub mod error;
pub mod ingest;
pub mod knowledge;
pub mod mirror;
pub mod providers;
pub mod repository;
pub mod search;
pub mod storage;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

// Knowledge types
pub use knowledge::{
    Decision, EdgeRelation, Evidence, Feature, FeatureIndex, FeatureSummary, Finding,
    KnowledgeEdge, KnowledgeNode, NodeType, Pattern, Relationship, VerificationStatus,
    WorkspaceFilter,
};

// Storage layer
pub use storage::{EmbeddingStats, Store, StorageError, TypeSummary, UpsertOutcome};

// Repository and mirror
pub use mirror::FileMirror;
pub use repository::{IntegrityReport, RepairReport, Repository};

// Providers
pub use providers::{
    CancellationToken, ChatMessage, ChatProvider, Embedder, HttpChatProvider, HttpReranker,
    ProviderError, RankedDoc, RerankProvider, TeiEmbedder,
};

// Ingestion
pub use ingest::{EdgeCounts, EvidenceVerifier, IngestBatch, IngestReport, Ingestor};

// Search
pub use search::{
    cosine_similarity, sanitize_fts5_query, Retriever, SearchDebug, SearchResult, StageTiming,
};

// Configuration and engine surface
pub use config::{EngineConfig, GraphExpansionConfig, RerankConfig, TeiConfig};
pub use engine::{
    AddNodeInput, ConsistencyReport, EngineBuilder, KnowledgeEngine, ProjectSummary,
};
pub use error::EngineError;

// ============================================================================
// VERSION INFO
// ============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// PRELUDE
// ============================================================================

/// Convenient imports for common usage
pub mod prelude {
    pub use crate::{
        AddNodeInput, EngineConfig, EngineError, Evidence, Finding, IngestBatch, IngestReport,
        KnowledgeEngine, KnowledgeNode, NodeType, SearchResult, WorkspaceFilter,
    };
}
