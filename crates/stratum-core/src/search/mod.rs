//! Search Module
//!
//! Provides the hybrid retrieval pipeline:
//! - FTS5 query sanitization and BM25 score normalization
//! - Dense-vector cosine similarity
//! - The staged retriever with graph expansion and optional reranking

pub mod keyword;
mod retriever;
pub mod vector;

pub use keyword::{bm25_rank_to_score, sanitize_fts5_query, STOP_WORDS};
pub use retriever::{
    combine_scores, DebugResult, Retriever, SearchDebug, SearchResult, StageTiming,
};
pub use vector::{cosine_similarity, embedding_from_bytes, embedding_to_bytes};
