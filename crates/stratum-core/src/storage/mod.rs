//! Storage Module
//!
//! SQLite-based storage layer with:
//! - FTS5 full-text search with query sanitization
//! - Embedded vector storage (f32 blobs on node rows)
//! - Knowledge graph edges with insert-or-ignore semantics
//! - Structured Feature / Decision / Pattern records

mod migrations;
mod sqlite;

pub use migrations::MIGRATIONS;
pub use sqlite::{
    EmbeddingStats, Result, Store, StorageError, TypeSummary, UpsertOutcome, MEMORY_DB_FILE,
};
