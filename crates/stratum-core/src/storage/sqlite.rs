//! SQLite Storage Implementation
//!
//! Authoritative row store for nodes, edges, and structured records.
//! File projections (the mirror) and the feature index are derived
//! elsewhere; every read path reads this store.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::knowledge::{
    Decision, EdgeRelation, Evidence, Feature, FeatureSummary, KnowledgeEdge, KnowledgeNode,
    NodeType, Pattern, VerificationStatus, WorkspaceFilter,
};
use crate::search::keyword::sanitize_fts5_query;
use crate::search::vector::{embedding_from_bytes, embedding_to_bytes};

/// Database file name under the memory directory
pub const MEMORY_DB_FILE: &str = "memory.db";

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Storage error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    /// Record not found
    #[error("Not found: {0}")]
    NotFound(String),
    /// Uniqueness or graph-shape violation
    #[error("Conflict: {0}")]
    Conflict(String),
    /// Inconsistent derived state detected by check()
    #[error("Corruption: {0}")]
    Corruption(String),
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// JSON (de)serialization error on a stored column
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Initialization error
    #[error("Initialization error: {0}")]
    Init(String),
}

/// Storage result type
pub type Result<T> = std::result::Result<T, StorageError>;

// ============================================================================
// RESULT TYPES
// ============================================================================

/// Outcome of `upsert_node_by_summary`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// A new row was inserted under this id
    Inserted(String),
    /// An existing row (matched on lowercased summary + source agent)
    /// was overwritten; the id is the surviving one
    Updated(String),
}

impl UpsertOutcome {
    /// The id of the row that now holds the node
    pub fn id(&self) -> &str {
        match self {
            UpsertOutcome::Inserted(id) | UpsertOutcome::Updated(id) => id,
        }
    }
}

/// Embedding coverage over the whole store
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddingStats {
    /// Total node count
    pub total: usize,
    /// Nodes carrying an embedding
    pub with_embedding: usize,
    /// Nodes without one
    pub without_embedding: usize,
    /// The dominant dimension, when embeddings exist
    pub dimension: Option<usize>,
    /// True when more than one dimension was observed
    pub mixed_dimensions: bool,
}

/// Per-type summary used by `get_project_summary`
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeSummary {
    /// Node type name
    pub name: String,
    /// How many nodes of this type exist
    pub count: usize,
    /// Up to three example summaries
    pub examples: Vec<String>,
}

// ============================================================================
// STORE
// ============================================================================

const NODE_COLUMNS: &str = "id, node_type, summary, content, source_agent, workspace, evidence, \
     embedding, confidence_score, verification, debt_score, debt_reason, refactor_hint, \
     created_at, updated_at";

/// SQLite-backed store with separate reader/writer connections.
///
/// All methods take `&self`, making the store `Send + Sync` so upper
/// layers can share it behind an `Arc` without an outer mutex.
pub struct Store {
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
    dir: PathBuf,
}

impl Store {
    /// Apply PRAGMAs to a connection
    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -64000;
             PRAGMA temp_store = MEMORY;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        Ok(())
    }

    /// Open (or create) the store under the given memory directory
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(MEMORY_DB_FILE);

        let writer_conn = Connection::open(&path)?;
        Self::configure_connection(&writer_conn)?;
        super::migrations::apply_migrations(&writer_conn)?;

        let reader_conn = Connection::open(&path)?;
        Self::configure_connection(&reader_conn)?;

        Ok(Self {
            writer: Mutex::new(writer_conn),
            reader: Mutex::new(reader_conn),
            dir,
        })
    }

    /// The memory directory this store lives in
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn writer(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.writer
            .lock()
            .map_err(|_| StorageError::Init("Writer lock poisoned".into()))
    }

    fn reader(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.reader
            .lock()
            .map_err(|_| StorageError::Init("Reader lock poisoned".into()))
    }

    // ========================================================================
    // NODES
    // ========================================================================

    /// Convert a row (selected with `NODE_COLUMNS`) to a node
    fn row_to_node(row: &rusqlite::Row) -> rusqlite::Result<KnowledgeNode> {
        let evidence_json: String = row.get(6)?;
        let evidence: Vec<Evidence> = serde_json::from_str(&evidence_json).unwrap_or_default();
        let embedding_blob: Option<Vec<u8>> = row.get(7)?;
        let embedding = embedding_blob.as_deref().and_then(embedding_from_bytes);
        let node_type: String = row.get(1)?;
        let verification: String = row.get(9)?;

        Ok(KnowledgeNode {
            id: row.get(0)?,
            node_type: NodeType::parse_name(&node_type),
            summary: row.get(2)?,
            content: row.get(3)?,
            source_agent: row.get(4)?,
            workspace: row.get(5)?,
            evidence,
            embedding,
            confidence_score: row.get::<_, f64>(8)? as f32,
            verification: VerificationStatus::parse_name(&verification),
            debt_score: row.get::<_, Option<f64>>(10)?.map(|v| v as f32),
            debt_reason: row.get(11)?,
            refactor_hint: row.get(12)?,
            created_at: row.get(13)?,
            updated_at: row.get(14)?,
        })
    }

    /// Insert a node row. Fails on duplicate id.
    pub fn insert_node(&self, node: &KnowledgeNode) -> Result<()> {
        let evidence = serde_json::to_string(&node.evidence)?;
        let embedding = node.embedding.as_deref().map(embedding_to_bytes);
        let writer = self.writer()?;
        writer.execute(
            "INSERT INTO nodes (id, node_type, summary, content, source_agent, workspace, \
             evidence, embedding, confidence_score, verification, debt_score, debt_reason, \
             refactor_hint, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                node.id,
                node.node_type.as_str(),
                node.summary,
                node.content,
                node.source_agent,
                node.workspace,
                evidence,
                embedding,
                node.confidence_score as f64,
                node.verification.as_str(),
                node.debt_score.map(|v| v as f64),
                node.debt_reason,
                node.refactor_hint,
                node.created_at,
                node.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Fetch a node by id
    pub fn get_node(&self, id: &str) -> Result<Option<KnowledgeNode>> {
        let reader = self.reader()?;
        let mut stmt =
            reader.prepare(&format!("SELECT {NODE_COLUMNS} FROM nodes WHERE id = ?1"))?;
        let node = stmt.query_row(params![id], Self::row_to_node).optional()?;
        Ok(node)
    }

    /// Insert, or overwrite the node matching `(lowercased summary, source_agent)`.
    ///
    /// Overwrites content, evidence, embedding, type, workspace, confidence,
    /// verification, and `updated_at`; id and `created_at` survive.
    pub fn upsert_node_by_summary(&self, node: &KnowledgeNode) -> Result<UpsertOutcome> {
        let existing_id: Option<String> = {
            let reader = self.reader()?;
            reader
                .query_row(
                    "SELECT id FROM nodes
                     WHERE summary = ?1 COLLATE NOCASE AND source_agent = ?2",
                    params![node.summary, node.source_agent],
                    |row| row.get(0),
                )
                .optional()?
        };

        match existing_id {
            Some(id) => {
                let evidence = serde_json::to_string(&node.evidence)?;
                let embedding = node.embedding.as_deref().map(embedding_to_bytes);
                let writer = self.writer()?;
                writer.execute(
                    "UPDATE nodes SET node_type = ?1, summary = ?2, content = ?3, \
                     workspace = ?4, evidence = ?5, embedding = ?6, confidence_score = ?7, \
                     verification = ?8, debt_score = ?9, debt_reason = ?10, \
                     refactor_hint = ?11, updated_at = ?12
                     WHERE id = ?13",
                    params![
                        node.node_type.as_str(),
                        node.summary,
                        node.content,
                        node.workspace,
                        evidence,
                        embedding,
                        node.confidence_score as f64,
                        node.verification.as_str(),
                        node.debt_score.map(|v| v as f64),
                        node.debt_reason,
                        node.refactor_hint,
                        Utc::now(),
                        id,
                    ],
                )?;
                Ok(UpsertOutcome::Updated(id))
            }
            None => {
                self.insert_node(node)?;
                Ok(UpsertOutcome::Inserted(node.id.clone()))
            }
        }
    }

    /// Delete a node by id. Edges touching it cascade.
    pub fn delete_node(&self, id: &str) -> Result<bool> {
        let writer = self.writer()?;
        let changed = writer.execute("DELETE FROM nodes WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    /// Delete every node produced by an agent. Returns the count removed.
    pub fn delete_nodes_by_agent(&self, source_agent: &str) -> Result<usize> {
        let writer = self.writer()?;
        let changed = writer.execute(
            "DELETE FROM nodes WHERE source_agent = ?1",
            params![source_agent],
        )?;
        Ok(changed)
    }

    /// Delete an agent's nodes whose evidence references any of the given
    /// file paths (incremental purge). Returns the count removed.
    pub fn delete_nodes_by_agent_and_files(
        &self,
        source_agent: &str,
        file_paths: &[String],
    ) -> Result<usize> {
        if file_paths.is_empty() {
            return Ok(0);
        }
        let path_set: HashSet<&str> = file_paths.iter().map(|s| s.as_str()).collect();

        let doomed: Vec<String> = {
            let reader = self.reader()?;
            let mut stmt =
                reader.prepare("SELECT id, evidence FROM nodes WHERE source_agent = ?1")?;
            let rows = stmt.query_map(params![source_agent], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            let mut doomed = Vec::new();
            for row in rows {
                let (id, evidence_json) = row?;
                let evidence: Vec<Evidence> =
                    serde_json::from_str(&evidence_json).unwrap_or_default();
                if evidence.iter().any(|e| path_set.contains(e.file_path.as_str())) {
                    doomed.push(id);
                }
            }
            doomed
        };

        let mut writer = self.writer()?;
        let tx = writer.transaction()?;
        for id in &doomed {
            tx.execute("DELETE FROM nodes WHERE id = ?1", params![id])?;
        }
        tx.commit()?;
        Ok(doomed.len())
    }

    /// Move a node to a different workspace
    pub fn update_node_workspace(&self, id: &str, workspace: &str) -> Result<()> {
        let writer = self.writer()?;
        let changed = writer.execute(
            "UPDATE nodes SET workspace = ?1, updated_at = ?2 WHERE id = ?3",
            params![workspace, Utc::now(), id],
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound(id.to_string()));
        }
        Ok(())
    }

    /// Replace a node's embedding
    pub fn update_node_embedding(&self, id: &str, embedding: &[f32]) -> Result<()> {
        let writer = self.writer()?;
        let changed = writer.execute(
            "UPDATE nodes SET embedding = ?1, updated_at = ?2 WHERE id = ?3",
            params![embedding_to_bytes(embedding), Utc::now(), id],
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound(id.to_string()));
        }
        Ok(())
    }

    /// All nodes, unfiltered
    pub fn list_nodes(&self) -> Result<Vec<KnowledgeNode>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(&format!(
            "SELECT {NODE_COLUMNS} FROM nodes ORDER BY created_at"
        ))?;
        let nodes = stmt
            .query_map([], Self::row_to_node)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(nodes)
    }

    /// Nodes passing a workspace filter
    pub fn list_nodes_filtered(&self, filter: &WorkspaceFilter) -> Result<Vec<KnowledgeNode>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(&format!(
            "SELECT {NODE_COLUMNS} FROM nodes
             WHERE (?1 = '' OR workspace = ?1 OR (?2 AND workspace IN ('', 'root')))
             AND (?3 = '' OR node_type = ?3)
             ORDER BY created_at"
        ))?;
        let type_name = filter.node_type.map(|t| t.as_str()).unwrap_or("");
        let nodes = stmt
            .query_map(
                params![filter.workspace, filter.include_root, type_name],
                Self::row_to_node,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(nodes)
    }

    /// Every node carrying an embedding, in a single scan
    pub fn list_nodes_with_embeddings(&self) -> Result<Vec<KnowledgeNode>> {
        self.list_nodes_with_embeddings_filtered(&WorkspaceFilter::default())
    }

    /// Embedded nodes passing a workspace filter, in a single scan
    pub fn list_nodes_with_embeddings_filtered(
        &self,
        filter: &WorkspaceFilter,
    ) -> Result<Vec<KnowledgeNode>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(&format!(
            "SELECT {NODE_COLUMNS} FROM nodes
             WHERE embedding IS NOT NULL
             AND (?1 = '' OR workspace = ?1 OR (?2 AND workspace IN ('', 'root')))
             AND (?3 = '' OR node_type = ?3)"
        ))?;
        let type_name = filter.node_type.map(|t| t.as_str()).unwrap_or("");
        let nodes = stmt
            .query_map(
                params![filter.workspace, filter.include_root, type_name],
                Self::row_to_node,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(nodes)
    }

    /// Total node count
    pub fn count_nodes(&self) -> Result<usize> {
        let reader = self.reader()?;
        let count: i64 = reader.query_row("SELECT COUNT(*) FROM nodes", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Per-type counts with up to three example summaries each
    pub fn type_summaries(&self) -> Result<Vec<TypeSummary>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT node_type, COUNT(*) FROM nodes GROUP BY node_type ORDER BY COUNT(*) DESC",
        )?;
        let counts = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut out = Vec::with_capacity(counts.len());
        let mut example_stmt = reader.prepare(
            "SELECT summary FROM nodes WHERE node_type = ?1 ORDER BY created_at LIMIT 3",
        )?;
        for (name, count) in counts {
            let examples = example_stmt
                .query_map(params![name], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            out.push(TypeSummary {
                name,
                count: count as usize,
                examples,
            });
        }
        Ok(out)
    }

    // ========================================================================
    // FULL-TEXT SEARCH
    // ========================================================================

    /// BM25-ranked candidates for a raw query.
    ///
    /// The query is sanitized before reaching FTS5; an all-stop-word query
    /// returns no candidates. The returned rank is the native BM25 value
    /// (negative, more negative = better).
    pub fn search_fts(&self, query: &str, limit: usize) -> Result<Vec<(String, f64)>> {
        self.search_fts_filtered(query, limit, &WorkspaceFilter::default())
    }

    /// BM25-ranked candidates narrowed by a workspace filter
    pub fn search_fts_filtered(
        &self,
        query: &str,
        limit: usize,
        filter: &WorkspaceFilter,
    ) -> Result<Vec<(String, f64)>> {
        let sanitized = sanitize_fts5_query(query);
        if sanitized.is_empty() {
            return Ok(vec![]);
        }

        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT n.id, rank
             FROM nodes n
             JOIN nodes_fts ON n.rowid = nodes_fts.rowid
             WHERE nodes_fts MATCH ?1
             AND (?2 = '' OR n.workspace = ?2 OR (?3 AND n.workspace IN ('', 'root')))
             AND (?4 = '' OR n.node_type = ?4)
             ORDER BY rank
             LIMIT ?5",
        )?;
        let type_name = filter.node_type.map(|t| t.as_str()).unwrap_or("");
        let results = stmt
            .query_map(
                params![
                    sanitized,
                    filter.workspace,
                    filter.include_root,
                    type_name,
                    limit as i64
                ],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?)),
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(results)
    }

    // ========================================================================
    // NODE EDGES
    // ========================================================================

    /// Insert an edge, ignoring duplicates on `(from, to, relation)`.
    /// Returns true when a new row was created.
    pub fn insert_node_edge(&self, edge: &KnowledgeEdge) -> Result<bool> {
        let properties = serde_json::to_string(&edge.properties)?;
        let writer = self.writer()?;
        let changed = writer.execute(
            "INSERT OR IGNORE INTO node_edges \
             (from_id, to_id, relation, confidence, properties, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                edge.from,
                edge.to,
                edge.relation.as_str(),
                edge.confidence as f64,
                properties,
                edge.created_at,
            ],
        )?;
        Ok(changed > 0)
    }

    fn row_to_edge(row: &rusqlite::Row) -> rusqlite::Result<KnowledgeEdge> {
        let relation: String = row.get(2)?;
        let properties_json: String = row.get(4)?;
        Ok(KnowledgeEdge {
            from: row.get(0)?,
            to: row.get(1)?,
            relation: EdgeRelation::parse_name(&relation),
            confidence: row.get::<_, f64>(3)? as f32,
            properties: serde_json::from_str(&properties_json).unwrap_or_default(),
            created_at: row.get(5)?,
        })
    }

    /// Edges where the node is either endpoint
    pub fn get_node_edges(&self, id: &str) -> Result<Vec<KnowledgeEdge>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT from_id, to_id, relation, confidence, properties, created_at
             FROM node_edges WHERE from_id = ?1 OR to_id = ?1
             ORDER BY confidence DESC",
        )?;
        let edges = stmt
            .query_map(params![id], Self::row_to_edge)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(edges)
    }

    /// All node edges
    pub fn list_node_edges(&self) -> Result<Vec<KnowledgeEdge>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT from_id, to_id, relation, confidence, properties, created_at
             FROM node_edges",
        )?;
        let edges = stmt
            .query_map([], Self::row_to_edge)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(edges)
    }

    /// Total node edge count
    pub fn count_node_edges(&self) -> Result<usize> {
        let reader = self.reader()?;
        let count: i64 =
            reader.query_row("SELECT COUNT(*) FROM node_edges", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Count edges whose endpoints no longer resolve to nodes
    pub fn count_orphan_edges(&self) -> Result<usize> {
        let reader = self.reader()?;
        let count: i64 = reader.query_row(
            "SELECT COUNT(*) FROM node_edges e
             WHERE NOT EXISTS (SELECT 1 FROM nodes WHERE id = e.from_id)
             OR NOT EXISTS (SELECT 1 FROM nodes WHERE id = e.to_id)",
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Delete edges whose endpoints no longer resolve. Returns the count removed.
    pub fn delete_orphan_edges(&self) -> Result<usize> {
        let writer = self.writer()?;
        let changed = writer.execute(
            "DELETE FROM node_edges
             WHERE NOT EXISTS (SELECT 1 FROM nodes WHERE id = node_edges.from_id)
             OR NOT EXISTS (SELECT 1 FROM nodes WHERE id = node_edges.to_id)",
            [],
        )?;
        Ok(changed)
    }

    // ========================================================================
    // FEATURES / DECISIONS / PATTERNS
    // ========================================================================

    /// Insert a feature. Duplicate names (case-insensitive) are a Conflict.
    pub fn insert_feature(&self, feature: &Feature) -> Result<()> {
        let writer = self.writer()?;
        let result = writer.execute(
            "INSERT INTO features (id, name, description, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                feature.id,
                feature.name,
                feature.description,
                feature.created_at
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(StorageError::Conflict(format!(
                    "feature '{}' already exists",
                    feature.name
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn row_to_feature(row: &rusqlite::Row) -> rusqlite::Result<Feature> {
        Ok(Feature {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            created_at: row.get(3)?,
        })
    }

    /// Fetch a feature by id
    pub fn get_feature(&self, id: &str) -> Result<Option<Feature>> {
        let reader = self.reader()?;
        let feature = reader
            .query_row(
                "SELECT id, name, description, created_at FROM features WHERE id = ?1",
                params![id],
                Self::row_to_feature,
            )
            .optional()?;
        Ok(feature)
    }

    /// Fetch a feature by name, case-insensitively
    pub fn get_feature_by_name(&self, name: &str) -> Result<Option<Feature>> {
        let reader = self.reader()?;
        let feature = reader
            .query_row(
                "SELECT id, name, description, created_at FROM features \
                 WHERE name = ?1 COLLATE NOCASE",
                params![name],
                Self::row_to_feature,
            )
            .optional()?;
        Ok(feature)
    }

    /// All features
    pub fn list_features(&self) -> Result<Vec<Feature>> {
        let reader = self.reader()?;
        let mut stmt = reader
            .prepare("SELECT id, name, description, created_at FROM features ORDER BY name")?;
        let features = stmt
            .query_map([], Self::row_to_feature)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(features)
    }

    /// Number of features with an incoming `depends_on` edge pointing at this one
    pub fn count_feature_dependents(&self, id: &str) -> Result<usize> {
        let reader = self.reader()?;
        let count: i64 = reader.query_row(
            "SELECT COUNT(*) FROM edges WHERE to_feature = ?1 AND relation = 'depends_on'",
            params![id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Delete a feature. Fails with Conflict when dependents exist.
    /// Decisions under it cascade.
    pub fn delete_feature(&self, id: &str) -> Result<()> {
        if self.count_feature_dependents(id)? > 0 {
            return Err(StorageError::Conflict(format!(
                "feature {id} has dependents and cannot be deleted"
            )));
        }
        let writer = self.writer()?;
        let changed = writer.execute("DELETE FROM features WHERE id = ?1", params![id])?;
        if changed == 0 {
            return Err(StorageError::NotFound(id.to_string()));
        }
        Ok(())
    }

    /// Insert a decision under its feature
    pub fn insert_decision(&self, decision: &Decision) -> Result<()> {
        let writer = self.writer()?;
        writer.execute(
            "INSERT INTO decisions (id, feature_id, title, summary, why, tradeoffs, decided_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                decision.id,
                decision.feature_id,
                decision.title,
                decision.summary,
                decision.why,
                decision.tradeoffs,
                decision.decided_at,
            ],
        )?;
        Ok(())
    }

    /// Update a feature's description
    pub fn update_feature_description(&self, id: &str, description: &str) -> Result<()> {
        let writer = self.writer()?;
        let changed = writer.execute(
            "UPDATE features SET description = ?1 WHERE id = ?2",
            params![description, id],
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound(id.to_string()));
        }
        Ok(())
    }

    /// Delete a decision by id
    pub fn delete_decision(&self, id: &str) -> Result<()> {
        let writer = self.writer()?;
        let changed = writer.execute("DELETE FROM decisions WHERE id = ?1", params![id])?;
        if changed == 0 {
            return Err(StorageError::NotFound(id.to_string()));
        }
        Ok(())
    }

    /// Decisions recorded under one feature, oldest first
    pub fn list_decisions_for_feature(&self, feature_id: &str) -> Result<Vec<Decision>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT id, feature_id, title, summary, why, tradeoffs, decided_at
             FROM decisions WHERE feature_id = ?1 ORDER BY decided_at",
        )?;
        let decisions = stmt
            .query_map(params![feature_id], |row| {
                Ok(Decision {
                    id: row.get(0)?,
                    feature_id: row.get(1)?,
                    title: row.get(2)?,
                    summary: row.get(3)?,
                    why: row.get(4)?,
                    tradeoffs: row.get(5)?,
                    decided_at: row.get(6)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(decisions)
    }

    /// Feature summaries with decision counts, for the derived index
    pub fn feature_summaries(&self) -> Result<Vec<FeatureSummary>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT f.id, f.name, f.description, \
             (SELECT COUNT(*) FROM decisions d WHERE d.feature_id = f.id)
             FROM features f ORDER BY f.name",
        )?;
        let summaries = stmt
            .query_map([], |row| {
                Ok(FeatureSummary {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    description: row.get(2)?,
                    decision_count: row.get::<_, i64>(3)? as usize,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(summaries)
    }

    /// Insert a pattern, ignoring a duplicate name. Returns true when created.
    pub fn insert_pattern(&self, pattern: &Pattern) -> Result<bool> {
        let writer = self.writer()?;
        let changed = writer.execute(
            "INSERT OR IGNORE INTO patterns \
             (id, name, context, solution, consequences, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                pattern.id,
                pattern.name,
                pattern.context,
                pattern.solution,
                pattern.consequences,
                pattern.created_at,
            ],
        )?;
        Ok(changed > 0)
    }

    /// Fetch a pattern by name, case-insensitively
    pub fn get_pattern_by_name(&self, name: &str) -> Result<Option<Pattern>> {
        let reader = self.reader()?;
        let pattern = reader
            .query_row(
                "SELECT id, name, context, solution, consequences, created_at
                 FROM patterns WHERE name = ?1 COLLATE NOCASE",
                params![name],
                |row| {
                    Ok(Pattern {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        context: row.get(2)?,
                        solution: row.get(3)?,
                        consequences: row.get(4)?,
                        created_at: row.get(5)?,
                    })
                },
            )
            .optional()?;
        Ok(pattern)
    }

    /// All patterns, sorted by name
    pub fn list_patterns(&self) -> Result<Vec<Pattern>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT id, name, context, solution, consequences, created_at
             FROM patterns ORDER BY name",
        )?;
        let patterns = stmt
            .query_map([], |row| {
                Ok(Pattern {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    context: row.get(2)?,
                    solution: row.get(3)?,
                    consequences: row.get(4)?,
                    created_at: row.get(5)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(patterns)
    }

    /// Delete a pattern by id
    pub fn delete_pattern(&self, id: &str) -> Result<()> {
        let writer = self.writer()?;
        let changed = writer.execute("DELETE FROM patterns WHERE id = ?1", params![id])?;
        if changed == 0 {
            return Err(StorageError::NotFound(id.to_string()));
        }
        Ok(())
    }

    // ========================================================================
    // FEATURE GRAPH
    // ========================================================================

    /// Link two features. A `depends_on` edge that would close a cycle
    /// fails with Conflict. Returns true when a new edge was created.
    pub fn insert_feature_edge(
        &self,
        from: &str,
        to: &str,
        relation: EdgeRelation,
        confidence: f32,
    ) -> Result<bool> {
        if relation == EdgeRelation::DependsOn && self.depends_on_path_exists(to, from)? {
            return Err(StorageError::Conflict(format!(
                "depends_on edge {from} -> {to} would create a cycle"
            )));
        }

        let writer = self.writer()?;
        let changed = writer.execute(
            "INSERT OR IGNORE INTO edges \
             (from_feature, to_feature, relation, confidence, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![from, to, relation.as_str(), confidence as f64, Utc::now()],
        )?;
        Ok(changed > 0)
    }

    /// Whether a depends_on path exists from `start` to `goal`.
    /// Explicit frontier with a visited set; the graph is small.
    fn depends_on_path_exists(&self, start: &str, goal: &str) -> Result<bool> {
        if start == goal {
            return Ok(true);
        }
        let adjacency: Vec<(String, String)> = {
            let reader = self.reader()?;
            let mut stmt = reader.prepare(
                "SELECT from_feature, to_feature FROM edges WHERE relation = 'depends_on'",
            )?;
            stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<rusqlite::Result<Vec<_>>>()?
        };

        let mut visited: HashSet<&str> = HashSet::new();
        let mut frontier: Vec<&str> = vec![start];
        while let Some(current) = frontier.pop() {
            if current == goal {
                return Ok(true);
            }
            if !visited.insert(current) {
                continue;
            }
            for (from, to) in &adjacency {
                if from == current && !visited.contains(to.as_str()) {
                    frontier.push(to);
                }
            }
        }
        Ok(false)
    }

    // ========================================================================
    // EMBEDDING STATS
    // ========================================================================

    /// Embedding coverage and dimension consistency over the whole store
    pub fn embedding_stats(&self) -> Result<EmbeddingStats> {
        let reader = self.reader()?;
        let total: i64 = reader.query_row("SELECT COUNT(*) FROM nodes", [], |row| row.get(0))?;

        let mut stmt = reader.prepare(
            "SELECT length(embedding) / 4, COUNT(*) FROM nodes
             WHERE embedding IS NOT NULL GROUP BY length(embedding)",
        )?;
        let dims = stmt
            .query_map([], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let with_embedding: i64 = dims.iter().map(|(_, count)| count).sum();
        let dimension = dims
            .iter()
            .max_by_key(|(_, count)| *count)
            .map(|(dim, _)| *dim as usize);

        Ok(EmbeddingStats {
            total: total as usize,
            with_embedding: with_embedding as usize,
            without_embedding: (total - with_embedding) as usize,
            dimension,
            mixed_dimensions: dims.len() > 1,
        })
    }

    /// Timestamp of the most recent mutation to features or decisions,
    /// used for index-staleness checks
    pub fn latest_feature_mutation(&self) -> Result<Option<DateTime<Utc>>> {
        let reader = self.reader()?;
        let latest: Option<String> = reader.query_row(
            "SELECT MAX(t) FROM (
                SELECT MAX(created_at) AS t FROM features
                UNION ALL
                SELECT MAX(decided_at) AS t FROM decisions
            )",
            [],
            |row| row.get(0),
        )?;
        Ok(latest.and_then(|s| s.parse().ok()))
    }
}

// ============================================================================
// TESTS
// ============================================================================
