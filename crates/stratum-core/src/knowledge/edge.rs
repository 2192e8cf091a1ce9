//! Typed, weighted edges of the knowledge graph
//!
//! Edges are data, not references: flat rows keyed by
//! `(from, to, relation)` with insert-or-ignore semantics, so edge
//! construction is not order-sensitive. Traversal uses an explicit
//! frontier with a visited set and bounded depth.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ============================================================================
// EDGE RELATIONS
// ============================================================================

/// Relation carried by an edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeRelation {
    /// The source requires the target. Acyclic between features.
    DependsOn,
    /// Changing the source affects the target
    Affects,
    /// The source builds on the target
    Extends,
    /// Generic association
    RelatesTo,
    /// Both endpoints cite the same evidence file
    SharesEvidence,
    /// Embedding cosine similarity above the configured threshold
    SemanticallySimilar,
}

impl EdgeRelation {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeRelation::DependsOn => "depends_on",
            EdgeRelation::Affects => "affects",
            EdgeRelation::Extends => "extends",
            EdgeRelation::RelatesTo => "relates_to",
            EdgeRelation::SharesEvidence => "shares_evidence",
            EdgeRelation::SemanticallySimilar => "semantically_similar",
        }
    }

    /// Parse from string name. Unknown relations map to `RelatesTo`.
    pub fn parse_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "depends_on" => EdgeRelation::DependsOn,
            "affects" => EdgeRelation::Affects,
            "extends" => EdgeRelation::Extends,
            "shares_evidence" => EdgeRelation::SharesEvidence,
            "semantically_similar" => EdgeRelation::SemanticallySimilar,
            _ => EdgeRelation::RelatesTo,
        }
    }
}

impl std::fmt::Display for EdgeRelation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// KNOWLEDGE EDGE
// ============================================================================

/// A directed, weighted edge between two node ids
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeEdge {
    /// Source node id
    pub from: String,
    /// Target node id
    pub to: String,
    /// Relation type
    pub relation: EdgeRelation,
    /// Confidence in the relation, 0.0 to 1.0
    pub confidence: f32,
    /// Free-form properties (`shared_file`, `shared_count`, `similarity`,
    /// `llm_extracted`, `reason`)
    #[serde(default)]
    pub properties: Map<String, Value>,
    /// When the edge was created
    pub created_at: DateTime<Utc>,
}

impl KnowledgeEdge {
    /// Create an edge with empty properties
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        relation: EdgeRelation,
        confidence: f32,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            relation,
            confidence: confidence.clamp(0.0, 1.0),
            properties: Map::new(),
            created_at: Utc::now(),
        }
    }

    /// Attach a property, consuming and returning the edge
    pub fn with_property(mut self, key: impl Into<String>, value: Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    /// The endpoint opposite to `id`, if `id` is an endpoint at all
    pub fn other_endpoint<'a>(&'a self, id: &str) -> Option<&'a str> {
        if self.from == id {
            Some(&self.to)
        } else if self.to == id {
            Some(&self.from)
        } else {
            None
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
