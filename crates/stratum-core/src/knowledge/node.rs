//! Knowledge Node - The fundamental unit of project knowledge
//!
//! Each node represents one finding distilled by an analysis agent:
//! - Summary and free-text content
//! - Evidence (file paths with optional line ranges)
//! - Optional dense embedding for vector search
//! - Workspace label for monorepo scoping

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Maximum length of a node summary. Longer summaries are truncated on ingest.
pub(crate) const MAX_SUMMARY_LEN: usize = 200;

// ============================================================================
// NODE TYPES
// ============================================================================

/// Types of knowledge nodes
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    /// An architectural or technical decision
    Decision,
    /// A product or code feature
    Feature,
    /// A recurring implementation pattern
    Pattern,
    /// A hard constraint the codebase must honor
    Constraint,
    /// A multi-step plan or workflow
    Plan,
    /// A free-form observation
    #[default]
    Note,
    /// Reference documentation
    Documentation,
}

impl NodeType {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Decision => "decision",
            NodeType::Feature => "feature",
            NodeType::Pattern => "pattern",
            NodeType::Constraint => "constraint",
            NodeType::Plan => "plan",
            NodeType::Note => "note",
            NodeType::Documentation => "documentation",
        }
    }

    /// Parse from string name. Unknown values normalize to `Note`.
    pub fn parse_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "decision" => NodeType::Decision,
            "feature" => NodeType::Feature,
            "pattern" => NodeType::Pattern,
            "constraint" => NodeType::Constraint,
            "plan" | "workflow" => NodeType::Plan,
            "note" => NodeType::Note,
            "documentation" | "doc" => NodeType::Documentation,
            _ => NodeType::Note,
        }
    }
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// VERIFICATION STATUS
// ============================================================================

/// Outcome of evidence verification for a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    /// Not yet checked
    #[default]
    Pending,
    /// All evidence paths exist
    Verified,
    /// Some evidence paths exist
    Partial,
    /// No evidence path exists
    Rejected,
}

impl VerificationStatus {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStatus::Pending => "pending",
            VerificationStatus::Verified => "verified",
            VerificationStatus::Partial => "partial",
            VerificationStatus::Rejected => "rejected",
        }
    }

    /// Parse from string name. Unknown values normalize to `Pending`.
    pub fn parse_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "verified" => VerificationStatus::Verified,
            "partial" => VerificationStatus::Partial,
            "rejected" => VerificationStatus::Rejected,
            _ => VerificationStatus::Pending,
        }
    }
}

impl std::fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// EVIDENCE
// ============================================================================

/// One supporting code location for a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evidence {
    /// Path relative to the project root
    pub file_path: String,
    /// First line of the supporting range (1-indexed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_line: Option<u32>,
    /// Last line of the supporting range (inclusive)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_line: Option<u32>,
}

impl Evidence {
    /// Evidence pointing at a whole file
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            file_path: path.into(),
            start_line: None,
            end_line: None,
        }
    }

    /// Evidence pointing at a line range within a file
    pub fn range(path: impl Into<String>, start: u32, end: u32) -> Self {
        Self {
            file_path: path.into(),
            start_line: Some(start),
            end_line: Some(end),
        }
    }
}

// ============================================================================
// KNOWLEDGE NODE
// ============================================================================

/// A knowledge node in the project graph
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeNode {
    /// Unique identifier (UUID v4, or an externally assigned id). Immutable.
    pub id: String,
    /// Type of knowledge
    pub node_type: NodeType,
    /// One-line summary, at most 200 characters
    pub summary: String,
    /// Full content (title, description, and optional Why/Tradeoffs sections)
    pub content: String,
    /// Which analysis agent produced this node
    pub source_agent: String,
    /// Monorepo workspace label. Empty string means "root".
    pub workspace: String,
    /// Supporting code locations
    pub evidence: Vec<Evidence>,
    /// Dense embedding of `content`, when an embedder was available
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    /// Confidence in the finding, 0.0 to 1.0
    pub confidence_score: f32,
    /// Evidence verification outcome
    pub verification: VerificationStatus,
    /// Technical-debt severity, when flagged
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debt_score: Option<f32>,
    /// Why the debt flag was raised
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debt_reason: Option<String>,
    /// Suggested refactor, when one is known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refactor_hint: Option<String>,
    /// When the node was created
    pub created_at: DateTime<Utc>,
    /// When the node was last overwritten by upsert
    pub updated_at: DateTime<Utc>,
}

impl Default for KnowledgeNode {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            id: String::new(),
            node_type: NodeType::Note,
            summary: String::new(),
            content: String::new(),
            source_agent: String::new(),
            workspace: String::new(),
            evidence: vec![],
            embedding: None,
            confidence_score: 0.5,
            verification: VerificationStatus::Pending,
            debt_score: None,
            debt_reason: None,
            refactor_hint: None,
            created_at: now,
            updated_at: now,
        }
    }
}

impl KnowledgeNode {
    /// Create a new node with the given summary and content
    pub fn new(summary: impl Into<String>, content: impl Into<String>) -> Self {
        let mut summary: String = summary.into();
        if summary.chars().count() > MAX_SUMMARY_LEN {
            summary = summary.chars().take(MAX_SUMMARY_LEN).collect();
        }
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            summary,
            content: content.into(),
            ..Default::default()
        }
    }

    /// Whether this node lives in the monorepo root scope
    pub fn is_root_scoped(&self) -> bool {
        self.workspace.is_empty() || self.workspace == "root"
    }
}

// ============================================================================
// FINDINGS (INGEST INPUT)
// ============================================================================

/// An input record emitted by an analysis agent
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    /// Finding type; unknown values normalize to `note`
    #[serde(rename = "type")]
    pub finding_type: NodeType,
    /// Short title
    pub title: String,
    /// Longer description
    pub description: String,
    /// Rationale, folded into content as a `Why:` section
    #[serde(skip_serializing_if = "Option::is_none")]
    pub why: Option<String>,
    /// Known trade-offs, folded into content as a `Tradeoffs:` section
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tradeoffs: Option<String>,
    /// Supporting code locations
    #[serde(default)]
    pub evidence: Vec<Evidence>,
    /// Which agent produced the finding
    pub source_agent: String,
    /// Monorepo workspace label; empty means root
    #[serde(default)]
    pub workspace: String,
    /// Free-form metadata. Recognized keys: `component`, `context`, `solution`,
    /// `consequences`, `workflow`.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// Confidence override, 0.0 to 1.0
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    /// Pre-assigned verification status
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification: Option<VerificationStatus>,
}

impl Finding {
    /// Create a minimal finding
    pub fn new(
        finding_type: NodeType,
        title: impl Into<String>,
        description: impl Into<String>,
        source_agent: impl Into<String>,
    ) -> Self {
        Self {
            finding_type,
            title: title.into(),
            description: description.into(),
            why: None,
            tradeoffs: None,
            evidence: vec![],
            source_agent: source_agent.into(),
            workspace: String::new(),
            metadata: HashMap::new(),
            confidence: None,
            verification: None,
        }
    }

    /// Effective node type, honoring the explicit `workflow` metadata flag
    /// (never inferred from prose).
    pub fn effective_type(&self) -> NodeType {
        if self.metadata.get("workflow").is_some_and(|v| v == "true") {
            NodeType::Plan
        } else {
            self.finding_type
        }
    }
}

/// An LLM-extracted relationship between two findings, resolved by title
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    /// Title of the source finding
    pub from_title: String,
    /// Title of the target finding
    pub to_title: String,
    /// Relation name (`depends_on`, `affects`, `extends`, or anything else
    /// which maps to `relates_to`)
    pub relation: String,
    /// Short rationale emitted by the extractor
    #[serde(default)]
    pub reason: String,
}

// ============================================================================
// WORKSPACE FILTER
// ============================================================================

/// Scoping filter applied to node enumeration in monorepos
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceFilter {
    /// Workspace to match. Empty string disables workspace filtering.
    pub workspace: String,
    /// Optional node-type narrowing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_type: Option<NodeType>,
    /// Whether root-scoped nodes (workspace "" or "root") also pass
    pub include_root: bool,
}

impl WorkspaceFilter {
    /// Filter for one workspace, including root-scoped nodes
    pub fn workspace(name: impl Into<String>) -> Self {
        Self {
            workspace: name.into(),
            node_type: None,
            include_root: true,
        }
    }

    /// Whether this filter passes everything through
    pub fn is_unscoped(&self) -> bool {
        self.workspace.is_empty() && self.node_type.is_none()
    }

    /// Whether a node passes the filter
    pub fn matches(&self, node: &KnowledgeNode) -> bool {
        if let Some(node_type) = self.node_type {
            if node.node_type != node_type {
                return false;
            }
        }
        if self.workspace.is_empty() {
            return true;
        }
        node.workspace == self.workspace || (self.include_root && node.is_root_scoped())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_type_roundtrip() {
        for node_type in [
            NodeType::Decision,
            NodeType::Feature,
            NodeType::Pattern,
            NodeType::Constraint,
            NodeType::Plan,
            NodeType::Note,
            NodeType::Documentation,
        ] {
            assert_eq!(NodeType::parse_name(node_type.as_str()), node_type);
        }
    }

    #[test]
    fn test_unknown_type_normalizes_to_note() {
        assert_eq!(NodeType::parse_name("banana"), NodeType::Note);
        assert_eq!(NodeType::parse_name(""), NodeType::Note);
    }

    #[test]
    fn test_workflow_alias_parses_to_plan() {
        assert_eq!(NodeType::parse_name("workflow"), NodeType::Plan);
    }

    #[test]
    fn test_summary_truncated_to_limit() {
        let long = "x".repeat(500);
        let node = KnowledgeNode::new(long, "content");
        assert_eq!(node.summary.chars().count(), MAX_SUMMARY_LEN);
    }

    #[test]
    fn test_root_scope_equivalence() {
        let mut node = KnowledgeNode::new("s", "c");
        assert!(node.is_root_scoped());
        node.workspace = "root".to_string();
        assert!(node.is_root_scoped());
        node.workspace = "api".to_string();
        assert!(!node.is_root_scoped());
    }

    #[test]
    fn test_workspace_filter_law() {
        let mut node = KnowledgeNode::new("s", "c");
        node.workspace = String::new();

        let mut filter = WorkspaceFilter::workspace("api");
        assert!(filter.matches(&node));

        filter.include_root = false;
        assert!(!filter.matches(&node));

        node.workspace = "api".to_string();
        assert!(filter.matches(&node));

        node.workspace = "web".to_string();
        assert!(!filter.matches(&node));
    }

    #[test]
    fn test_filter_type_narrowing() {
        let mut node = KnowledgeNode::new("s", "c");
        node.node_type = NodeType::Pattern;
        node.workspace = "api".to_string();

        let mut filter = WorkspaceFilter::workspace("api");
        filter.node_type = Some(NodeType::Pattern);
        assert!(filter.matches(&node));

        filter.node_type = Some(NodeType::Decision);
        assert!(!filter.matches(&node));
    }

    #[test]
    fn test_workflow_metadata_promotes_to_plan() {
        let mut finding = Finding::new(NodeType::Note, "Release steps", "steps", "docs");
        assert_eq!(finding.effective_type(), NodeType::Note);
        finding
            .metadata
            .insert("workflow".to_string(), "true".to_string());
        assert_eq!(finding.effective_type(), NodeType::Plan);
    }
}
