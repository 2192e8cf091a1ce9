//! Structured records - Features, Decisions, and Patterns
//!
//! Narrower than knowledge nodes: a Decision belongs to exactly one
//! Feature, and the Feature dependency graph must stay acyclic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// FEATURE
// ============================================================================

/// A named feature of the project. Names are unique case-insensitively.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feature {
    /// Unique identifier
    pub id: String,
    /// Human-readable name, unique case-insensitively
    pub name: String,
    /// One-line description
    pub description: String,
    /// When the feature was first recorded
    pub created_at: DateTime<Utc>,
}

impl Feature {
    /// Create a new feature
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            description: description.into(),
            created_at: Utc::now(),
        }
    }
}

// ============================================================================
// DECISION
// ============================================================================

/// A recorded decision under one feature
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    /// Unique identifier
    pub id: String,
    /// The feature this decision belongs to
    pub feature_id: String,
    /// Short title
    pub title: String,
    /// One-line summary
    pub summary: String,
    /// Rationale
    #[serde(skip_serializing_if = "Option::is_none")]
    pub why: Option<String>,
    /// Known trade-offs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tradeoffs: Option<String>,
    /// When the decision was made
    pub decided_at: DateTime<Utc>,
}

impl Decision {
    /// Create a new decision under a feature
    pub fn new(
        feature_id: impl Into<String>,
        title: impl Into<String>,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            feature_id: feature_id.into(),
            title: title.into(),
            summary: summary.into(),
            why: None,
            tradeoffs: None,
            decided_at: Utc::now(),
        }
    }
}

// ============================================================================
// PATTERN
// ============================================================================

/// A recurring implementation pattern with its context and consequences
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pattern {
    /// Unique identifier
    pub id: String,
    /// Pattern name, unique case-insensitively
    pub name: String,
    /// Where the pattern applies
    pub context: String,
    /// What the pattern does
    pub solution: String,
    /// What accepting the pattern costs
    pub consequences: String,
    /// When the pattern was first recorded
    pub created_at: DateTime<Utc>,
}

impl Pattern {
    /// Create a new pattern
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            context: String::new(),
            solution: String::new(),
            consequences: String::new(),
            created_at: Utc::now(),
        }
    }
}

// ============================================================================
// FEATURE INDEX
// ============================================================================

/// One feature's entry in the derived index
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureSummary {
    /// Feature id
    pub id: String,
    /// Feature name
    pub name: String,
    /// One-line description
    pub description: String,
    /// Number of decisions recorded under the feature
    pub decision_count: usize,
}

/// Derived, cached summary of all features.
///
/// Rebuilt on any mutating feature or decision operation and persisted
/// to `index.json`. Never authoritative.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureIndex {
    /// When the index was generated
    pub generated_at: DateTime<Utc>,
    /// All features, sorted by name
    pub features: Vec<FeatureSummary>,
}

impl FeatureIndex {
    /// Build an index from features and their decision counts
    pub fn build(mut entries: Vec<FeatureSummary>) -> Self {
        entries.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        Self {
            generated_at: Utc::now(),
            features: entries,
        }
    }

    /// Total number of features
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Whether the index is empty
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

// ============================================================================
// TESTS
// ============================================================================
