//! Knowledge module - Core types and data structures
//!
//! Implements the project knowledge model with:
//! - Knowledge nodes derived from agent findings
//! - Typed, weighted edges between nodes
//! - Structured Feature / Decision / Pattern records
//! - Workspace scoping for monorepos

mod edge;
mod node;
mod records;

pub use edge::{EdgeRelation, KnowledgeEdge};
pub use node::{
    Evidence, Finding, KnowledgeNode, NodeType, Relationship, VerificationStatus, WorkspaceFilter,
};
pub use records::{Decision, Feature, FeatureIndex, FeatureSummary, Pattern};
