//! Edge construction
//!
//! Builds the three edge classes over the current node set:
//! - shared-evidence edges between nodes citing the same file
//! - semantic edges between embedding pairs above the similarity floor
//! - LLM-extracted edges, resolved from titles to node ids
//!
//! The pairwise passes are O(N^2), fine for project corpora up to a few
//! thousand nodes. Beyond that, swap in an approximate-nearest-neighbour
//! index and keep the same edge schema and thresholds.

use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::config::EngineConfig;
use crate::knowledge::{EdgeRelation, KnowledgeEdge, KnowledgeNode, Relationship};
use crate::search::keyword::STOP_WORDS;
use crate::search::vector::cosine_similarity;

/// Minimum Jaccard similarity for fuzzy title resolution
const JACCARD_THRESHOLD: f64 = 0.4;

// ============================================================================
// EVIDENCE EDGES
// ============================================================================

/// One `shares_evidence` edge per unordered node pair citing at least
/// one common evidence file. Sharing two or more files promotes the
/// confidence to the depends-on weight.
pub fn evidence_edges(nodes: &[KnowledgeNode], config: &EngineConfig) -> Vec<KnowledgeEdge> {
    let mut file_to_nodes: HashMap<&str, Vec<usize>> = HashMap::new();
    for (i, node) in nodes.iter().enumerate() {
        let mut seen_files: HashSet<&str> = HashSet::new();
        for evidence in &node.evidence {
            if seen_files.insert(&evidence.file_path) {
                file_to_nodes.entry(&evidence.file_path).or_default().push(i);
            }
        }
    }

    // (i, j) -> (one shared file, shared file count)
    let mut pairs: BTreeMap<(usize, usize), (&str, usize)> = BTreeMap::new();
    for (file, indices) in &file_to_nodes {
        for (a, &i) in indices.iter().enumerate() {
            for &j in &indices[a + 1..] {
                let key = (i.min(j), i.max(j));
                let entry = pairs.entry(key).or_insert((*file, 0));
                entry.1 += 1;
            }
        }
    }

    pairs
        .into_iter()
        .map(|((i, j), (shared_file, shared_count))| {
            let confidence = if shared_count >= 2 {
                config.depends_on_weight
            } else {
                config.relates_to_weight
            };
            KnowledgeEdge::new(&nodes[i].id, &nodes[j].id, EdgeRelation::SharesEvidence, confidence)
                .with_property("shared_file", json!(shared_file))
                .with_property("shared_count", json!(shared_count))
        })
        .collect()
}

// ============================================================================
// SEMANTIC EDGES
// ============================================================================

/// One `semantically_similar` edge per embedding pair with matching
/// dimensions and cosine similarity at or above the floor. Pairs from
/// the same source agent may still be linked.
pub fn semantic_edges(nodes: &[KnowledgeNode], threshold: f32) -> Vec<KnowledgeEdge> {
    let embedded: Vec<(&KnowledgeNode, &[f32])> = nodes
        .iter()
        .filter_map(|n| n.embedding.as_deref().map(|e| (n, e)))
        .collect();

    let mut edges = Vec::new();
    for (a, (node_a, emb_a)) in embedded.iter().enumerate() {
        for (node_b, emb_b) in &embedded[a + 1..] {
            if emb_a.len() != emb_b.len() {
                continue;
            }
            let similarity = cosine_similarity(emb_a, emb_b);
            if similarity >= threshold {
                edges.push(
                    KnowledgeEdge::new(
                        &node_a.id,
                        &node_b.id,
                        EdgeRelation::SemanticallySimilar,
                        similarity,
                    )
                    .with_property("similarity", json!(similarity)),
                );
            }
        }
    }
    edges
}

// ============================================================================
// LLM-EXTRACTED EDGES
// ============================================================================

/// Resolve extracted relationships against a lowercased title -> id map
/// and produce weighted edges
pub fn llm_edges(
    relationships: &[Relationship],
    titles: &HashMap<String, String>,
    config: &EngineConfig,
) -> Vec<KnowledgeEdge> {
    let mut edges = Vec::new();
    for rel in relationships {
        let Some(from_id) = resolve_title(&rel.from_title, titles) else {
            tracing::debug!("could not resolve relationship source '{}'", rel.from_title);
            continue;
        };
        let Some(to_id) = resolve_title(&rel.to_title, titles) else {
            tracing::debug!("could not resolve relationship target '{}'", rel.to_title);
            continue;
        };
        if from_id == to_id {
            continue;
        }

        let relation = EdgeRelation::parse_name(&rel.relation);
        let confidence = match relation {
            EdgeRelation::DependsOn | EdgeRelation::Affects | EdgeRelation::Extends => {
                config.depends_on_weight
            }
            _ => config.relates_to_weight,
        };

        edges.push(
            KnowledgeEdge::new(from_id, to_id, relation, confidence)
                .with_property("llm_extracted", Value::Bool(true))
                .with_property("reason", json!(rel.reason)),
        );
    }
    edges
}

/// Resolve a title to a node id: exact lowercase lookup, then substring
/// containment in either direction, then Jaccard word overlap.
pub fn resolve_title(title: &str, titles: &HashMap<String, String>) -> Option<String> {
    let needle = title.to_lowercase();
    if let Some(id) = titles.get(&needle) {
        return Some(id.clone());
    }

    // BTreeMap view keeps fuzzy resolution deterministic across runs
    let ordered: BTreeMap<&String, &String> = titles.iter().collect();

    for (key, id) in &ordered {
        if key.contains(&needle) || needle.contains(key.as_str()) {
            return Some((*id).clone());
        }
    }

    let needle_tokens = tokenize(&needle);
    if needle_tokens.is_empty() {
        return None;
    }
    let mut best: Option<(f64, &String)> = None;
    for (key, id) in &ordered {
        let score = jaccard(&needle_tokens, &tokenize(key));
        if score >= JACCARD_THRESHOLD && best.map(|(s, _)| score > s).unwrap_or(true) {
            best = Some((score, *id));
        }
    }
    best.map(|(_, id)| id.clone())
}

/// Lowercased word tokens with `-`, `_`, `/` treated as whitespace and
/// stop words removed
fn tokenize(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .replace(['-', '_', '/'], " ")
        .split_whitespace()
        .filter(|w| !STOP_WORDS.contains(w))
        .map(str::to_string)
        .collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    intersection as f64 / union as f64
}

// ============================================================================
// TESTS
// ============================================================================
