//! Ingest Module
//!
//! Turns agent findings into stored, embedded, linked knowledge:
//! verification, per-agent purge, deduplicated upsert, structured
//! record creation, and edge construction over the current node set.
//! Any single finding may fail without aborting the batch.

mod linker;
mod verify;

pub use linker::{evidence_edges, llm_edges, resolve_title, semantic_edges};
pub use verify::EvidenceVerifier;

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::error::Result;
use crate::knowledge::{Finding, KnowledgeNode, NodeType, Relationship, VerificationStatus};
use crate::providers::{CancellationToken, Embedder, ProviderError};
use crate::repository::Repository;
use crate::search::vector::cosine_similarity;

/// Characters of content used as the in-run deduplication key.
/// LLM-produced summaries vary run to run, so dedup keys off a content
/// prefix rather than surface form.
const DEDUP_KEY_LEN: usize = 200;

// ============================================================================
// BATCH AND REPORT TYPES
// ============================================================================

/// One ingest submission
#[derive(Debug, Clone, Default)]
pub struct IngestBatch {
    /// Ordered findings
    pub findings: Vec<Finding>,
    /// LLM-extracted relationships resolved against node titles
    pub relationships: Vec<Relationship>,
    /// When non-empty, purge only nodes whose evidence cites these files
    pub file_paths: Vec<String>,
    /// Emit per-finding tracing
    pub verbose: bool,
}

impl IngestBatch {
    /// A batch of findings with no relationships or purge scope
    pub fn findings(findings: Vec<Finding>) -> Self {
        Self {
            findings,
            ..Default::default()
        }
    }
}

/// Edge counts by construction class
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeCounts {
    /// shares_evidence edges created
    pub evidence: usize,
    /// semantically_similar edges created
    pub semantic: usize,
    /// LLM-extracted edges created
    pub llm: usize,
}

impl EdgeCounts {
    /// Total edges created this pass
    pub fn total(&self) -> usize {
        self.evidence + self.semantic + self.llm
    }
}

/// What an ingest pass did
#[derive(Debug, Clone, Default, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReport {
    /// Nodes written (inserted or refreshed by upsert)
    pub created: usize,
    /// Findings skipped by deduplication
    pub skipped: usize,
    /// Findings dropped by evidence verification
    pub rejected: usize,
    /// Feature records processed
    pub features: usize,
    /// Decision records processed
    pub decisions: usize,
    /// Pattern records processed
    pub patterns: usize,
    /// Constraint findings counted (stored as nodes only)
    pub constraints: usize,
    /// New edges by class
    pub edges: EdgeCounts,
}

// ============================================================================
// INGESTOR
// ============================================================================

/// The finding ingestion pipeline
pub struct Ingestor {
    repo: Arc<Repository>,
    embedder: Option<Arc<dyn Embedder>>,
    config: Arc<EngineConfig>,
    verify_base: Option<PathBuf>,
}

impl Ingestor {
    /// Wire up the pipeline. `verify_base` enables evidence verification.
    pub fn new(
        repo: Arc<Repository>,
        embedder: Option<Arc<dyn Embedder>>,
        config: Arc<EngineConfig>,
        verify_base: Option<PathBuf>,
    ) -> Self {
        Self {
            repo,
            embedder,
            config,
            verify_base,
        }
    }

    /// Run the full pipeline: verify, purge, ingest nodes, create
    /// structured records, rebuild edges.
    pub async fn ingest(
        &self,
        batch: IngestBatch,
        cancel: &CancellationToken,
    ) -> Result<IngestReport> {
        let mut report = IngestReport::default();

        // Step 1: verification
        let findings = self.verify_findings(batch.findings, &mut report);
        cancel.check().map_err(crate::error::EngineError::Provider)?;

        // Step 2: purge per source agent
        self.purge(&findings, &batch.file_paths)?;
        cancel.check().map_err(crate::error::EngineError::Provider)?;

        // Step 3: node ingest with deduplication and embedding
        let run_nodes = self
            .ingest_nodes(&findings, batch.verbose, cancel, &mut report)
            .await?;

        // Step 4: structured records
        self.create_records(&findings, &mut report);
        cancel.check().map_err(crate::error::EngineError::Provider)?;

        // Step 5: edge construction over the current node set
        self.build_edges(&batch.relationships, &run_nodes, &mut report)?;

        tracing::debug!(
            created = report.created,
            skipped = report.skipped,
            rejected = report.rejected,
            edges = report.edges.total(),
            "ingest pass complete"
        );
        Ok(report)
    }

    /// Step 1: drop rejected findings, stamp the rest
    fn verify_findings(&self, findings: Vec<Finding>, report: &mut IngestReport) -> Vec<Finding> {
        let Some(base) = &self.verify_base else {
            return findings;
        };
        let verifier = EvidenceVerifier::new(base);

        findings
            .into_iter()
            .filter_map(|mut finding| {
                let status = finding
                    .verification
                    .filter(|s| *s != VerificationStatus::Pending)
                    .unwrap_or_else(|| verifier.verify(&finding));
                if status == VerificationStatus::Rejected {
                    tracing::debug!("rejected finding '{}': no evidence exists", finding.title);
                    report.rejected += 1;
                    None
                } else {
                    finding.verification = Some(status);
                    Some(finding)
                }
            })
            .collect()
    }

    /// Step 2: full purge per agent, or scoped to the changed files
    fn purge(&self, findings: &[Finding], file_paths: &[String]) -> Result<()> {
        let store = self.repo.store();
        let agents: HashSet<&str> = findings.iter().map(|f| f.source_agent.as_str()).collect();
        for agent in agents {
            let removed = if file_paths.is_empty() {
                store.delete_nodes_by_agent(agent)?
            } else {
                store.delete_nodes_by_agent_and_files(agent, file_paths)?
            };
            if removed > 0 {
                tracing::debug!("purged {removed} nodes from agent '{agent}'");
            }
        }
        Ok(())
    }

    /// Step 3: build content, dedup, embed, upsert
    async fn ingest_nodes(
        &self,
        findings: &[Finding],
        verbose: bool,
        cancel: &CancellationToken,
        report: &mut IngestReport,
    ) -> Result<Vec<KnowledgeNode>> {
        let store = self.repo.store();
        let mut seen_keys: HashSet<String> = HashSet::new();
        let mut run_embeddings: Vec<Vec<f32>> = Vec::new();
        let mut run_nodes: Vec<KnowledgeNode> = Vec::new();

        for finding in findings {
            cancel.check().map_err(crate::error::EngineError::Provider)?;

            let content = build_content(finding);
            let dedup_key: String = content.chars().take(DEDUP_KEY_LEN).collect();
            if !seen_keys.insert(dedup_key.to_lowercase()) {
                report.skipped += 1;
                continue;
            }

            let mut node = KnowledgeNode::new(&finding.title, &content);
            node.node_type = finding.effective_type();
            node.source_agent = finding.source_agent.clone();
            node.workspace = finding.workspace.clone();
            node.evidence = finding.evidence.clone();
            node.confidence_score = finding.confidence.unwrap_or(0.5).clamp(0.0, 1.0);
            node.verification = finding.verification.unwrap_or_default();

            if let Some(embedder) = &self.embedder {
                match embedder.embed(&content).await {
                    Ok(embedding) => {
                        let near_duplicate = run_embeddings.iter().any(|existing| {
                            cosine_similarity(existing, &embedding)
                                >= self.config.deduplication_threshold
                        });
                        if near_duplicate {
                            report.skipped += 1;
                            continue;
                        }
                        run_embeddings.push(embedding.clone());
                        node.embedding = Some(embedding);
                    }
                    Err(ProviderError::Cancelled) => return Err(ProviderError::Cancelled.into()),
                    Err(e) => {
                        // Embedding failure never fails ingestion
                        tracing::warn!("embedding failed for '{}': {e}", finding.title);
                    }
                }
            }

            match store.upsert_node_by_summary(&node) {
                Ok(outcome) => {
                    node.id = outcome.id().to_string();
                    if verbose {
                        tracing::info!("ingested '{}' as {}", finding.title, node.id);
                    }
                    report.created += 1;
                    run_nodes.push(node);
                }
                Err(e) => {
                    // Finding-level failure: count and continue
                    tracing::warn!("could not store finding '{}': {e}", finding.title);
                    report.skipped += 1;
                }
            }
        }

        Ok(run_nodes)
    }

    /// Step 4: features, patterns, decisions; constraints are counted only
    fn create_records(&self, findings: &[Finding], report: &mut IngestReport) {
        for finding in findings {
            let result = match finding.effective_type() {
                NodeType::Feature => {
                    report.features += 1;
                    self.repo.ensure_feature(&finding.title).map(|_| ())
                }
                NodeType::Pattern => {
                    report.patterns += 1;
                    let mut pattern = crate::knowledge::Pattern::new(&finding.title);
                    pattern.context = finding.metadata.get("context").cloned().unwrap_or_default();
                    pattern.solution =
                        finding.metadata.get("solution").cloned().unwrap_or_default();
                    pattern.consequences = finding
                        .metadata
                        .get("consequences")
                        .cloned()
                        .unwrap_or_default();
                    self.repo.store().insert_pattern(&pattern).map(|_| ())
                }
                NodeType::Decision => {
                    report.decisions += 1;
                    self.record_decision(finding)
                }
                NodeType::Constraint => {
                    report.constraints += 1;
                    Ok(())
                }
                _ => Ok(()),
            };

            if let Err(e) = result {
                tracing::warn!("structured record failed for '{}': {e}", finding.title);
            }
        }
    }

    fn record_decision(&self, finding: &Finding) -> crate::storage::Result<()> {
        let component = finding
            .metadata
            .get("component")
            .cloned()
            .unwrap_or_else(|| component_for_agent(&finding.source_agent).to_string());
        let feature = self.repo.ensure_feature(&component)?;
        self.repo.add_decision(
            &feature.id,
            &finding.title,
            &finding.description,
            finding.why.clone(),
            finding.tradeoffs.clone(),
        )?;
        Ok(())
    }

    /// Step 5: rebuild the three edge classes over the current node set
    fn build_edges(
        &self,
        relationships: &[Relationship],
        run_nodes: &[KnowledgeNode],
        report: &mut IngestReport,
    ) -> Result<()> {
        let store = self.repo.store();
        let all_nodes = store.list_nodes()?;

        for edge in evidence_edges(&all_nodes, &self.config) {
            if store.insert_node_edge(&edge)? {
                report.edges.evidence += 1;
            }
        }

        for edge in semantic_edges(&all_nodes, self.config.semantic_similarity_threshold) {
            if store.insert_node_edge(&edge)? {
                report.edges.semantic += 1;
            }
        }

        if !relationships.is_empty() {
            // Titles resolve against the whole store, preferring this run
            let mut titles: HashMap<String, String> = all_nodes
                .iter()
                .map(|n| (n.summary.to_lowercase(), n.id.clone()))
                .collect();
            for node in run_nodes {
                titles.insert(node.summary.to_lowercase(), node.id.clone());
            }
            for edge in llm_edges(relationships, &titles, &self.config) {
                if store.insert_node_edge(&edge)? {
                    report.edges.llm += 1;
                }
            }
        }

        Ok(())
    }
}

/// Content envelope: title, description, and the optional Why and
/// Tradeoffs sections
pub fn build_content(finding: &Finding) -> String {
    let mut content = format!("{}\n{}", finding.title, finding.description);
    if let Some(why) = &finding.why {
        content.push_str("\n\nWhy: ");
        content.push_str(why);
    }
    if let Some(tradeoffs) = &finding.tradeoffs {
        content.push_str("\nTradeoffs: ");
        content.push_str(tradeoffs);
    }
    content
}

/// Fallback component name when a decision carries no `component` metadata
fn component_for_agent(source_agent: &str) -> &'static str {
    let agent = source_agent.to_lowercase();
    if agent.contains("git") {
        "Project Evolution"
    } else if agent.contains("deps") {
        "Technology Stack"
    } else {
        "Core Architecture"
    }
}

// ============================================================================
// TESTS
// ============================================================================
