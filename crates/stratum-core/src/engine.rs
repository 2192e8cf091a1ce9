//! Knowledge Engine
//!
//! The programmatic surface wiring repository, providers, ingestor, and
//! retriever together. Built once per project via `EngineBuilder`;
//! providers not configured simply disable their stages.

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{EngineConfig, MEMORY_DIR};
use crate::error::{EngineError, Result};
use crate::ingest::{IngestBatch, IngestReport, Ingestor};
use crate::knowledge::{KnowledgeNode, NodeType, WorkspaceFilter};
use crate::providers::{
    CancellationToken, ChatMessage, ChatProvider, Embedder, HttpChatProvider, HttpReranker,
    ProviderError, RerankProvider, TeiEmbedder,
};
use crate::repository::{IntegrityReport, RepairReport, Repository};
use crate::search::{Retriever, SearchDebug, SearchResult};
use crate::storage::TypeSummary;

// ============================================================================
// SURFACE TYPES
// ============================================================================

/// Input for `add_node`
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AddNodeInput {
    /// The knowledge text
    pub content: String,
    /// Summary override; defaults to the first content line
    pub summary: Option<String>,
    /// Explicit type; classified from the content when absent
    pub node_type: Option<NodeType>,
    /// Producing agent; defaults to "manual"
    pub source_agent: Option<String>,
    /// Workspace label; empty means root
    pub workspace: String,
}

/// High-level corpus overview
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSummary {
    /// Summary of the first documentation node, when one exists
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overview: Option<String>,
    /// Total node count
    pub total: usize,
    /// Per-type counts with example summaries
    pub types: Vec<TypeSummary>,
}

/// Outcome of `check_embedding_consistency`
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsistencyReport {
    /// Whether an operator should look at the embedding state
    pub needs_attention: bool,
    /// Human-readable explanation
    pub message: String,
}

// ============================================================================
// BUILDER
// ============================================================================

/// Builder for a [`KnowledgeEngine`]
pub struct EngineBuilder {
    project_root: PathBuf,
    config: EngineConfig,
    embedder: Option<Arc<dyn Embedder>>,
    chat: Option<Arc<dyn ChatProvider>>,
    reranker: Option<Arc<dyn RerankProvider>>,
    verify_evidence: bool,
}

impl EngineBuilder {
    fn new(project_root: PathBuf) -> Self {
        Self {
            project_root,
            config: EngineConfig::default(),
            embedder: None,
            chat: None,
            reranker: None,
            verify_evidence: false,
        }
    }

    /// Replace the default configuration
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Inject an embedder (tests use deterministic stubs here)
    pub fn embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Inject a chat provider
    pub fn chat(mut self, chat: Arc<dyn ChatProvider>) -> Self {
        self.chat = Some(chat);
        self
    }

    /// Inject a reranker
    pub fn reranker(mut self, reranker: Arc<dyn RerankProvider>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    /// Verify finding evidence against the project tree during ingest
    pub fn verify_evidence(mut self, enabled: bool) -> Self {
        self.verify_evidence = enabled;
        self
    }

    /// Open storage and wire the pipelines
    pub fn build(self) -> Result<KnowledgeEngine> {
        self.config.validate().map_err(EngineError::Config)?;

        // Providers fall back to the configured HTTP endpoints
        let embedder = match (self.embedder, &self.config.tei.base_url) {
            (Some(embedder), _) => Some(embedder),
            (None, Some(base_url)) => Some(Arc::new(TeiEmbedder::new(
                base_url.clone(),
                self.config.tei.model.clone(),
            )?) as Arc<dyn Embedder>),
            (None, None) => None,
        };
        let reranker = match (self.reranker, &self.config.rerank.base_url) {
            (Some(reranker), _) => Some(reranker),
            (None, Some(base_url)) => Some(Arc::new(HttpReranker::new(
                base_url.clone(),
                self.config.rerank.model.clone(),
            )?) as Arc<dyn RerankProvider>),
            (None, None) => None,
        };

        let config = Arc::new(self.config);
        let repo = Arc::new(Repository::open(self.project_root.join(MEMORY_DIR))?);
        let verify_base = self.verify_evidence.then(|| self.project_root.clone());

        Ok(KnowledgeEngine {
            retriever: Retriever::new(
                repo.clone(),
                embedder.clone(),
                reranker,
                config.clone(),
            ),
            ingestor: Ingestor::new(repo.clone(), embedder.clone(), config.clone(), verify_base),
            repo,
            config,
            embedder,
            chat: self.chat,
        })
    }
}

// ============================================================================
// ENGINE
// ============================================================================

/// Project-scoped knowledge retrieval engine
pub struct KnowledgeEngine {
    config: Arc<EngineConfig>,
    repo: Arc<Repository>,
    retriever: Retriever,
    ingestor: Ingestor,
    embedder: Option<Arc<dyn Embedder>>,
    chat: Option<Arc<dyn ChatProvider>>,
}

impl KnowledgeEngine {
    /// Start building an engine rooted at a project directory. The store
    /// lives under `<root>/.stratum/memory/`.
    pub fn builder(project_root: impl Into<PathBuf>) -> EngineBuilder {
        EngineBuilder::new(project_root.into())
    }

    /// The active configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The repository (store + mirror + feature index)
    pub fn repository(&self) -> &Arc<Repository> {
        &self.repo
    }

    /// Ingest a batch of findings
    pub async fn ingest(&self, batch: IngestBatch) -> Result<IngestReport> {
        self.ingestor.ingest(batch, &CancellationToken::new()).await
    }

    /// Ingest with a caller-held cancellation token
    pub async fn ingest_with_cancel(
        &self,
        batch: IngestBatch,
        cancel: &CancellationToken,
    ) -> Result<IngestReport> {
        self.ingestor.ingest(batch, cancel).await
    }

    /// Hybrid search
    pub async fn search(
        &self,
        query: &str,
        limit: usize,
        filter: Option<WorkspaceFilter>,
    ) -> Result<Vec<SearchResult>> {
        self.retriever
            .search(
                query,
                limit,
                &filter.unwrap_or_default(),
                &CancellationToken::new(),
            )
            .await
    }

    /// Hybrid search with a caller-held cancellation token
    pub async fn search_with_cancel(
        &self,
        query: &str,
        limit: usize,
        filter: Option<WorkspaceFilter>,
        cancel: &CancellationToken,
    ) -> Result<Vec<SearchResult>> {
        self.retriever
            .search(query, limit, &filter.unwrap_or_default(), cancel)
            .await
    }

    /// Search with full pipeline instrumentation
    pub async fn search_debug(&self, query: &str, limit: usize) -> Result<SearchDebug> {
        self.retriever
            .search_debug(query, limit, &CancellationToken::new())
            .await
    }

    /// Answer a question with retrieved context through the chat provider
    pub async fn ask(&self, query: &str, context_nodes: &[KnowledgeNode]) -> Result<String> {
        let chat = self
            .chat
            .as_ref()
            .ok_or(EngineError::NotConfigured("chat provider"))?;

        let mut context = String::new();
        for (i, node) in context_nodes.iter().enumerate() {
            context.push_str(&format!(
                "[{}] {} ({})\n{}\n\n",
                i + 1,
                node.summary,
                node.node_type,
                node.content
            ));
        }
        let messages = [
            ChatMessage::system(
                "You answer questions about a software project from its recorded \
                 knowledge. Cite context entries by number. Say so when the context \
                 does not contain the answer.",
            ),
            ChatMessage::user(format!("Context:\n\n{context}Question: {query}")),
        ];
        Ok(chat.generate(&messages).await?)
    }

    /// Classify, embed, and store a single node outside the batch pipeline
    pub async fn add_node(&self, input: AddNodeInput) -> Result<KnowledgeNode> {
        let summary = input
            .summary
            .unwrap_or_else(|| input.content.lines().next().unwrap_or_default().to_string());
        let mut node = KnowledgeNode::new(summary, &input.content);
        node.node_type = input
            .node_type
            .unwrap_or_else(|| classify_content(&input.content));
        node.source_agent = input.source_agent.unwrap_or_else(|| "manual".to_string());
        node.workspace = input.workspace;

        if let Some(embedder) = &self.embedder {
            match embedder.embed(&node.content).await {
                Ok(embedding) => node.embedding = Some(embedding),
                Err(ProviderError::Cancelled) => return Err(ProviderError::Cancelled.into()),
                Err(e) => tracing::warn!("embedding failed for added node: {e}"),
            }
        }

        self.repo.store().insert_node(&node)?;
        Ok(node)
    }

    /// Corpus overview: totals, per-type counts, example summaries
    pub fn get_project_summary(&self) -> Result<ProjectSummary> {
        let store = self.repo.store();
        let types = store.type_summaries()?;
        let total = store.count_nodes()?;
        let overview = types
            .iter()
            .find(|t| t.name == NodeType::Documentation.as_str())
            .and_then(|t| t.examples.first().cloned());
        Ok(ProjectSummary {
            overview,
            total,
            types,
        })
    }

    /// Flag missing embeddings and mixed dimensions
    pub fn check_embedding_consistency(&self) -> Result<ConsistencyReport> {
        let stats = self.repo.store().embedding_stats()?;

        if stats.mixed_dimensions {
            return Ok(ConsistencyReport {
                needs_attention: true,
                message: format!(
                    "mixed embedding dimensions across {} embedded nodes; re-embed with a \
                     single model",
                    stats.with_embedding
                ),
            });
        }
        if stats.without_embedding > 0 && stats.total > 0 {
            return Ok(ConsistencyReport {
                needs_attention: true,
                message: format!(
                    "{} of {} nodes missing embeddings",
                    stats.without_embedding, stats.total
                ),
            });
        }
        Ok(ConsistencyReport {
            needs_attention: false,
            message: match stats.dimension {
                Some(dim) => format!("all {} nodes embedded at dimension {dim}", stats.total),
                None => "no nodes stored yet".to_string(),
            },
        })
    }

    /// Integrity check over mirror files, edges, and the feature index
    pub fn check(&self) -> Result<IntegrityReport> {
        Ok(self.repo.check()?)
    }

    /// Repair everything `check` reports
    pub fn repair(&self) -> Result<RepairReport> {
        Ok(self.repo.repair()?)
    }
}

/// Light content classification for nodes added outside the finding
/// pipeline
fn classify_content(content: &str) -> NodeType {
    let lowered = content.to_lowercase();
    if lowered.contains("decided") || lowered.contains("decision") {
        NodeType::Decision
    } else if lowered.contains("constraint") || lowered.contains("must not") {
        NodeType::Constraint
    } else if lowered.contains("pattern") {
        NodeType::Pattern
    } else {
        NodeType::Note
    }
}

/// Build a chat provider from endpoint settings, for callers wiring the
/// engine from configuration files
pub fn chat_provider_from_endpoint(
    base_url: impl Into<String>,
    model: impl Into<String>,
) -> Result<Arc<dyn ChatProvider>> {
    Ok(Arc::new(HttpChatProvider::new(base_url, model)?))
}

// ============================================================================
// TESTS
// ============================================================================
