//! Hybrid retrieval pipeline
//!
//! Stages, executed sequentially and individually timed:
//! exact-id match, keyword (BM25/FTS5), vector similarity, merge and
//! threshold, graph expansion, reserved-slot allocation, optional
//! rerank with timeout fallback. FTS and embedding failures degrade to
//! the remaining stages; only storage errors and cancellation abort.

use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::knowledge::{KnowledgeNode, WorkspaceFilter};
use crate::providers::{CancellationToken, Embedder, ProviderError, RerankProvider};
use crate::repository::Repository;
use crate::search::keyword::{bm25_rank_to_score, sanitize_fts5_query};
use crate::search::vector::cosine_similarity;

/// Seeds considered for graph expansion
const MAX_EXPANSION_SEEDS: usize = 5;

/// Query-embedding LRU capacity
const QUERY_CACHE_CAPACITY: usize = 100;

// ============================================================================
// RESULT TYPES
// ============================================================================

/// One search hit
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    /// The matched node
    pub node: KnowledgeNode,
    /// Final score after all stages
    pub score: f32,
    /// When set, the node entered via graph expansion from this parent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expanded_from: Option<String>,
    /// Whether the exact-id stage produced this hit
    pub is_exact_match: bool,
}

/// Per-stage elapsed time
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageTiming {
    /// Stage name as it appears in the pipeline list
    pub stage: String,
    /// Elapsed wall-clock milliseconds
    pub elapsed_ms: f64,
}

/// Per-result score breakdown for `search_debug`
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugResult {
    /// Node id
    pub id: String,
    /// Node summary
    pub summary: String,
    /// Normalized FTS contribution before weighting
    pub fts: f32,
    /// Cosine similarity before weighting
    pub vector: f32,
    /// Combined score after merge (or expansion discount)
    pub combined: f32,
    /// Reranker score, when the rerank stage replaced scores
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rerank: Option<f32>,
}

/// Full pipeline instrumentation
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchDebug {
    /// The raw query
    pub query: String,
    /// The sanitized FTS query actually executed
    pub rewritten_query: String,
    /// Ordered names of the stages that ran
    pub pipeline: Vec<String>,
    /// Per-stage timings
    pub timings_ms: Vec<StageTiming>,
    /// Candidate count after the scoring stages, before thresholds
    pub candidates: usize,
    /// Final ranking with score breakdowns
    pub results: Vec<DebugResult>,
}

/// Weighted linear combination of the normalized FTS score and the
/// cosine similarity
pub fn combine_scores(fts_score: f32, vector_score: f32, config: &EngineConfig) -> f32 {
    fts_score * config.fts_weight + vector_score * config.vector_weight
}

// ============================================================================
// INTERNAL CANDIDATE BOOKKEEPING
// ============================================================================

#[derive(Debug, Clone)]
struct Candidate {
    node: KnowledgeNode,
    fts: f32,
    vector: f32,
    combined: f32,
    rerank: Option<f32>,
    expanded_from: Option<String>,
    is_exact: bool,
}

impl Candidate {
    fn score(&self) -> f32 {
        self.rerank.unwrap_or(self.combined)
    }
}

fn sort_desc(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| {
        b.score()
            .partial_cmp(&a.score())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

// ============================================================================
// RETRIEVER
// ============================================================================

/// The hybrid search pipeline
pub struct Retriever {
    repo: Arc<Repository>,
    embedder: Option<Arc<dyn Embedder>>,
    reranker: Option<Arc<dyn RerankProvider>>,
    config: Arc<EngineConfig>,
    query_cache: Mutex<LruCache<String, Vec<f32>>>,
}

impl Retriever {
    /// Wire up the pipeline
    pub fn new(
        repo: Arc<Repository>,
        embedder: Option<Arc<dyn Embedder>>,
        reranker: Option<Arc<dyn RerankProvider>>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            repo,
            embedder,
            reranker,
            config,
            query_cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(QUERY_CACHE_CAPACITY).expect("capacity is non-zero"),
            )),
        }
    }

    /// Run the pipeline and return the final ranking
    pub async fn search(
        &self,
        query: &str,
        limit: usize,
        filter: &WorkspaceFilter,
        cancel: &CancellationToken,
    ) -> Result<Vec<SearchResult>> {
        let (results, _debug) = self.run_pipeline(query, limit, filter, cancel).await?;
        Ok(results)
    }

    /// Run the pipeline and return the ranking plus instrumentation
    pub async fn search_debug(
        &self,
        query: &str,
        limit: usize,
        cancel: &CancellationToken,
    ) -> Result<SearchDebug> {
        let (_results, debug) = self
            .run_pipeline(query, limit, &WorkspaceFilter::default(), cancel)
            .await?;
        Ok(debug)
    }

    async fn run_pipeline(
        &self,
        query: &str,
        limit: usize,
        filter: &WorkspaceFilter,
        cancel: &CancellationToken,
    ) -> Result<(Vec<SearchResult>, SearchDebug)> {
        let store = self.repo.store();
        let mut candidates: HashMap<String, Candidate> = HashMap::new();
        let mut pipeline: Vec<String> = Vec::new();
        let mut timings: Vec<StageTiming> = Vec::new();
        let query = query.trim();

        let record = |pipeline: &mut Vec<String>,
                          timings: &mut Vec<StageTiming>,
                          stage: &str,
                          started: Instant| {
            pipeline.push(stage.to_string());
            timings.push(StageTiming {
                stage: stage.to_string(),
                elapsed_ms: started.elapsed().as_secs_f64() * 1000.0,
            });
        };

        // Stage 1: exact id match. Ids are globally unique, so the
        // workspace filter does not apply here.
        let started = Instant::now();
        if let Some(node) = store.get_node(query)? {
            candidates.insert(
                node.id.clone(),
                Candidate {
                    node,
                    fts: 0.0,
                    vector: 0.0,
                    combined: 1.0,
                    rerank: None,
                    expanded_from: None,
                    is_exact: true,
                },
            );
        }
        record(&mut pipeline, &mut timings, "ExactMatch", started);
        cancel.check().map_err(EngineError::Provider)?;

        // Stage 2: keyword (BM25). FTS unavailability degrades the
        // request to the remaining stages.
        let started = Instant::now();
        match store.search_fts_filtered(query, limit * 2, filter) {
            Ok(hits) => {
                for (id, rank) in hits {
                    let fts = bm25_rank_to_score(rank);
                    if let Some(existing) = candidates.get_mut(&id) {
                        existing.fts = fts;
                        continue;
                    }
                    if let Some(node) = store.get_node(&id)? {
                        candidates.insert(
                            id,
                            Candidate {
                                node,
                                fts,
                                vector: 0.0,
                                combined: 0.0,
                                rerank: None,
                                expanded_from: None,
                                is_exact: false,
                            },
                        );
                    }
                }
                record(&mut pipeline, &mut timings, "FTS", started);
            }
            Err(e) => {
                tracing::warn!("FTS stage unavailable, degrading to vector-only: {e}");
            }
        }
        cancel.check().map_err(EngineError::Provider)?;

        // Stage 3: vector similarity over one embedding scan
        let started = Instant::now();
        if let Some(query_embedding) = self.embed_query(query).await? {
            for node in store.list_nodes_with_embeddings_filtered(filter)? {
                let Some(embedding) = node.embedding.as_deref() else {
                    continue;
                };
                let similarity = cosine_similarity(&query_embedding, embedding);
                if similarity < self.config.vector_score_threshold {
                    continue;
                }
                if let Some(existing) = candidates.get_mut(&node.id) {
                    existing.vector = similarity;
                } else {
                    candidates.insert(
                        node.id.clone(),
                        Candidate {
                            node,
                            fts: 0.0,
                            vector: similarity,
                            combined: 0.0,
                            rerank: None,
                            expanded_from: None,
                            is_exact: false,
                        },
                    );
                }
            }
            record(&mut pipeline, &mut timings, "Vector", started);
        }
        cancel.check().map_err(EngineError::Provider)?;

        let candidate_count = candidates.len();

        // Stage 4: combine, threshold, sort
        let started = Instant::now();
        let mut merged: Vec<Candidate> = candidates
            .into_values()
            .map(|mut c| {
                if !c.is_exact {
                    c.combined = combine_scores(c.fts, c.vector, &self.config);
                }
                c
            })
            .filter(|c| c.is_exact || c.combined >= self.config.min_result_score_threshold)
            .collect();
        sort_desc(&mut merged);
        record(&mut pipeline, &mut timings, "Merge", started);

        // Stage 5: graph expansion from the top seeds
        if self.config.graph_expansion.enabled {
            let started = Instant::now();
            self.expand_graph(&mut merged, filter)?;
            sort_desc(&mut merged);
            record(&mut pipeline, &mut timings, "GraphExpansion", started);
        }
        cancel.check().map_err(EngineError::Provider)?;

        // Stage 6: reserved-slot allocation
        let started = Instant::now();
        let mut selected = allocate_slots(
            merged,
            limit,
            self.config.graph_expansion.reserved_slots,
        );
        record(&mut pipeline, &mut timings, "ReservedSlots", started);

        // Stage 7: optional rerank within a dedicated timeout
        if self.config.rerank.enabled && !selected.is_empty() {
            if let Some(reranker) = &self.reranker {
                let started = Instant::now();
                self.rerank_stage(reranker, query, &mut selected).await;
                sort_desc(&mut selected);
                record(&mut pipeline, &mut timings, "Rerank", started);
            }
        }

        let results: Vec<SearchResult> = selected
            .iter()
            .map(|c| SearchResult {
                node: c.node.clone(),
                score: c.score(),
                expanded_from: c.expanded_from.clone(),
                is_exact_match: c.is_exact,
            })
            .collect();

        let debug = SearchDebug {
            query: query.to_string(),
            rewritten_query: sanitize_fts5_query(query),
            pipeline,
            timings_ms: timings,
            candidates: candidate_count,
            results: selected
                .into_iter()
                .map(|c| DebugResult {
                    id: c.node.id,
                    summary: c.node.summary,
                    fts: c.fts,
                    vector: c.vector,
                    combined: c.combined,
                    rerank: c.rerank,
                })
                .collect(),
        };

        Ok((results, debug))
    }

    /// Embed the query through the LRU cache. Transient embedder failure
    /// skips the vector stage; cancellation aborts the request.
    async fn embed_query(&self, query: &str) -> Result<Option<Vec<f32>>> {
        let Some(embedder) = &self.embedder else {
            return Ok(None);
        };

        if let Ok(mut cache) = self.query_cache.lock() {
            if let Some(hit) = cache.get(query) {
                return Ok(Some(hit.clone()));
            }
        }

        match embedder.embed(query).await {
            Ok(embedding) => {
                if let Ok(mut cache) = self.query_cache.lock() {
                    cache.put(query.to_string(), embedding.clone());
                }
                Ok(Some(embedding))
            }
            Err(ProviderError::Cancelled) => Err(ProviderError::Cancelled.into()),
            Err(e) => {
                tracing::warn!("query embedding failed, skipping vector stage: {e}");
                Ok(None)
            }
        }
    }

    /// Pull edge-neighbours of the top seeds into the candidate set with
    /// discounted scores. Bounded depth, visited set, no duplicates.
    fn expand_graph(
        &self,
        merged: &mut Vec<Candidate>,
        filter: &WorkspaceFilter,
    ) -> Result<()> {
        let expansion = &self.config.graph_expansion;
        let store = self.repo.store();

        let mut frontier: Vec<(String, f32)> = merged
            .iter()
            .take(MAX_EXPANSION_SEEDS)
            .map(|c| (c.node.id.clone(), c.score()))
            .collect();
        let mut present: std::collections::HashSet<String> =
            merged.iter().map(|c| c.node.id.clone()).collect();

        for _depth in 0..expansion.max_depth {
            let mut next_frontier: Vec<(String, f32)> = Vec::new();
            for (parent_id, parent_score) in &frontier {
                for edge in store.get_node_edges(parent_id)? {
                    if edge.confidence < expansion.min_edge_confidence {
                        continue;
                    }
                    let Some(neighbor_id) = edge.other_endpoint(parent_id) else {
                        continue;
                    };
                    if present.contains(neighbor_id) {
                        continue;
                    }
                    let derived = parent_score * edge.confidence * expansion.discount;
                    if derived < self.config.min_result_score_threshold {
                        continue;
                    }
                    let Some(node) = store.get_node(neighbor_id)? else {
                        continue;
                    };
                    if !filter.matches(&node) {
                        continue;
                    }
                    present.insert(node.id.clone());
                    next_frontier.push((node.id.clone(), derived));
                    merged.push(Candidate {
                        node,
                        fts: 0.0,
                        vector: 0.0,
                        combined: derived,
                        rerank: None,
                        expanded_from: Some(parent_id.clone()),
                        is_exact: false,
                    });
                }
            }
            if next_frontier.is_empty() {
                break;
            }
            frontier = next_frontier;
        }
        Ok(())
    }

    /// Replace scores with reranker scores within the dedicated timeout.
    /// Any failure leaves the prior ranking intact.
    async fn rerank_stage(
        &self,
        reranker: &Arc<dyn RerankProvider>,
        query: &str,
        selected: &mut [Candidate],
    ) {
        let documents: Vec<String> = selected
            .iter()
            .map(|c| format!("{}\n{}", c.node.summary, c.node.content))
            .collect();

        let outcome =
            tokio::time::timeout(self.config.rerank.timeout, reranker.rerank(query, &documents))
                .await;

        match outcome {
            Ok(Ok(ranked)) => {
                for doc in ranked {
                    // Indices are validated again here before use
                    if let Some(candidate) = selected.get_mut(doc.index) {
                        candidate.rerank = Some(doc.score);
                    }
                }
            }
            Ok(Err(e)) => {
                tracing::warn!("rerank failed, keeping prior ranking: {e}");
            }
            Err(_) => {
                tracing::warn!(
                    "rerank timed out after {:?}, keeping prior ranking",
                    self.config.rerank.timeout
                );
            }
        }
    }
}

/// Reserve slots of the final limit for expanded results (capped by
/// availability), fill the remainder with top primaries, re-sort.
fn allocate_slots(candidates: Vec<Candidate>, limit: usize, reserved: usize) -> Vec<Candidate> {
    let (expanded, primary): (Vec<Candidate>, Vec<Candidate>) = candidates
        .into_iter()
        .partition(|c| c.expanded_from.is_some());

    let reserved = reserved.min(expanded.len()).min(limit);
    let primary_quota = limit - reserved;

    let mut selected: Vec<Candidate> = Vec::with_capacity(limit);
    let mut primary_iter = primary.into_iter();
    let mut expanded_iter = expanded.into_iter();

    selected.extend(primary_iter.by_ref().take(primary_quota));
    selected.extend(expanded_iter.by_ref().take(reserved));

    // Backfill from the other partition when one ran short
    if selected.len() < limit {
        let shortfall = limit - selected.len();
        selected.extend(primary_iter.take(shortfall));
    }
    if selected.len() < limit {
        let shortfall = limit - selected.len();
        selected.extend(expanded_iter.take(shortfall));
    }

    sort_desc(&mut selected);
    selected
}

// ============================================================================
// TESTS
// ============================================================================
