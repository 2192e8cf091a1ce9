//! Knowledge graph scenarios: feature dependency cycles, delete
//! protection, and search-time graph expansion laws.

use std::collections::HashSet;

use stratum_core::{
    EdgeRelation, EngineConfig, Evidence, Finding, IngestBatch, NodeType, StorageError,
};
use stratum_e2e_tests::{engine, engine_with};

#[tokio::test]
async fn depends_on_cycle_rejected_with_conflict() {
    let project = engine();
    let repo = project.engine.repository();

    let a = repo.create_feature("A", "").unwrap();
    let b = repo.create_feature("B", "").unwrap();
    let c = repo.create_feature("C", "").unwrap();

    repo.link_features(&a.id, &b.id, EdgeRelation::DependsOn, 0.9)
        .unwrap();
    repo.link_features(&b.id, &c.id, EdgeRelation::DependsOn, 0.9)
        .unwrap();

    let result = repo.link_features(&c.id, &a.id, EdgeRelation::DependsOn, 0.9);
    assert!(matches!(result, Err(StorageError::Conflict(_))));
}

#[tokio::test]
async fn feature_with_dependents_cannot_be_deleted() {
    let project = engine();
    let repo = project.engine.repository();

    let base = repo.create_feature("Storage", "").unwrap();
    let dependent = repo.create_feature("Search", "").unwrap();
    repo.link_features(&dependent.id, &base.id, EdgeRelation::DependsOn, 0.9)
        .unwrap();

    assert!(matches!(
        repo.delete_feature(&base.id),
        Err(StorageError::Conflict(_))
    ));
}

#[tokio::test]
async fn graph_expansion_pulls_linked_neighbours() {
    let mut config = EngineConfig::default();
    config.min_result_score_threshold = 0.02;

    let project = engine_with(config, None, None);
    project
        .engine
        .ingest(IngestBatch::findings(vec![
            {
                let mut f = Finding::new(
                    NodeType::Note,
                    "Token validation middleware",
                    "guards every incoming request",
                    "security",
                );
                f.evidence =
                    vec![Evidence::file("src/auth.rs"), Evidence::file("src/middleware.rs")];
                f
            },
            {
                let mut f = Finding::new(
                    NodeType::Note,
                    "Session cleanup job",
                    "expires stale entries nightly",
                    "arch",
                );
                f.evidence =
                    vec![Evidence::file("src/auth.rs"), Evidence::file("src/middleware.rs")];
                f
            },
        ]))
        .await
        .unwrap();

    // Only the first node matches the query; the second arrives through
    // the shared-evidence edge (two files -> confidence 0.9)
    let results = project
        .engine
        .search("token validation middleware", 10, None)
        .await
        .unwrap();

    assert_eq!(results.len(), 2);
    let expanded: Vec<_> = results.iter().filter(|r| r.expanded_from.is_some()).collect();
    assert_eq!(expanded.len(), 1);
    assert!(expanded[0].node.summary.contains("Session cleanup"));

    // Expansion laws: no duplicates, parents present, discounted score
    let ids: HashSet<&str> = results.iter().map(|r| r.node.id.as_str()).collect();
    assert_eq!(ids.len(), results.len());

    let parent_id = expanded[0].expanded_from.as_deref().unwrap();
    let parent = results
        .iter()
        .find(|r| r.node.id == parent_id)
        .expect("expansion parent is part of the result set");
    assert!(expanded[0].score < parent.score);

    let debug = project
        .engine
        .search_debug("token validation middleware", 10)
        .await
        .unwrap();
    assert!(debug.pipeline.iter().any(|stage| stage == "GraphExpansion"));
}

#[tokio::test]
async fn expansion_disabled_returns_only_direct_hits() {
    let mut config = EngineConfig::default();
    config.min_result_score_threshold = 0.02;
    config.graph_expansion.enabled = false;

    let project = engine_with(config, None, None);
    project
        .engine
        .ingest(IngestBatch::findings(vec![
            {
                let mut f = Finding::new(
                    NodeType::Note,
                    "Token validation middleware",
                    "guards every incoming request",
                    "security",
                );
                f.evidence = vec![Evidence::file("a.rs"), Evidence::file("b.rs")];
                f
            },
            {
                let mut f = Finding::new(
                    NodeType::Note,
                    "Session cleanup job",
                    "expires stale entries nightly",
                    "arch",
                );
                f.evidence = vec![Evidence::file("a.rs"), Evidence::file("b.rs")];
                f
            },
        ]))
        .await
        .unwrap();

    let results = project
        .engine
        .search("token validation middleware", 10, None)
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert!(results.iter().all(|r| r.expanded_from.is_none()));
}

#[tokio::test]
async fn low_confidence_edges_not_followed() {
    let mut config = EngineConfig::default();
    config.min_result_score_threshold = 0.02;
    // One shared file yields relates_to_weight (0.7); raise the floor above it
    config.graph_expansion.min_edge_confidence = 0.8;

    let project = engine_with(config, None, None);
    project
        .engine
        .ingest(IngestBatch::findings(vec![
            {
                let mut f = Finding::new(
                    NodeType::Note,
                    "Token validation middleware",
                    "guards every incoming request",
                    "security",
                );
                f.evidence = vec![Evidence::file("a.rs")];
                f
            },
            {
                let mut f = Finding::new(
                    NodeType::Note,
                    "Session cleanup job",
                    "expires stale entries nightly",
                    "arch",
                );
                f.evidence = vec![Evidence::file("a.rs")];
                f
            },
        ]))
        .await
        .unwrap();

    let results = project
        .engine
        .search("token validation middleware", 10, None)
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
}
