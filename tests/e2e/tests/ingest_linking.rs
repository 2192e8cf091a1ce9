//! Ingestion scenarios: deduplication, purge semantics, semantic and
//! LLM edge construction, structured records, and evidence verification.

use stratum_core::{
    EdgeRelation, EngineConfig, Evidence, Finding, IngestBatch, KnowledgeEngine, NodeType,
    Relationship,
};
use stratum_e2e_tests::{engine, engine_with, StubEmbedder};

fn finding(title: &str, description: &str, agent: &str) -> Finding {
    Finding::new(NodeType::Note, title, description, agent)
}

#[tokio::test]
async fn semantic_edge_created_above_threshold() {
    let embedder = StubEmbedder::new(2);
    // Exact cosine 0.8 between the two contents
    embedder.set("Token store\nwhere auth tokens live", vec![1.0, 0.0]);
    embedder.set("Session cache\nwhere sessions live", vec![0.8, 0.6]);

    let mut config = EngineConfig::default();
    config.semantic_similarity_threshold = 0.75;

    let project = engine_with(config, Some(embedder), None);
    let report = project
        .engine
        .ingest(IngestBatch::findings(vec![
            finding("Token store", "where auth tokens live", "security"),
            finding("Session cache", "where sessions live", "arch"),
        ]))
        .await
        .unwrap();

    assert_eq!(report.created, 2);
    assert_eq!(report.edges.semantic, 1);

    let edges = project.engine.repository().store().list_node_edges().unwrap();
    let semantic: Vec<_> = edges
        .iter()
        .filter(|e| e.relation == EdgeRelation::SemanticallySimilar)
        .collect();
    assert_eq!(semantic.len(), 1);
    assert!((semantic[0].confidence - 0.8).abs() < 1e-3);
    assert!(semantic[0].properties.contains_key("similarity"));
}

#[tokio::test]
async fn reingest_identical_batch_is_idempotent() {
    let project = engine();
    let batch = || {
        IngestBatch::findings(vec![
            {
                let mut f = finding("Config loading", "layered config resolution", "arch");
                f.evidence = vec![Evidence::file("src/config.rs"), Evidence::file("src/lib.rs")];
                f
            },
            {
                let mut f = finding("Error taxonomy", "error kinds per layer", "arch");
                f.evidence = vec![Evidence::file("src/config.rs"), Evidence::file("src/lib.rs")];
                f
            },
        ])
    };

    project.engine.ingest(batch()).await.unwrap();
    let store = project.engine.repository().store();
    let nodes_before = store.count_nodes().unwrap();
    let edges_before = store.count_node_edges().unwrap();
    assert_eq!(nodes_before, 2);
    assert_eq!(edges_before, 1);

    project.engine.ingest(batch()).await.unwrap();
    assert_eq!(store.count_nodes().unwrap(), nodes_before);
    assert_eq!(store.count_node_edges().unwrap(), edges_before);
}

#[tokio::test]
async fn duplicate_content_in_one_batch_skipped() {
    let project = engine();
    let report = project
        .engine
        .ingest(IngestBatch::findings(vec![
            finding("Same thing", "identical description", "arch"),
            finding("Same thing", "identical description", "arch"),
        ]))
        .await
        .unwrap();

    assert_eq!(report.created, 1);
    assert_eq!(report.skipped, 1);
}

#[tokio::test]
async fn full_purge_replaces_agent_nodes() {
    let project = engine();
    project
        .engine
        .ingest(IngestBatch::findings(vec![
            finding("Old insight", "superseded knowledge", "git-scan"),
        ]))
        .await
        .unwrap();

    project
        .engine
        .ingest(IngestBatch::findings(vec![
            finding("New insight", "fresh knowledge", "git-scan"),
        ]))
        .await
        .unwrap();

    let nodes = project.engine.repository().store().list_nodes().unwrap();
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0].summary, "New insight");
}

#[tokio::test]
async fn incremental_purge_only_touches_cited_files() {
    let project = engine();
    project
        .engine
        .ingest(IngestBatch::findings(vec![
            {
                let mut f = finding("Main flow", "entry point behavior", "git-scan");
                f.evidence = vec![Evidence::file("src/main.rs")];
                f
            },
            {
                let mut f = finding("Library API", "public surface", "git-scan");
                f.evidence = vec![Evidence::file("src/lib.rs")];
                f
            },
        ]))
        .await
        .unwrap();

    // Re-analysis of src/main.rs only
    let mut batch = IngestBatch::findings(vec![{
        let mut f = finding("Main flow v2", "updated entry point", "git-scan");
        f.evidence = vec![Evidence::file("src/main.rs")];
        f
    }]);
    batch.file_paths = vec!["src/main.rs".to_string()];
    project.engine.ingest(batch).await.unwrap();

    let nodes = project.engine.repository().store().list_nodes().unwrap();
    let summaries: Vec<&str> = nodes.iter().map(|n| n.summary.as_str()).collect();
    assert!(summaries.contains(&"Library API"));
    assert!(summaries.contains(&"Main flow v2"));
    assert!(!summaries.contains(&"Main flow"));
}

#[tokio::test]
async fn llm_relationships_resolve_fuzzily() {
    let project = engine();
    let mut batch = IngestBatch::findings(vec![
        finding("JWT authentication", "token validation at the gateway", "security"),
        finding("Session lifecycle", "session creation and expiry", "arch"),
    ]);
    batch.relationships = vec![Relationship {
        from_title: "session lifecycle management".to_string(),
        to_title: "authentication".to_string(),
        relation: "depends_on".to_string(),
        reason: "sessions are minted from validated tokens".to_string(),
    }];

    let report = project.engine.ingest(batch).await.unwrap();
    assert_eq!(report.edges.llm, 1);

    let edges = project.engine.repository().store().list_node_edges().unwrap();
    let llm: Vec<_> = edges
        .iter()
        .filter(|e| e.properties.get("llm_extracted").is_some())
        .collect();
    assert_eq!(llm.len(), 1);
    assert_eq!(llm[0].relation, EdgeRelation::DependsOn);
    assert!((llm[0].confidence - 0.9).abs() < 1e-6);
}

#[tokio::test]
async fn shared_evidence_links_nodes() {
    let project = engine();
    let report = project
        .engine
        .ingest(IngestBatch::findings(vec![
            {
                let mut f = finding("Auth middleware", "request guard", "security");
                f.evidence = vec![Evidence::range("src/auth.rs", 1, 50)];
                f
            },
            {
                let mut f = finding("Token refresh", "sliding expiry", "arch");
                f.evidence = vec![Evidence::range("src/auth.rs", 60, 90)];
                f
            },
        ]))
        .await
        .unwrap();

    assert_eq!(report.edges.evidence, 1);
    let edges = project.engine.repository().store().list_node_edges().unwrap();
    assert_eq!(edges[0].relation, EdgeRelation::SharesEvidence);
    assert_eq!(edges[0].properties["shared_file"], "src/auth.rs");
}

#[tokio::test]
async fn decision_findings_build_features_and_mirror() {
    let project = engine();
    let mut decision = Finding::new(
        NodeType::Decision,
        "Adopt SQLite",
        "single-file storage for local-first operation",
        "git-history",
    );
    decision.why = Some("no server dependency".to_string());

    let report = project
        .engine
        .ingest(IngestBatch::findings(vec![decision]))
        .await
        .unwrap();
    assert_eq!(report.decisions, 1);

    // git agents map to the Project Evolution component
    let repo = project.engine.repository();
    let feature = repo
        .store()
        .get_feature_by_name("Project Evolution")
        .unwrap()
        .expect("component feature created");
    let decisions = repo.store().list_decisions_for_feature(&feature.id).unwrap();
    assert_eq!(decisions.len(), 1);
    assert_eq!(decisions[0].title, "Adopt SQLite");

    let mirror_file = project
        .dir
        .path()
        .join(".stratum/memory/features/project-evolution.md");
    let rendered = std::fs::read_to_string(mirror_file).unwrap();
    assert!(rendered.contains("### Adopt SQLite"));
    assert!(rendered.contains("- **Why:** no server dependency"));
}

#[tokio::test]
async fn evidence_verification_drops_rejected_findings() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("src")).unwrap();
    std::fs::write(dir.path().join("src/real.rs"), "pub fn real() {}").unwrap();

    let engine = KnowledgeEngine::builder(dir.path())
        .verify_evidence(true)
        .build()
        .unwrap();

    let mut grounded = finding("Grounded", "cites a real file", "scan");
    grounded.evidence = vec![Evidence::file("src/real.rs")];
    let mut hallucinated = finding("Hallucinated", "cites nothing real", "scan");
    hallucinated.evidence = vec![Evidence::file("src/fabricated.rs")];

    let report = engine
        .ingest(IngestBatch::findings(vec![grounded, hallucinated]))
        .await
        .unwrap();

    assert_eq!(report.created, 1);
    assert_eq!(report.rejected, 1);
    let nodes = engine.repository().store().list_nodes().unwrap();
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0].summary, "Grounded");
    assert_eq!(
        nodes[0].verification,
        stratum_core::VerificationStatus::Verified
    );
}

#[tokio::test]
async fn workflow_metadata_promotes_type() {
    let project = engine();
    let mut f = finding("Release procedure", "tag, build, publish", "docs");
    f.metadata.insert("workflow".to_string(), "true".to_string());

    project
        .engine
        .ingest(IngestBatch::findings(vec![f]))
        .await
        .unwrap();

    let nodes = project.engine.repository().store().list_nodes().unwrap();
    assert_eq!(nodes[0].node_type, NodeType::Plan);
}
