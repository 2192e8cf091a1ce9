//! Store consistency scenarios: embedding dimension drift, workspace
//! updates, and mirror integrity with repair.

use stratum_core::{Finding, IngestBatch, KnowledgeNode, NodeType};
use stratum_e2e_tests::engine;

#[tokio::test]
async fn mixed_embedding_dimensions_flagged() {
    let project = engine();
    let store = project.engine.repository().store();

    let mut small = KnowledgeNode::new("small model node", "embedded at 768");
    small.embedding = Some(vec![0.1; 768]);
    let mut large = KnowledgeNode::new("large model node", "embedded at 1024");
    large.embedding = Some(vec![0.1; 1024]);
    store.insert_node(&small).unwrap();
    store.insert_node(&large).unwrap();

    let report = project.engine.check_embedding_consistency().unwrap();
    assert!(report.needs_attention);
    assert!(report.message.contains("mixed embedding dimensions"));
}

#[tokio::test]
async fn missing_embeddings_flagged() {
    let project = engine();
    let store = project.engine.repository().store();

    let mut embedded = KnowledgeNode::new("embedded", "has a vector");
    embedded.embedding = Some(vec![0.1; 768]);
    store.insert_node(&embedded).unwrap();
    store
        .insert_node(&KnowledgeNode::new("bare", "no vector"))
        .unwrap();

    let report = project.engine.check_embedding_consistency().unwrap();
    assert!(report.needs_attention);
    assert!(report.message.contains("missing embeddings"));
}

#[tokio::test]
async fn empty_store_is_consistent() {
    let project = engine();
    let report = project.engine.check_embedding_consistency().unwrap();
    assert!(!report.needs_attention);
}

#[tokio::test]
async fn workspace_update_roundtrips() {
    let project = engine();
    let store = project.engine.repository().store();

    let node = KnowledgeNode::new("movable", "content");
    store.insert_node(&node).unwrap();
    store.update_node_workspace(&node.id, "api").unwrap();

    assert_eq!(store.get_node(&node.id).unwrap().unwrap().workspace, "api");
}

#[tokio::test]
async fn deleted_mirror_files_detected_and_repaired() {
    let project = engine();
    project
        .engine
        .ingest(IngestBatch::findings(vec![Finding::new(
            NodeType::Feature,
            "Billing",
            "payment handling",
            "product-scan",
        )]))
        .await
        .unwrap();

    let features_dir = project.dir.path().join(".stratum/memory/features");
    std::fs::remove_file(features_dir.join("billing.md")).unwrap();

    let report = project.engine.check().unwrap();
    assert_eq!(report.missing_files, vec!["Billing".to_string()]);

    let repair = project.engine.repair().unwrap();
    assert!(repair.files_rewritten >= 1);
    assert!(repair.index_rebuilt);

    let report = project.engine.check().unwrap();
    assert!(report.missing_files.is_empty());
    assert!(!report.index_stale);
    assert!(features_dir.join("billing.md").exists());
}

#[tokio::test]
async fn feature_index_persisted_and_fresh() {
    let project = engine();
    let repo = project.engine.repository();
    repo.create_feature("Alpha", "first").unwrap();
    repo.create_feature("Beta", "second").unwrap();

    let index = repo.feature_index().unwrap();
    assert_eq!(index.len(), 2);
    assert_eq!(index.features[0].name, "Alpha");

    let index_file = project.dir.path().join(".stratum/memory/index.json");
    let persisted: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(index_file).unwrap()).unwrap();
    assert_eq!(persisted["features"].as_array().unwrap().len(), 2);
}
