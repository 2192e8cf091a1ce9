//! Repository Module
//!
//! Thin orchestration over the store and the mirror. Every mutating
//! feature or decision operation applies to the store first, then
//! recomputes the affected mirror file. Mirror failure during a create
//! is compensated by deleting the store row, so no feature exists
//! without its projection file; on updates and deletes it is logged and
//! the operation succeeds (the mirror is derivable).

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::knowledge::{Decision, EdgeRelation, Feature, FeatureIndex};
use crate::mirror::FileMirror;
use crate::storage::{Result, StorageError, Store};

/// File name of the cached feature index
pub const INDEX_FILE: &str = "index.json";

// ============================================================================
// INTEGRITY REPORTS
// ============================================================================

/// Findings of an integrity check
#[derive(Debug, Clone, Default, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityReport {
    /// Features whose mirror file is missing
    pub missing_files: Vec<String>,
    /// Node edges whose endpoints no longer resolve
    pub orphan_edges: usize,
    /// Whether the cached feature index lags the store
    pub index_stale: bool,
}

impl IntegrityReport {
    /// Whether anything needs repair
    pub fn is_clean(&self) -> bool {
        self.missing_files.is_empty() && self.orphan_edges == 0 && !self.index_stale
    }
}

/// What a repair pass did
#[derive(Debug, Clone, Default, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairReport {
    /// Feature files rewritten from the store
    pub files_rewritten: usize,
    /// Orphan edges removed
    pub orphan_edges_removed: usize,
    /// Whether the feature index was rebuilt
    pub index_rebuilt: bool,
}

// ============================================================================
// REPOSITORY
// ============================================================================

/// Store + Mirror orchestration with a cached feature index
pub struct Repository {
    store: Store,
    mirror: FileMirror,
    index_path: PathBuf,
    index_cache: Mutex<Option<FeatureIndex>>,
}

impl Repository {
    /// Open the repository under the given memory directory
    pub fn open(memory_dir: impl AsRef<Path>) -> Result<Self> {
        let memory_dir = memory_dir.as_ref();
        let store = Store::open(memory_dir)?;
        Ok(Self {
            store,
            mirror: FileMirror::new(memory_dir),
            index_path: memory_dir.join(INDEX_FILE),
            index_cache: Mutex::new(None),
        })
    }

    /// The underlying row store
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// The file mirror
    pub fn mirror(&self) -> &FileMirror {
        &self.mirror
    }

    fn invalidate_index(&self) {
        if let Ok(mut cache) = self.index_cache.lock() {
            *cache = None;
        }
    }

    // ========================================================================
    // FEATURES AND DECISIONS
    // ========================================================================

    /// Create a feature. Duplicate names conflict. Mirror failure here is
    /// compensated by deleting the freshly inserted row.
    pub fn create_feature(&self, name: &str, description: &str) -> Result<Feature> {
        let feature = Feature::new(name, description);
        self.store.insert_feature(&feature)?;
        self.invalidate_index();

        if let Err(e) = self.mirror.write_feature(&feature, &[]) {
            tracing::error!("mirror write failed for feature '{}', rolling back: {e}", name);
            self.store.delete_feature(&feature.id)?;
            return Err(e.into());
        }
        Ok(feature)
    }

    /// Fetch a feature by case-insensitive name, creating it when absent
    pub fn ensure_feature(&self, name: &str) -> Result<Feature> {
        if let Some(existing) = self.store.get_feature_by_name(name)? {
            return Ok(existing);
        }
        self.create_feature(name, "")
    }

    /// Record a decision under a feature and refresh its mirror file
    pub fn add_decision(
        &self,
        feature_id: &str,
        title: &str,
        summary: &str,
        why: Option<String>,
        tradeoffs: Option<String>,
    ) -> Result<Decision> {
        let feature = self
            .store
            .get_feature(feature_id)?
            .ok_or_else(|| StorageError::NotFound(format!("feature {feature_id}")))?;

        let mut decision = Decision::new(feature_id, title, summary);
        decision.why = why;
        decision.tradeoffs = tradeoffs;
        self.store.insert_decision(&decision)?;
        self.invalidate_index();

        self.refresh_feature_file(&feature);
        Ok(decision)
    }

    /// Update a feature's description and refresh its mirror file
    pub fn update_feature_description(&self, feature_id: &str, description: &str) -> Result<()> {
        self.store.update_feature_description(feature_id, description)?;
        self.invalidate_index();
        if let Some(feature) = self.store.get_feature(feature_id)? {
            self.refresh_feature_file(&feature);
        }
        Ok(())
    }

    /// Delete a decision and refresh its feature's mirror file
    pub fn delete_decision(&self, decision_id: &str, feature_id: &str) -> Result<()> {
        self.store.delete_decision(decision_id)?;
        self.invalidate_index();
        if let Some(feature) = self.store.get_feature(feature_id)? {
            self.refresh_feature_file(&feature);
        }
        Ok(())
    }

    /// Delete a feature (Conflict when dependents exist) and its file
    pub fn delete_feature(&self, feature_id: &str) -> Result<()> {
        let feature = self
            .store
            .get_feature(feature_id)?
            .ok_or_else(|| StorageError::NotFound(format!("feature {feature_id}")))?;
        self.store.delete_feature(feature_id)?;
        self.invalidate_index();

        if let Err(e) = self.mirror.delete_feature_file(&feature) {
            tracing::warn!("mirror delete failed for feature '{}': {e}", feature.name);
        }
        Ok(())
    }

    /// Link two features. Cycle-closing `depends_on` edges conflict.
    pub fn link_features(
        &self,
        from_id: &str,
        to_id: &str,
        relation: EdgeRelation,
        confidence: f32,
    ) -> Result<bool> {
        for id in [from_id, to_id] {
            if self.store.get_feature(id)?.is_none() {
                return Err(StorageError::NotFound(format!("feature {id}")));
            }
        }
        self.store.insert_feature_edge(from_id, to_id, relation, confidence)
    }

    /// Rewrite one feature's mirror file, logging failure (derived state)
    fn refresh_feature_file(&self, feature: &Feature) {
        let decisions = match self.store.list_decisions_for_feature(&feature.id) {
            Ok(decisions) => decisions,
            Err(e) => {
                tracing::warn!("could not load decisions for '{}': {e}", feature.name);
                return;
            }
        };
        if let Err(e) = self.mirror.write_feature(feature, &decisions) {
            tracing::warn!("mirror refresh failed for feature '{}': {e}", feature.name);
        }
    }

    // ========================================================================
    // FEATURE INDEX
    // ========================================================================

    /// The derived feature index, rebuilt lazily after any mutation and
    /// persisted to `index.json` as a best-effort cache
    pub fn feature_index(&self) -> Result<FeatureIndex> {
        if let Ok(cache) = self.index_cache.lock() {
            if let Some(index) = cache.as_ref() {
                return Ok(index.clone());
            }
        }

        let index = FeatureIndex::build(self.store.feature_summaries()?);
        match serde_json::to_string_pretty(&index) {
            Ok(json) => {
                if let Err(e) = std::fs::write(&self.index_path, json) {
                    tracing::warn!("could not persist feature index: {e}");
                }
            }
            Err(e) => tracing::warn!("could not serialize feature index: {e}"),
        }

        if let Ok(mut cache) = self.index_cache.lock() {
            *cache = Some(index.clone());
        }
        Ok(index)
    }

    // ========================================================================
    // INTEGRITY
    // ========================================================================

    /// Report missing mirror files, orphan edges, and index staleness
    pub fn check(&self) -> Result<IntegrityReport> {
        let mut report = IntegrityReport::default();

        for feature in self.store.list_features()? {
            if !self.mirror.feature_file_exists(&feature) {
                report.missing_files.push(feature.name);
            }
        }

        report.orphan_edges = self.store.count_orphan_edges()?;
        report.index_stale = self.index_is_stale()?;
        Ok(report)
    }

    fn index_is_stale(&self) -> Result<bool> {
        let latest = self.store.latest_feature_mutation()?;
        let Some(latest) = latest else {
            return Ok(false);
        };
        let Ok(json) = std::fs::read_to_string(&self.index_path) else {
            return Ok(true);
        };
        let Ok(index) = serde_json::from_str::<FeatureIndex>(&json) else {
            return Ok(true);
        };
        Ok(index.generated_at < latest)
    }

    /// Regenerate mirror files, drop orphan edges, rebuild the index
    pub fn repair(&self) -> Result<RepairReport> {
        let mut report = RepairReport::default();

        report.files_rewritten = self.rebuild_files()?;
        report.orphan_edges_removed = self.store.delete_orphan_edges()?;

        self.invalidate_index();
        self.feature_index()?;
        report.index_rebuilt = true;
        Ok(report)
    }

    /// Regenerate every feature file from the store. Always safe.
    pub fn rebuild_files(&self) -> Result<usize> {
        let features = self.store.list_features()?;
        let mut written = 0;
        for feature in &features {
            let decisions = self.store.list_decisions_for_feature(&feature.id)?;
            self.mirror.write_feature(feature, &decisions)?;
            written += 1;
        }
        Ok(written)
    }
}

// ============================================================================
// TESTS
// ============================================================================
