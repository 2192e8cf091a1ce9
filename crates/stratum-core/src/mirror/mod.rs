//! Mirror Module
//!
//! Human-readable file projection of Features and their Decisions under
//! `features/<slug>.md`. The row store stays authoritative: mirror state
//! is never read back as truth, and `rebuild_files` regenerates every
//! file from the store at any time without data loss.

use std::path::{Path, PathBuf};

use crate::knowledge::{Decision, Feature};

/// Directory under the memory root that holds feature files
pub const FEATURES_DIR: &str = "features";

/// Derived file projection of structured records
pub struct FileMirror {
    features_dir: PathBuf,
}

impl FileMirror {
    /// Create a mirror rooted at the memory directory
    pub fn new(memory_dir: impl AsRef<Path>) -> Self {
        Self {
            features_dir: memory_dir.as_ref().join(FEATURES_DIR),
        }
    }

    /// Path of the file projecting one feature
    pub fn feature_path(&self, feature: &Feature) -> PathBuf {
        self.features_dir.join(format!("{}.md", slugify(&feature.name)))
    }

    /// Write (or overwrite) one feature file. Idempotent.
    pub fn write_feature(&self, feature: &Feature, decisions: &[Decision]) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.features_dir)?;
        let path = self.feature_path(feature);
        std::fs::write(path, render_feature(feature, decisions))
    }

    /// Remove one feature file. Missing files are not an error.
    pub fn delete_feature_file(&self, feature: &Feature) -> std::io::Result<()> {
        match std::fs::remove_file(self.feature_path(feature)) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }

    /// Whether the projection file for a feature exists
    pub fn feature_file_exists(&self, feature: &Feature) -> bool {
        self.feature_path(feature).exists()
    }
}

/// Slug for a feature name: lowercase, non-alphanumeric runs collapse
/// to a single dash, edges trimmed.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_dash = true;
    for c in name.chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.is_empty() {
        slug.push_str("feature");
    }
    slug
}

/// Render a feature and its decisions as markdown
fn render_feature(feature: &Feature, decisions: &[Decision]) -> String {
    let mut out = String::new();
    out.push_str(&format!("# {}\n\n", feature.name));
    if !feature.description.is_empty() {
        out.push_str(&format!("{}\n\n", feature.description));
    }

    out.push_str("## Decisions\n\n");
    if decisions.is_empty() {
        out.push_str("_No decisions recorded yet._\n\n");
    }
    for decision in decisions {
        out.push_str(&format!("### {}\n\n", decision.title));
        out.push_str(&format!("- **Summary:** {}\n", decision.summary));
        if let Some(why) = &decision.why {
            out.push_str(&format!("- **Why:** {why}\n"));
        }
        if let Some(tradeoffs) = &decision.tradeoffs {
            out.push_str(&format!("- **Trade-offs:** {tradeoffs}\n"));
        }
        out.push_str(&format!(
            "- **Date:** {}\n\n",
            decision.decided_at.format("%Y-%m-%d")
        ));
    }

    out.push_str("## Notes\n\n_No notes yet._\n");
    out
}

// ============================================================================
// TESTS
// ============================================================================
