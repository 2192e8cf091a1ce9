//! Evidence verification
//!
//! Checks that a finding's evidence points at files that actually exist
//! under the project base path. Findings with no surviving evidence are
//! rejected and dropped before they reach the store.

use std::path::{Path, PathBuf};

use crate::knowledge::{Finding, VerificationStatus};

/// Filesystem-backed evidence verifier
pub struct EvidenceVerifier {
    base: PathBuf,
}

impl EvidenceVerifier {
    /// Create a verifier rooted at the project base path
    pub fn new(base: impl AsRef<Path>) -> Self {
        Self {
            base: base.as_ref().to_path_buf(),
        }
    }

    /// Classify one finding by how much of its evidence exists.
    ///
    /// Findings without evidence stay `Pending`: there is nothing to
    /// check, and absence of evidence is not evidence of absence.
    pub fn verify(&self, finding: &Finding) -> VerificationStatus {
        if finding.evidence.is_empty() {
            return VerificationStatus::Pending;
        }

        let existing = finding
            .evidence
            .iter()
            .filter(|e| self.base.join(&e.file_path).exists())
            .count();

        if existing == finding.evidence.len() {
            VerificationStatus::Verified
        } else if existing > 0 {
            VerificationStatus::Partial
        } else {
            VerificationStatus::Rejected
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
