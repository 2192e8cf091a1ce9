//! Engine-level error type
//!
//! Storage errors propagate; provider errors only surface when they are
//! not recoverable by stage-skipping (cancellation, or a call the
//! operation cannot proceed without, like `ask` with no chat provider).

use crate::providers::ProviderError;
use crate::storage::StorageError;

/// Top-level error for engine operations
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Storage failure
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// Provider failure that could not be recovered by degrading
    #[error(transparent)]
    Provider(#[from] ProviderError),
    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    Config(String),
    /// A capability required by the call is not wired up
    #[error("{0} is not configured")]
    NotConfigured(&'static str),
}

/// Engine result type
pub type Result<T> = std::result::Result<T, EngineError>;
