//! Engine-wide error kinds (§7 of the design doc).
//!
//! Components expose a `thiserror` leaf type of their own (`StorageError`,
//! `ArtifactError`, `DownloadError`) for the failures they can recover from
//! locally. Everything that crosses a stage boundary in the Feed Updater is
//! normalized into [`EngineError`] so the pipeline and the API façade can match
//! on a single set of kinds.

use thiserror::Error;

use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("rate limited by provider")]
    TooManyRequests,

    #[error("download failed: {0}")]
    DownloadFailed(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("artifact store error: {0}")]
    Artifact(#[from] crate::artifact::ArtifactError),

    #[error("listing source error: {0}")]
    Listing(#[from] crate::listing::ListingError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("post-download hook failed: {0}")]
    Hook(String),

    #[error("cleanup encountered {0} error(s): {1}")]
    Cleanup(usize, String),

    #[error("illegal status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
}

impl EngineError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, EngineError::NotFound(_))
            || matches!(self, EngineError::Storage(StorageError::NotFound(_)))
    }
}
