use thiserror::Error;

/// Errors the Artifact Store can raise (§4.2, §7 `CleanupError`).
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("artifact not found: {0}")]
    NotFound(String),

    #[error("artifact io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("remote object store error: {0}")]
    Remote(String),

    #[error("operation unsupported by this backend: {0}")]
    Unsupported(&'static str),
}

impl ArtifactError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ArtifactError::NotFound(_))
            || matches!(self, ArtifactError::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}
