use thiserror::Error;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("downloader binary not found at {0}")]
    BinaryNotFound(String),

    #[error("transcoder binary not found at {0}")]
    TranscoderNotFound(String),

    #[error("failed to spawn downloader: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("rate limited (HTTP 429)")]
    TooManyRequests,

    #[error("downloader exited with {code:?}: {stderr_tail}")]
    ExitFailure { code: Option<i32>, stderr_tail: String },

    #[error("self-update failed: {0}")]
    UpdateFailed(String),

    #[error("could not parse playlist metadata: {0}")]
    InvalidMetadata(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl DownloadError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, DownloadError::TooManyRequests)
    }
}
