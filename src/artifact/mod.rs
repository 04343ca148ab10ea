//! Artifact Store (§4.2): the object interface media files and rendered
//! feed documents are written through. Two backends exist — `local`
//! (rooted at a data directory, also capable of serving files back out for
//! HTTP) and `remote` (an S3-compatible bucket, upload-only).

pub mod error;
pub mod local;
pub mod remote;

use async_trait::async_trait;
use tokio::io::AsyncRead;

pub use error::ArtifactError;
pub use local::LocalArtifactStore;
pub use remote::RemoteArtifactStore;

/// A boxed, owned, unpinned async reader — what callers get back from
/// `open` to stream a media file to an HTTP response body.
pub type ArtifactReader = Box<dyn AsyncRead + Send + Unpin>;

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Stream `reader` into `path`, returning the number of bytes written.
    async fn create(
        &self,
        path: &str,
        reader: Box<dyn AsyncRead + Send + Unpin>,
    ) -> Result<u64, ArtifactError>;

    /// Remove the artifact at `path`. Idempotent: removing a path that does
    /// not exist returns `Ok(())`, matching the "treat missing artifacts as
    /// idempotent" guidance in §4.2.
    async fn delete(&self, path: &str) -> Result<(), ArtifactError>;

    /// The artifact's size in bytes, or `ArtifactError::NotFound`.
    async fn size(&self, path: &str) -> Result<u64, ArtifactError>;

    /// Open the artifact for reading. Only the local backend supports this
    /// (§4.2: remote backends assume external hosting).
    async fn open(&self, path: &str) -> Result<ArtifactReader, ArtifactError>;
}
