use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::{AsyncRead, AsyncWriteExt};

use super::{ArtifactError, ArtifactStore};

/// Filesystem-backed artifact store rooted at a data directory (§4.2).
/// Writes go to a `.tmp` sibling file and are renamed into place so a
/// reader never observes a partially-written artifact.
pub struct LocalArtifactStore {
    root: PathBuf,
}

impl LocalArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }

    fn io_err(path: &str, source: std::io::Error) -> ArtifactError {
        ArtifactError::Io {
            path: path.to_string(),
            source,
        }
    }
}

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    async fn create(
        &self,
        path: &str,
        mut reader: Box<dyn AsyncRead + Send + Unpin>,
    ) -> Result<u64, ArtifactError> {
        let dest = self.resolve(path);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| Self::io_err(path, e))?;
        }

        let tmp_path = dest.with_extension("tmp-download");
        let mut file = fs::File::create(&tmp_path)
            .await
            .map_err(|e| Self::io_err(path, e))?;
        let written = tokio::io::copy(&mut reader, &mut file)
            .await
            .map_err(|e| Self::io_err(path, e))?;
        file.flush().await.map_err(|e| Self::io_err(path, e))?;
        drop(file);

        fs::rename(&tmp_path, &dest)
            .await
            .map_err(|e| Self::io_err(path, e))?;
        Ok(written)
    }

    async fn delete(&self, path: &str) -> Result<(), ArtifactError> {
        match fs::remove_file(self.resolve(path)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Self::io_err(path, e)),
        }
    }

    async fn size(&self, path: &str) -> Result<u64, ArtifactError> {
        match fs::metadata(self.resolve(path)).await {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ArtifactError::NotFound(path.to_string()))
            }
            Err(e) => Err(Self::io_err(path, e)),
        }
    }

    async fn open(&self, path: &str) -> Result<super::ArtifactReader, ArtifactError> {
        match fs::File::open(self.resolve(path)).await {
            Ok(file) => Ok(Box::new(file)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ArtifactError::NotFound(path.to_string()))
            }
            Err(e) => Err(Self::io_err(path, e)),
        }
    }
}

impl LocalArtifactStore {
    /// The on-disk path for `path`, used by the HTTP façade to serve local
    /// artifacts directly rather than proxying through `open`.
    pub fn file_path(&self, path: &str) -> PathBuf {
        self.resolve(path)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}
