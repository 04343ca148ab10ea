use async_trait::async_trait;
use s3::bucket::Bucket;
use s3::creds::Credentials;
use s3::region::Region;
use tokio::io::AsyncRead;

use super::{ArtifactError, ArtifactStore};

/// S3-compatible artifact store (§4.2, `storage.type = remote_object`).
/// `open` is unsupported — remote-hosted artifacts are assumed to be served
/// directly by the object store, not proxied through this process.
pub struct RemoteArtifactStore {
    bucket: Bucket,
    prefix: Option<String>,
}

impl RemoteArtifactStore {
    pub fn new(
        endpoint_url: &str,
        region: &str,
        bucket_name: &str,
        access_key: Option<&str>,
        secret_key: Option<&str>,
        prefix: Option<String>,
    ) -> Result<Self, ArtifactError> {
        let region = Region::Custom {
            region: region.to_string(),
            endpoint: endpoint_url.to_string(),
        };
        let credentials = Credentials::new(access_key, secret_key, None, None, None)
            .map_err(|e| ArtifactError::Remote(e.to_string()))?;
        let bucket = Bucket::new(bucket_name, region, credentials)
            .map_err(|e| ArtifactError::Remote(e.to_string()))?
            .with_path_style();
        Ok(Self { bucket, prefix })
    }

    fn object_key(&self, path: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}/{}", prefix.trim_end_matches('/'), path),
            None => path.to_string(),
        }
    }
}

#[async_trait]
impl ArtifactStore for RemoteArtifactStore {
    async fn create(
        &self,
        path: &str,
        mut reader: Box<dyn AsyncRead + Send + Unpin>,
    ) -> Result<u64, ArtifactError> {
        let key = self.object_key(path);
        let status = self
            .bucket
            .put_object_stream(&mut reader, &key)
            .await
            .map_err(|e| ArtifactError::Remote(e.to_string()))?;
        Ok(status.uploaded_bytes() as u64)
    }

    async fn delete(&self, path: &str) -> Result<(), ArtifactError> {
        let key = self.object_key(path);
        match self.bucket.delete_object(&key).await {
            Ok(_) => Ok(()),
            Err(e) => {
                let message = e.to_string();
                if message.contains("404") || message.contains("NoSuchKey") {
                    Ok(())
                } else {
                    Err(ArtifactError::Remote(message))
                }
            }
        }
    }

    async fn size(&self, path: &str) -> Result<u64, ArtifactError> {
        let key = self.object_key(path);
        match self.bucket.head_object(&key).await {
            Ok((head, _)) => Ok(head.content_length.unwrap_or(0) as u64),
            Err(e) => {
                let message = e.to_string();
                if message.contains("404") || message.contains("NoSuchKey") {
                    Err(ArtifactError::NotFound(path.to_string()))
                } else {
                    Err(ArtifactError::Remote(message))
                }
            }
        }
    }

    async fn open(&self, _path: &str) -> Result<super::ArtifactReader, ArtifactError> {
        Err(ArtifactError::Unsupported(
            "remote object store does not serve artifacts back out; host them externally",
        ))
    }
}
