use async_trait::async_trait;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use std::collections::HashMap;

use crate::config::StorageConfig;
use crate::shared::error::ApiError;

/// Object storage boundary. The hierarchy core stores only returned URLs,
/// keyed by resolution label; the bytes live behind this trait.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str)
        -> Result<String, ApiError>;
    async fn remove(&self, path: &str) -> Result<(), ApiError>;
}

/// Transcodes a video upload into the requested resolutions. A failed
/// transcode falls back to storing the original under the "base" label only.
#[async_trait]
pub trait VideoTranscoder: Send + Sync {
    async fn transcode(
        &self,
        bytes: &[u8],
        target_resolutions: &[String],
    ) -> Result<HashMap<String, Vec<u8>>, ApiError>;
}

pub struct S3Storage {
    client: S3Client,
    bucket: String,
    endpoint: String,
}

impl S3Storage {
    pub async fn new(cfg: &StorageConfig) -> Self {
        let creds = Credentials::new(&cfg.access_key, &cfg.secret_key, None, None, "static");
        let s3_config = aws_sdk_s3::config::Builder::new()
            .endpoint_url(&cfg.endpoint)
            .credentials_provider(creds)
            .region(Region::new("us-east-1"))
            .force_path_style(true)
            .behavior_version(aws_sdk_s3::config::BehaviorVersion::latest())
            .build();
        Self {
            client: S3Client::from_conf(s3_config),
            bucket: cfg.bucket.clone(),
            endpoint: cfg.endpoint.clone(),
        }
    }
}

#[async_trait]
impl ObjectStorage for S3Storage {
    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, ApiError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(path)
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| {
                tracing::error!("S3 put_object failed: {:?}", e);
                ApiError::Internal(format!("upload failed: {}", e))
            })?;
        Ok(format!("{}/{}/{}", self.endpoint, self.bucket, path))
    }

    async fn remove(&self, path: &str) -> Result<(), ApiError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(path)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("S3 delete_object failed: {:?}", e);
                ApiError::Internal(format!("delete failed: {}", e))
            })?;
        Ok(())
    }
}

/// No-op transcoder: every requested resolution gets the original bytes.
/// Real transcoding runs in a separate service; this keeps the upload path
/// functional without it.
pub struct PassthroughTranscoder;

#[async_trait]
impl VideoTranscoder for PassthroughTranscoder {
    async fn transcode(
        &self,
        bytes: &[u8],
        _target_resolutions: &[String],
    ) -> Result<HashMap<String, Vec<u8>>, ApiError> {
        let mut out = HashMap::new();
        out.insert("base".to_string(), bytes.to_vec());
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_passthrough_transcoder_yields_base_only() {
        let t = PassthroughTranscoder;
        let out = t
            .transcode(b"mp4-bytes", &["720p".to_string(), "1080p".to_string()])
            .await
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out.get("base").map(Vec::as_slice), Some(&b"mp4-bytes"[..]));
    }
}
