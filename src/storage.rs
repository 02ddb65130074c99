use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;

/// Blob store for uploaded contract files.
#[async_trait]
pub trait ObjectStorage: Send + Sync + 'static {
    async fn put_object(&self, key: &str, bytes: Vec<u8>, content_type: Option<String>) -> Result<()>;

    /// `content_disposition` overrides the header S3 returns with the object.
    async fn presign_get_object(
        &self,
        key: &str,
        expires_in: Duration,
        content_disposition: Option<String>,
    ) -> Result<String>;

    async fn delete_object(&self, key: &str) -> Result<()>;
}

pub struct S3Storage {
    client: S3Client,
    bucket: String,
}

impl S3Storage {
    pub fn new(client: S3Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl ObjectStorage for S3Storage {
    async fn put_object(&self, key: &str, bytes: Vec<u8>, content_type: Option<String>) -> Result<()> {
        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(bytes));

        if let Some(content_type) = content_type {
            request = request.content_type(content_type);
        }

        request
            .send()
            .await
            .with_context(|| format!("failed to store contract file {key}"))?;
        Ok(())
    }

    async fn presign_get_object(
        &self,
        key: &str,
        expires_in: Duration,
        content_disposition: Option<String>,
    ) -> Result<String> {
        let presign_config = PresigningConfig::builder()
            .expires_in(expires_in)
            .build()
            .context("failed to build S3 presigning config")?;

        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .set_response_content_disposition(content_disposition)
            .presigned(presign_config)
            .await
            .context("failed to generate presigned download URL")?;

        Ok(presigned.uri().to_string())
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("failed to delete contract file {key}"))?;
        Ok(())
    }
}
