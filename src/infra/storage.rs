use anyhow::Result;
use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_config::BehaviorVersion;
use aws_config::Region;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use bytes::Bytes;
use thiserror::Error;

use crate::config::AppConfig;

#[derive(Debug, Error)]
#[error(transparent)]
pub struct UploadError(#[from] anyhow::Error);

/// Content-addressable storage for report attachments.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stores `bytes` under `path`, refusing to overwrite an existing
    /// object.
    async fn upload(
        &self,
        path: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<(), UploadError>;

    /// Removes the given objects. Callers using this as compensation log
    /// the error and move on.
    async fn delete(&self, paths: &[String]) -> Result<(), UploadError>;
}

#[derive(Clone)]
pub struct ObjectStorage {
    client: Client,
    bucket: String,
}

impl ObjectStorage {
    pub async fn new(config: &AppConfig) -> Result<Self> {
        let region_provider = RegionProviderChain::first_try(Region::new(config.s3_region.clone()));
        let shared_config = aws_config::defaults(BehaviorVersion::latest())
            .region(region_provider)
            .load()
            .await;

        let mut s3_builder = aws_sdk_s3::config::Builder::from(&shared_config)
            .region(shared_config.region().cloned())
            .endpoint_url(config.s3_endpoint.clone());
        if let Some(provider) = shared_config.credentials_provider() {
            s3_builder = s3_builder.credentials_provider(provider);
        }
        let s3_config = s3_builder.build();

        let client = Client::from_conf(s3_config);

        Ok(Self {
            client,
            bucket: config.s3_bucket.clone(),
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[async_trait]
impl BlobStore for ObjectStorage {
    async fn upload(
        &self,
        path: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<(), UploadError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(path)
            .content_type(content_type)
            .if_none_match("*")
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|err| UploadError::from(anyhow::Error::new(err)))?;

        Ok(())
    }

    async fn delete(&self, paths: &[String]) -> Result<(), UploadError> {
        for path in paths {
            self.client
                .delete_object()
                .bucket(&self.bucket)
                .key(path)
                .send()
                .await
                .map_err(|err| UploadError::from(anyhow::Error::new(err)))?;
        }

        Ok(())
    }
}
