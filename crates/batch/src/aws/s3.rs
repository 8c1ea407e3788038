//! S3 implementation of the blob store seam.

use std::path::Path;

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{Delete, ObjectIdentifier};

use crate::backend::BlobStore;
use crate::error::BackendError;

use super::build_err;

/// Blob store talking to S3.
pub struct AwsBlobStore {
    client: aws_sdk_s3::Client,
}

impl AwsBlobStore {
    pub fn new(sdk_config: &aws_config::SdkConfig) -> Self {
        Self {
            client: aws_sdk_s3::Client::new(sdk_config),
        }
    }
}

fn s3_err(e: impl Into<aws_sdk_s3::Error>) -> BackendError {
    BackendError::Api(e.into().to_string())
}

#[async_trait]
impl BlobStore for AwsBlobStore {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        source: &Path,
    ) -> Result<(), BackendError> {
        let body = ByteStream::from_path(source)
            .await
            .map_err(|e| BackendError::Api(format!("failed to read {}: {e}", source.display())))?;

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .map_err(s3_err)?;
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str, dest: &Path) -> Result<(), BackendError> {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(s3_err)?;

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = output
            .body
            .collect()
            .await
            .map_err(|e| BackendError::Api(e.to_string()))?
            .into_bytes();
        tokio::fs::write(dest, &bytes).await?;
        Ok(())
    }

    async fn list_keys(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, BackendError> {
        let mut keys = Vec::new();
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .prefix(prefix)
            .into_paginator()
            .send();

        while let Some(page) = pages.next().await {
            let page = page.map_err(s3_err)?;
            keys.extend(
                page.contents()
                    .iter()
                    .filter_map(|object| object.key().map(str::to_owned)),
            );
        }
        Ok(keys)
    }

    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> Result<(), BackendError> {
        let objects = keys
            .iter()
            .map(|key| ObjectIdentifier::builder().key(key).build().map_err(build_err))
            .collect::<Result<Vec<_>, _>>()?;

        let delete = Delete::builder()
            .set_objects(Some(objects))
            .build()
            .map_err(build_err)?;

        self.client
            .delete_objects()
            .bucket(bucket)
            .delete(delete)
            .send()
            .await
            .map_err(s3_err)?;
        Ok(())
    }
}
