//! Storage backend implementation for working with bucketing solutions compatible with the S3 API.
//!
//! This is currently built on the [`aws_sdk_s3`] crate. Google Cloud Storage buckets can be used
//! through their S3 interoperability endpoint with HMAC keys.
//!
//! Listings use the `/` delimiter, so the bucket is browsed one "directory" level at a time:
//! common prefixes come back as directories and objects directly under the prefix as files.
//!
//! Objects are transferred as whole buffers. The server must receive an entire upload before it
//! can be sent to the bucket, and a download is buffered before it is handed to the client.

use anyhow::{bail, Context};
use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{AppName, BehaviorVersion, Config, Region};
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use lading_api_types::storage::{
    FileResponse, Metadata, ObjectMetadata, ObjectStore, PathCodec, StorageError, StorageResult,
    StorePath,
};
use tracing::debug;

/// Raw object key, outside of the packages tree.
const HEALTHCHECK_KEY: &str = ".healthcheck";

/// Storage client for working with S3-compatible APIs.
///
/// See [the module-level docs](super::s3_client) for more information.
#[derive(Clone)]
pub struct S3StorageProvider {
    client: aws_sdk_s3::Client,
    bucket_name: String,
    codec: PathCodec,
}

impl S3StorageProvider {
    /// Construct a new client. The bucket is not contacted until the first request.
    ///
    /// The bucket name doubles as the store identity embedded in every [`StorePath`].
    pub fn new(
        bucket_name: &str,
        endpoint_url: &str,
        region: &str,
        access_key: &str,
        secret_key: &str,
    ) -> StorageResult<Self> {
        let config = Config::builder()
            .behavior_version(BehaviorVersion::v2025_01_17())
            .region(Region::new(region.to_string()))
            .endpoint_url(endpoint_url)
            .credentials_provider(Credentials::from_keys(access_key, secret_key, None))
            .app_name(AppName::new("lading").context("app name")?)
            .build();

        let codec = PathCodec::new(bucket_name)?;
        let client = aws_sdk_s3::Client::from_conf(config);

        Ok(Self {
            client,
            bucket_name: bucket_name.to_string(),
            codec,
        })
    }

    async fn pull_object(&self, key: &str) -> StorageResult<FileResponse> {
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket_name)
            .key(key)
            .send()
            .await;

        // on 404, we return a different error variant
        if let Err(SdkError::ServiceError(e)) = &resp
            && e.err().is_no_such_key()
        {
            return Err(StorageError::NotFound);
        }

        let resp = resp.context("Storage response error")?;
        let last_modified = resp.last_modified().and_then(|d| DateTime::from_timestamp(d.secs(), 0));

        let data = resp
            .body
            .collect()
            .await
            .context("Error while retrieving body")?
            .into_bytes();

        Ok(FileResponse {
            last_modified,
            data,
        })
    }

    async fn put_object(&self, key: &str, file_bytes: ByteStream, meta: Metadata) -> StorageResult<()> {
        let mut obj = self
            .client
            .put_object()
            .bucket(&self.bucket_name)
            .key(key)
            .body(file_bytes);
        if let Some(len) = meta.content_length {
            obj = obj.content_length(len as _);
        }
        if let Some(ty) = meta.content_type {
            obj = obj.content_type(ty);
        }
        if let Some(cc) = meta.cache_control {
            obj = obj.cache_control(cc);
        }
        for (k, v) in meta.kv {
            obj = obj.metadata(k, v);
        }

        obj.send().await.context("Failed to put file")?;
        Ok(())
    }

    async fn head_object(&self, key: &str) -> StorageResult<ObjectMetadata> {
        let resp = self
            .client
            .head_object()
            .bucket(&self.bucket_name)
            .key(key)
            .send()
            .await;

        if let Err(SdkError::ServiceError(e)) = &resp
            && e.err().is_not_found()
        {
            return Err(StorageError::NotFound);
        }

        let resp = resp.context("Storage response error")?;

        Ok(ObjectMetadata {
            size: resp.content_length().unwrap_or_default().max(0) as u64,
            content_type: resp.content_type().map(String::from),
            last_modified: resp
                .last_modified()
                .and_then(|d| DateTime::<Utc>::from_timestamp(d.secs(), 0)),
            etag: resp.e_tag().map(String::from),
        })
    }

    /// One delimiter-scoped listing of `prefix`, which must end in `/` (or be empty).
    async fn list_children(&self, prefix: &str, directories_only: bool) -> StorageResult<Vec<String>> {
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket_name)
            .prefix(prefix)
            .delimiter("/")
            .into_paginator()
            .send();

        let mut keys = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.context("failed to list objects")?;
            if directories_only {
                keys.extend(
                    page.common_prefixes()
                        .iter()
                        .filter_map(|p| p.prefix().map(String::from)),
                );
            } else {
                // a zero-length "folder" placeholder has the prefix itself as its key
                keys.extend(
                    page.contents()
                        .iter()
                        .filter_map(|obj| obj.key())
                        .filter(|key| *key != prefix)
                        .map(String::from),
                );
            }
        }
        keys.sort_unstable();

        debug!(prefix, directories_only, count = keys.len(), "Listed bucket prefix");
        Ok(keys)
    }

    // check that we can actually contact the bucket
    async fn healthcheck(&self) -> Result<(), anyhow::Error> {
        for _ in 0..3 {
            // try and pull the object initially to make sure the health file is there
            match self.pull_object(HEALTHCHECK_KEY).await {
                Ok(obj) => {
                    if obj.data.as_ref() == b"ok" {
                        return Ok(());
                    }

                    // this case will not attempt to repair the data - if corruption is occurring
                    // healthchecks should continue to fail until manual intervention occurs
                    bail!("wrong data");
                }
                Err(StorageError::NotFound) => {
                    // if the key isn't there (because you just stood the service up), put it
                    // there and retry the loop
                    self.put_object(
                        HEALTHCHECK_KEY,
                        Bytes::from_static(b"ok").into(),
                        Metadata {
                            content_type: Some("text/plain"),
                            ..Metadata::default()
                        },
                    )
                    .await?;
                }
                // if we failed to contact the bucket or anything else happened other than not
                // seeing the specific object, fail the check
                Err(e) => bail!(e),
            }
        }

        // this case should never reasonably happen with most buckets, and should be extremely
        // transient and only happen briefly when initially standing up the service with EC stores
        bail!("successfully put object but saw NotFound on pull 3 times");
    }
}

#[async_trait]
impl ObjectStore for S3StorageProvider {
    fn path_codec(&self) -> &PathCodec {
        &self.codec
    }

    async fn list(&self, prefix: &StorePath, directories_only: bool) -> StorageResult<Vec<StorePath>> {
        let prefix = prefix.as_dir();
        let keys = self
            .list_children(self.codec.key(&prefix)?, directories_only)
            .await?;
        keys.iter()
            .map(|key| self.codec.from_key(key).map_err(StorageError::from))
            .collect()
    }

    async fn read(&self, path: &StorePath) -> StorageResult<FileResponse> {
        if path.is_dir() {
            return Err(StorageError::NotFound);
        }
        self.pull_object(self.codec.key(path)?).await
    }

    async fn write(&self, path: &StorePath, data: Bytes, meta: Metadata) -> StorageResult<()> {
        let key = self.codec.key(path)?;
        if path.is_dir() {
            return Err(anyhow::anyhow!("cannot write an object at directory path {path}").into());
        }
        self.put_object(key, data.into(), meta).await
    }

    async fn exists(&self, path: &StorePath) -> StorageResult<bool> {
        match self.metadata(path).await {
            Ok(_) => Ok(true),
            Err(StorageError::NotFound) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn metadata(&self, path: &StorePath) -> StorageResult<ObjectMetadata> {
        if path.is_dir() {
            return Err(StorageError::NotFound);
        }
        self.head_object(self.codec.key(path)?).await
    }

    async fn healthcheck(&self) -> anyhow::Result<()> {
        self.healthcheck().await
    }
}
