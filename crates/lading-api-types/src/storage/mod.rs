pub use bytes::Bytes;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

pub use error::{StorageError, StorageResult};
pub use path::{EntityKind, PathCodec, PathComponents, PathError, StorePath};

mod error;
mod path;

/// Hints passed along with a write.
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    pub content_type: Option<&'static str>,
    pub content_length: Option<usize>,
    pub cache_control: Option<String>,
    pub kv: HashMap<String, String>,
}

/// What the backend knows about a stored object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectMetadata {
    pub size: u64,
    pub content_type: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
    pub etag: Option<String>,
}

/// Full content of an object. `data` can be cloned and re-read from the start at will.
#[derive(Debug, Clone)]
pub struct FileResponse {
    pub last_modified: Option<DateTime<Utc>>,
    pub data: Bytes,
}

/// Hierarchical view over a flat, key-addressed object store.
///
/// Implementations are thin adapters over one storage service. They never retry; transport and
/// credential failures come back as [`StorageError::ServiceError`].
#[async_trait]
pub trait ObjectStore {
    /// Codec for the store this backend talks to. Paths of other stores are rejected.
    fn path_codec(&self) -> &PathCodec;

    /// Immediate children of `prefix`, sorted. Directories end in `/`.
    ///
    /// With `directories_only`, only directory children are returned, otherwise only objects.
    async fn list(&self, prefix: &StorePath, directories_only: bool) -> StorageResult<Vec<StorePath>>;

    /// Fails with [`StorageError::NotFound`] if there is no object at exactly `path`.
    async fn read(&self, path: &StorePath) -> StorageResult<FileResponse>;

    /// Replaces any existing object at `path`. Either the whole body is stored or nothing is.
    async fn write(&self, path: &StorePath, data: Bytes, meta: Metadata) -> StorageResult<()>;

    /// `false` for directories, which are not objects.
    async fn exists(&self, path: &StorePath) -> StorageResult<bool>;

    async fn metadata(&self, path: &StorePath) -> StorageResult<ObjectMetadata>;

    async fn healthcheck(&self) -> anyhow::Result<()>;
}

macro_rules! delegate_object_store {
    ($ptr:ident) => {
        #[async_trait]
        impl<T: ObjectStore + Send + Sync + ?Sized> ObjectStore for $ptr<T> {
            fn path_codec(&self) -> &PathCodec {
                (**self).path_codec()
            }

            async fn list(&self, prefix: &StorePath, directories_only: bool) -> StorageResult<Vec<StorePath>> {
                (**self).list(prefix, directories_only).await
            }

            async fn read(&self, path: &StorePath) -> StorageResult<FileResponse> {
                (**self).read(path).await
            }

            async fn write(&self, path: &StorePath, data: Bytes, meta: Metadata) -> StorageResult<()> {
                (**self).write(path, data, meta).await
            }

            async fn exists(&self, path: &StorePath) -> StorageResult<bool> {
                (**self).exists(path).await
            }

            async fn metadata(&self, path: &StorePath) -> StorageResult<ObjectMetadata> {
                (**self).metadata(path).await
            }

            async fn healthcheck(&self) -> anyhow::Result<()> {
                (**self).healthcheck().await
            }
        }
    };
}

delegate_object_store!(Box);
delegate_object_store!(Arc);
