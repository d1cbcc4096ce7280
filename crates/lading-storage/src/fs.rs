use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lading_api_types::storage::{
    Bytes, FileResponse, Metadata, ObjectMetadata, ObjectStore, PathCodec, PathError,
    StorageError, StorageResult, StorePath,
};
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use tempfile::NamedTempFile;

/// Uploads are written here first and then renamed into place.
const STAGING_DIR: &str = ".staging";

/// Object store on a local directory tree, one file per object.
///
/// `root` plays the role of the bucket: the key `packages/foo/1.0/foo-1.0.tar.gz` is stored at
/// `root/packages/foo/1.0/foo-1.0.tar.gz`.
pub struct FsStorageProvider {
    root: PathBuf,
    staging: PathBuf,
    codec: PathCodec,
}

impl FsStorageProvider {
    pub fn new(root: PathBuf, store_name: &str) -> StorageResult<Self> {
        let codec = PathCodec::new(store_name)?;
        let staging = root.join(STAGING_DIR);
        std::fs::create_dir_all(&staging)?;
        Ok(Self {
            root,
            staging,
            codec,
        })
    }

    fn abs_path(&self, path: &StorePath) -> StorageResult<PathBuf> {
        let key = self.codec.key(path)?;
        let rel = Path::new(key.trim_end_matches('/'));
        if !rel.components().all(|c| matches!(c, Component::Normal(_))) {
            return Err(PathError::InvalidSegment(key.to_owned()).into());
        }
        Ok(self.root.join(rel))
    }

    fn file_metadata(&self, path: &StorePath) -> StorageResult<std::fs::Metadata> {
        if path.is_dir() {
            return Err(StorageError::NotFound);
        }
        let meta = std::fs::metadata(self.abs_path(path)?)?;
        if !meta.is_file() {
            return Err(StorageError::NotFound);
        }
        Ok(meta)
    }
}

#[async_trait]
impl ObjectStore for FsStorageProvider {
    fn path_codec(&self) -> &PathCodec {
        &self.codec
    }

    async fn list(&self, prefix: &StorePath, directories_only: bool) -> StorageResult<Vec<StorePath>> {
        let prefix = prefix.as_dir();
        let key_prefix = self.codec.key(&prefix)?;
        let dir = self.abs_path(&prefix)?;

        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            // nothing was ever written below this prefix
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut out = Vec::new();
        for e in entries {
            let e = e?;
            let ty = e.file_type()?;
            let Ok(name) = e.file_name().into_string() else {
                continue;
            };
            let key = if directories_only {
                if !ty.is_dir() || (key_prefix.is_empty() && name == STAGING_DIR) {
                    continue;
                }
                format!("{key_prefix}{name}/")
            } else {
                if !ty.is_file() {
                    continue;
                }
                format!("{key_prefix}{name}")
            };
            out.push(self.codec.from_key(&key)?);
        }
        out.sort();
        Ok(out)
    }

    async fn read(&self, path: &StorePath) -> StorageResult<FileResponse> {
        let meta = self.file_metadata(path)?;
        let data = std::fs::read(self.abs_path(path)?)?;
        Ok(FileResponse {
            last_modified: meta.modified().ok().map(DateTime::<Utc>::from),
            data: data.into(),
        })
    }

    async fn write(&self, path: &StorePath, data: Bytes, _meta: Metadata) -> StorageResult<()> {
        if path.is_dir() {
            return Err(PathError::InvalidSegment(path.to_string()).into());
        }
        let path = self.abs_path(path)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut tmp = NamedTempFile::new_in(&self.staging)?;
        tmp.write_all(&data)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path)
            .map_err(|e| StorageError::ServiceError(e.into()))?;
        Ok(())
    }

    async fn exists(&self, path: &StorePath) -> StorageResult<bool> {
        match self.file_metadata(path) {
            Ok(_) => Ok(true),
            Err(StorageError::NotFound) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn metadata(&self, path: &StorePath) -> StorageResult<ObjectMetadata> {
        let meta = self.file_metadata(path)?;
        Ok(ObjectMetadata {
            size: meta.len(),
            content_type: None,
            last_modified: meta.modified().ok().map(DateTime::<Utc>::from),
            etag: None,
        })
    }

    async fn healthcheck(&self) -> anyhow::Result<()> {
        if self.root.is_dir() && self.staging.is_dir() {
            Ok(())
        } else {
            anyhow::bail!("root not a dir")
        }
    }
}
