use crate::render::{package_href, Link, LinksPage};
use crate::IndexResult;
use askama::Template;
use lading_api_types::storage::{
    Bytes, FileResponse, Metadata, ObjectMetadata, ObjectStore, PathError, StorePath,
};

/// One `(name, version)` of a package and the files uploaded under it.
pub struct Package<'s, S: ?Sized> {
    store: &'s S,
    name: String,
    version: String,
    dir: StorePath,
}

impl<'s, S> Package<'s, S>
where
    S: ObjectStore + Send + Sync + ?Sized,
{
    pub fn new(store: &'s S, name: &str, version: &str) -> IndexResult<Self> {
        if version.is_empty() {
            return Err(PathError::InvalidSegment(version.to_owned()).into());
        }
        let dir = store.path_codec().package_path(name, Some(version), None)?;
        Ok(Self {
            store,
            name: name.to_owned(),
            version: version.to_owned(),
            dir,
        })
    }

    fn file_path(&self, filename: &str) -> IndexResult<StorePath> {
        if filename.is_empty() {
            return Err(PathError::InvalidSegment(filename.to_owned()).into());
        }
        Ok(self
            .store
            .path_codec()
            .package_path(&self.name, Some(&self.version), Some(filename))?)
    }

    /// At least one file was uploaded for this version.
    pub async fn exists(&self) -> IndexResult<bool> {
        Ok(!self.store.list(&self.dir, false).await?.is_empty())
    }

    pub async fn files(&self) -> IndexResult<Vec<String>> {
        Ok(self
            .store
            .list(&self.dir, false)
            .await?
            .iter()
            .map(|path| path.file_name().to_owned())
            .collect())
    }

    /// Fails with [`IndexError::NotFound`](crate::IndexError::NotFound) when the file is
    /// missing, including when it vanished after a listing showed it.
    pub async fn get_file(&self, filename: &str) -> IndexResult<FileResponse> {
        Ok(self.store.read(&self.file_path(filename)?).await?)
    }

    /// Size, type and modification time of a file, without reading it.
    pub async fn file_metadata(&self, filename: &str) -> IndexResult<ObjectMetadata> {
        Ok(self.store.metadata(&self.file_path(filename)?).await?)
    }

    /// Stores `content` under `filename`, replacing whatever was there.
    pub async fn put_file(&self, filename: &str, content: Bytes) -> IndexResult<()> {
        let path = self.file_path(filename)?;
        let meta = Metadata {
            content_type: Some("application/octet-stream"),
            content_length: Some(content.len()),
            ..Metadata::default()
        };
        self.store.write(&path, content, meta).await?;

        tracing::info!(package = %self.name, version = %self.version, filename, "Stored package file");
        Ok(())
    }

    pub async fn render(&self) -> IndexResult<String> {
        let links = self
            .files()
            .await?
            .into_iter()
            .map(|file| Link {
                href: package_href(&[&self.name, &self.version, &file]),
                text: file,
            })
            .collect();
        let title = format!("{} {}", self.name, self.version);
        Ok(LinksPage {
            title: &title,
            links,
        }
        .render()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{IndexError, PackageIndex};
    use lading_storage::fs::FsStorageProvider;

    fn store() -> (tempfile::TempDir, FsStorageProvider) {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStorageProvider::new(dir.path().into(), "test-store").unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn upload_makes_package_visible() {
        let (_dir, store) = store();
        let package = Package::new(&store, "foo", "1.0").unwrap();
        assert!(!package.exists().await.unwrap());
        assert!(PackageIndex::all(&store).empty().await.unwrap());

        package
            .put_file("foo-1.0.tar.gz", Bytes::from_static(b"\x1f\x8bcontents"))
            .await
            .unwrap();

        assert!(package.exists().await.unwrap());
        assert_eq!(package.files().await.unwrap(), ["foo-1.0.tar.gz"]);
        assert_eq!(
            PackageIndex::all(&store).package_names().await.unwrap(),
            ["foo"]
        );

        let file = package.get_file("foo-1.0.tar.gz").await.unwrap();
        assert_eq!(file.data.as_ref(), b"\x1f\x8bcontents");
        assert_eq!(
            package.file_metadata("foo-1.0.tar.gz").await.unwrap().size,
            10
        );
    }

    #[tokio::test]
    async fn last_write_wins() {
        let (_dir, store) = store();
        let package = Package::new(&store, "foo", "1.0").unwrap();
        package.put_file("f.whl", Bytes::from_static(b"one")).await.unwrap();
        package.put_file("f.whl", Bytes::from_static(b"two")).await.unwrap();
        assert_eq!(package.get_file("f.whl").await.unwrap().data.as_ref(), b"two");
        assert_eq!(package.files().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_files_are_not_found() {
        let (_dir, store) = store();
        let package = Package::new(&store, "foo", "1.0").unwrap();
        assert!(matches!(
            package.get_file("foo-1.0.tar.gz").await,
            Err(IndexError::NotFound)
        ));
        assert!(matches!(
            package.file_metadata("foo-1.0.tar.gz").await,
            Err(IndexError::NotFound)
        ));
    }

    #[tokio::test]
    async fn rejects_unstorable_components() {
        let (_dir, store) = store();
        assert!(matches!(
            Package::new(&store, "foo", ""),
            Err(IndexError::MalformedPath(_))
        ));
        assert!(matches!(
            Package::new(&store, "../etc", "1.0"),
            Err(IndexError::MalformedPath(_))
        ));
        let package = Package::new(&store, "foo", "1.0").unwrap();
        assert!(matches!(
            package.put_file("../../passwd", Bytes::new()).await,
            Err(IndexError::MalformedPath(_))
        ));
        assert!(matches!(
            package.put_file("", Bytes::new()).await,
            Err(IndexError::MalformedPath(_))
        ));
    }

    #[tokio::test]
    async fn renders_download_links() {
        let (_dir, store) = store();
        let package = Package::new(&store, "foo", "1.0").unwrap();
        package.put_file("foo-1.0.tar.gz", Bytes::new()).await.unwrap();

        let html = package.render().await.unwrap();
        assert!(html.contains(r#"<a href="/packages/foo/1.0/foo-1.0.tar.gz">foo-1.0.tar.gz</a>"#));
    }
}
