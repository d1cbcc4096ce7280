use crate::render::{dir_href, package_href, FullIndexPage, Link, LinksPage, Section};
use crate::{IndexError, IndexResult};
use askama::Template;
use lading_api_types::storage::{ObjectStore, StorePath};

/// Files stored under one `(name, version)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageVersion {
    pub name: String,
    pub version: String,
    pub files: Vec<String>,
}

/// All versions of one package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageListing {
    pub name: String,
    pub versions: Vec<PackageVersion>,
}

/// The whole catalog, or the versions of a single package when built with a name.
pub struct PackageIndex<'s, S: ?Sized> {
    store: &'s S,
    name: Option<String>,
}

impl<'s, S> PackageIndex<'s, S>
where
    S: ObjectStore + Send + Sync + ?Sized,
{
    pub fn all(store: &'s S) -> Self {
        Self { store, name: None }
    }

    pub fn named(store: &'s S, name: &str) -> Self {
        Self {
            store,
            name: Some(name.to_owned()),
        }
    }

    /// The packages root, or the package's directory for a named index.
    fn prefix(&self) -> IndexResult<StorePath> {
        let codec = self.store.path_codec();
        match &self.name {
            Some(name) => Ok(codec.package_path(name, None, None)?),
            None => Ok(codec.packages_root()),
        }
    }

    /// No package directories in the store, or no version directories for a named index.
    pub async fn empty(&self) -> IndexResult<bool> {
        let children = self.store.list(&self.prefix()?, true).await?;
        Ok(children.is_empty())
    }

    pub async fn exists(&self) -> IndexResult<bool> {
        Ok(!self.empty().await?)
    }

    pub async fn package_names(&self) -> IndexResult<Vec<String>> {
        if let Some(name) = &self.name {
            return Ok(if self.exists().await? {
                vec![name.clone()]
            } else {
                Vec::new()
            });
        }

        let codec = self.store.path_codec();
        let dirs = self.store.list(&codec.packages_root(), true).await?;
        dirs.iter()
            .map(|dir| Ok(codec.split_path(dir)?.package))
            .collect()
    }

    /// Versions with their files, grouped by package in listing order.
    pub async fn listing(&self) -> IndexResult<Vec<PackageListing>> {
        let names = match &self.name {
            Some(name) => vec![name.clone()],
            None => self.package_names().await?,
        };

        let mut listing = Vec::with_capacity(names.len());
        for name in names {
            let versions = self.versions_of(&name).await?;
            if !versions.is_empty() {
                listing.push(PackageListing { name, versions });
            }
        }
        Ok(listing)
    }

    pub async fn versions(&self) -> IndexResult<Vec<PackageVersion>> {
        Ok(self
            .listing()
            .await?
            .into_iter()
            .flat_map(|package| package.versions)
            .collect())
    }

    async fn versions_of(&self, name: &str) -> IndexResult<Vec<PackageVersion>> {
        let codec = self.store.path_codec();
        let package_dir = codec.package_path(name, None, None)?;

        let mut versions = Vec::new();
        for dir in self.store.list(&package_dir, true).await? {
            let parts = codec.split_path(&dir)?;
            let Some(version) = parts.version else {
                continue;
            };
            let files = self
                .store
                .list(&dir, false)
                .await?
                .iter()
                .map(|file| file.file_name().to_owned())
                .collect();
            versions.push(PackageVersion {
                name: parts.package,
                version,
                files,
            });
        }
        Ok(versions)
    }

    /// With `full_index`, every file of every version, grouped by package and linked for
    /// download. Otherwise a summary: package names for the whole catalog, or version pages
    /// for a single package.
    pub async fn render(&self, full_index: bool) -> IndexResult<String> {
        if full_index {
            return self.render_full().await;
        }

        let html = match &self.name {
            Some(name) => {
                let links = self
                    .versions()
                    .await?
                    .into_iter()
                    .map(|v| Link {
                        href: dir_href(&[name, &v.version]),
                        text: v.version,
                    })
                    .collect();
                let title = format!("Versions of {name}");
                LinksPage {
                    title: &title,
                    links,
                }
                .render()?
            }
            None => {
                let links = self
                    .package_names()
                    .await?
                    .into_iter()
                    .map(|name| Link {
                        href: dir_href(&[&name]),
                        text: name,
                    })
                    .collect();
                LinksPage {
                    title: "Packages",
                    links,
                }
                .render()?
            }
        };
        Ok(html)
    }

    async fn render_full(&self) -> IndexResult<String> {
        let sections = self
            .listing()
            .await?
            .into_iter()
            .map(|package| Section {
                links: package
                    .versions
                    .iter()
                    .flat_map(|v| {
                        v.files.iter().map(|file| Link {
                            href: package_href(&[&v.name, &v.version, file]),
                            text: file.clone(),
                        })
                    })
                    .collect(),
                name: package.name,
            })
            .collect();

        let title = match &self.name {
            Some(name) => format!("Links for {name}"),
            None => "Simple index".to_owned(),
        };
        FullIndexPage {
            title: &title,
            sections,
        }
        .render()
        .map_err(IndexError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lading_api_types::storage::{Bytes, Metadata};
    use lading_storage::fs::FsStorageProvider;

    async fn store_with(files: &[(&str, &str, &str)]) -> (tempfile::TempDir, FsStorageProvider) {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStorageProvider::new(dir.path().into(), "test-store").unwrap();
        for (name, version, file) in files {
            let path = store
                .path_codec()
                .package_path(name, Some(version), Some(file))
                .unwrap();
            store
                .write(&path, Bytes::from_static(b"data"), Metadata::default())
                .await
                .unwrap();
        }
        (dir, store)
    }

    #[tokio::test]
    async fn empty_store() {
        let (_dir, store) = store_with(&[]).await;
        let index = PackageIndex::all(&store);
        assert!(index.empty().await.unwrap());
        assert!(!index.exists().await.unwrap());
        assert!(index.package_names().await.unwrap().is_empty());
        assert!(index.listing().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn absent_package_does_not_exist() {
        let (_dir, store) = store_with(&[("foo", "1.0", "foo-1.0.tar.gz")]).await;
        let index = PackageIndex::named(&store, "absent-package");
        assert!(!index.exists().await.unwrap());
        assert!(index.empty().await.unwrap());
        assert!(index.package_names().await.unwrap().is_empty());

        // prefix scoping: "foo" exists, "fo" does not
        assert!(!PackageIndex::named(&store, "fo").exists().await.unwrap());
        assert!(PackageIndex::named(&store, "foo").exists().await.unwrap());
    }

    #[tokio::test]
    async fn unusable_names_are_malformed() {
        let (_dir, store) = store_with(&[]).await;
        let index = PackageIndex::named(&store, "a/b");
        assert!(matches!(
            index.exists().await,
            Err(IndexError::MalformedPath(_))
        ));
    }

    #[tokio::test]
    async fn lists_packages_versions_and_files() {
        let (_dir, store) = store_with(&[
            ("foo", "1.0", "foo-1.0.tar.gz"),
            ("foo", "1.0", "foo-1.0-py3-none-any.whl"),
            ("foo", "1.1", "foo-1.1.tar.gz"),
            ("bar", "0.1", "bar-0.1.tar.gz"),
        ])
        .await;

        let all = PackageIndex::all(&store);
        assert_eq!(all.package_names().await.unwrap(), ["bar", "foo"]);

        let foo = PackageIndex::named(&store, "foo");
        assert_eq!(foo.package_names().await.unwrap(), ["foo"]);
        assert_eq!(
            foo.versions().await.unwrap(),
            [
                PackageVersion {
                    name: "foo".into(),
                    version: "1.0".into(),
                    files: vec!["foo-1.0-py3-none-any.whl".into(), "foo-1.0.tar.gz".into()],
                },
                PackageVersion {
                    name: "foo".into(),
                    version: "1.1".into(),
                    files: vec!["foo-1.1.tar.gz".into()],
                },
            ]
        );

        let listing = all.listing().await.unwrap();
        assert_eq!(listing.len(), 2);
        assert_eq!(listing[0].name, "bar");
        assert_eq!(listing[1].versions.len(), 2);
    }

    #[tokio::test]
    async fn summary_lists_package_names_only() {
        let (_dir, store) = store_with(&[
            ("foo", "1.0", "foo-1.0.tar.gz"),
            ("bar", "0.1", "bar-0.1.tar.gz"),
        ])
        .await;

        let html = PackageIndex::all(&store).render(false).await.unwrap();
        assert!(html.contains(r#"<a href="/packages/foo/">foo</a>"#));
        assert!(html.contains(r#"<a href="/packages/bar/">bar</a>"#));
        assert!(!html.contains("foo-1.0.tar.gz"));
    }

    #[tokio::test]
    async fn package_summary_links_versions() {
        let (_dir, store) = store_with(&[
            ("foo", "1.0", "foo-1.0.tar.gz"),
            ("foo", "2.0", "foo-2.0.tar.gz"),
        ])
        .await;

        let html = PackageIndex::named(&store, "foo").render(false).await.unwrap();
        assert!(html.contains(r#"<a href="/packages/foo/1.0/">1.0</a>"#));
        assert!(html.contains(r#"<a href="/packages/foo/2.0/">2.0</a>"#));
    }

    #[tokio::test]
    async fn full_index_links_every_file() {
        let (_dir, store) = store_with(&[
            ("foo", "1.0", "foo-1.0.tar.gz"),
            ("foo", "2.0", "foo-2.0.tar.gz"),
            ("bar", "0.1", "bar-0.1.tar.gz"),
        ])
        .await;

        let html = PackageIndex::all(&store).render(true).await.unwrap();
        assert!(html.contains("<h2>bar</h2>"));
        assert!(html.contains("<h2>foo</h2>"));
        for (name, version, file) in [
            ("foo", "1.0", "foo-1.0.tar.gz"),
            ("foo", "2.0", "foo-2.0.tar.gz"),
            ("bar", "0.1", "bar-0.1.tar.gz"),
        ] {
            assert!(html.contains(&format!(
                r#"<a href="/packages/{name}/{version}/{file}">{file}</a>"#
            )));
        }
        // grouped by package
        assert!(html.find("<h2>bar</h2>").unwrap() < html.find("bar-0.1.tar.gz").unwrap());
        assert!(html.find("bar-0.1.tar.gz").unwrap() < html.find("<h2>foo</h2>").unwrap());

        let html = PackageIndex::named(&store, "foo").render(true).await.unwrap();
        assert!(html.contains("Links for foo"));
        assert!(html.contains("foo-2.0.tar.gz"));
        assert!(!html.contains("bar-0.1.tar.gz"));
    }
}
