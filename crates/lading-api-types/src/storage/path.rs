//! Addressing of packages inside an object store.
//!
//! Every package file lives at `/{store}/packages/{package}/{version}/{filename}`, where
//! `{store}` is the identity of the backing bucket. Shorter paths address the enclosing
//! "directories": a package (one segment below the root) or a package version (two segments).
//! Directories only exist as far as object keys share a prefix, and listing them requires the
//! slash-terminated form of the path so that `foo/` does not also match `foobar/`.

use std::fmt;
use thiserror::Error;

const PACKAGES_DIR: &str = "packages";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("Store path must start with '/': {0:?}")]
    NotAbsolute(String),
    #[error("Store path contains an empty segment: {0:?}")]
    EmptySegment(String),
    #[error("Not a valid package, version or file name: {0:?}")]
    InvalidSegment(String),
    #[error("Path belongs to store {found:?}, but this store is {expected:?}")]
    StoreMismatch { expected: String, found: String },
    #[error("Path is outside of the packages root: {0:?}")]
    NotPackagePath(String),
    #[error("Path has {0} segments below the packages root, expected between 1 and 3")]
    SegmentCount(usize),
}

/// An absolute location in the object store, in its bit-exact string form.
///
/// A trailing `/` marks a directory. It is ignored when decoding, but kept for listings.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StorePath(String);

impl StorePath {
    pub fn parse(path: &str) -> Result<Self, PathError> {
        let Some(rest) = path.strip_prefix('/') else {
            return Err(PathError::NotAbsolute(path.to_owned()));
        };
        let body = rest.strip_suffix('/').unwrap_or(rest);
        if body.is_empty() || body.split('/').any(str::is_empty) {
            return Err(PathError::EmptySegment(path.to_owned()));
        }
        Ok(Self(path.to_owned()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.0.ends_with('/')
    }

    /// The slash-terminated form, used to scope listings to children of this path.
    #[must_use]
    pub fn as_dir(&self) -> Self {
        if self.is_dir() {
            self.clone()
        } else {
            Self(format!("{}/", self.0))
        }
    }

    /// The same location without the directory marker.
    #[must_use]
    pub fn trim_dir(&self) -> Self {
        match self.0.strip_suffix('/') {
            Some(trimmed) => Self(trimmed.to_owned()),
            None => self.clone(),
        }
    }

    /// Segments after the leading `/`, not including the empty directory marker.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        let body = &self.0[1..];
        body.strip_suffix('/').unwrap_or(body).split('/')
    }

    /// Last named segment, e.g. the filename of a file path or the version of a version path.
    #[must_use]
    pub fn file_name(&self) -> &str {
        self.segments().last().unwrap_or_default()
    }
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for StorePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// What a path under the packages root refers to, determined by its segment count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Index,
    Package,
    Version,
    File,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathComponents {
    pub package: String,
    pub version: Option<String>,
    pub filename: Option<String>,
}

/// Encodes package/version/filename triples as store paths of one particular store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathCodec {
    store: String,
}

impl PathCodec {
    pub fn new(store: impl Into<String>) -> Result<Self, PathError> {
        let store = store.into();
        validate_segment(&store)?;
        Ok(Self { store })
    }

    #[must_use]
    pub fn store_identity(&self) -> &str {
        &self.store
    }

    #[must_use]
    pub fn packages_root(&self) -> StorePath {
        StorePath(format!("/{}/{PACKAGES_DIR}", self.store))
    }

    /// Empty optional components count as absent, and a filename is only used together with
    /// a version.
    pub fn package_path(
        &self,
        package: &str,
        version: Option<&str>,
        filename: Option<&str>,
    ) -> Result<StorePath, PathError> {
        debug_assert!(
            filename.is_none_or(str::is_empty) || version.is_some_and(|v| !v.is_empty()),
            "filename given without a version"
        );

        let mut path = self.packages_root().0;
        push_segment(&mut path, package)?;
        if let Some(version) = version.filter(|v| !v.is_empty()) {
            push_segment(&mut path, version)?;
            if let Some(filename) = filename.filter(|f| !f.is_empty()) {
                push_segment(&mut path, filename)?;
            }
        }
        Ok(StorePath(path))
    }

    pub fn split_path(&self, path: &StorePath) -> Result<PathComponents, PathError> {
        let segments = self.package_segments(path)?;
        let mut segments = match segments.len() {
            1..=3 => segments.into_iter().map(str::to_owned),
            n => return Err(PathError::SegmentCount(n)),
        };
        Ok(PathComponents {
            package: segments.next().unwrap_or_default(),
            version: segments.next(),
            filename: segments.next(),
        })
    }

    pub fn entity_kind(&self, path: &StorePath) -> Result<EntityKind, PathError> {
        match self.package_segments(path)?.len() {
            0 => Ok(EntityKind::Index),
            1 => Ok(EntityKind::Package),
            2 => Ok(EntityKind::Version),
            3 => Ok(EntityKind::File),
            n => Err(PathError::SegmentCount(n)),
        }
    }

    /// The backend object key of a path: everything after the store identity segment.
    pub fn key<'p>(&self, path: &'p StorePath) -> Result<&'p str, PathError> {
        let rest = &path.0[1..];
        let (store, key) = rest.split_once('/').unwrap_or((rest, ""));
        self.check_store(store)?;
        Ok(key)
    }

    /// Inverse of [`PathCodec::key`], for keys reported by a backend listing.
    pub fn from_key(&self, key: &str) -> Result<StorePath, PathError> {
        StorePath::parse(&format!("/{}/{key}", self.store))
    }

    fn package_segments<'p>(&self, path: &'p StorePath) -> Result<Vec<&'p str>, PathError> {
        let mut segments = path.segments();
        self.check_store(segments.next().unwrap_or_default())?;
        if segments.next() != Some(PACKAGES_DIR) {
            return Err(PathError::NotPackagePath(path.to_string()));
        }
        Ok(segments.collect())
    }

    fn check_store(&self, found: &str) -> Result<(), PathError> {
        if found == self.store {
            Ok(())
        } else {
            Err(PathError::StoreMismatch {
                expected: self.store.clone(),
                found: found.to_owned(),
            })
        }
    }
}

fn push_segment(path: &mut String, segment: &str) -> Result<(), PathError> {
    validate_segment(segment)?;
    path.push('/');
    path.push_str(segment);
    Ok(())
}

fn validate_segment(segment: &str) -> Result<(), PathError> {
    if segment.is_empty()
        || segment == "."
        || segment == ".."
        || segment.contains('/')
        || segment.chars().any(char::is_control)
    {
        return Err(PathError::InvalidSegment(segment.to_owned()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> PathCodec {
        PathCodec::new("my-bucket").unwrap()
    }

    #[test]
    fn encodes_bit_exact_paths() {
        let codec = codec();
        assert_eq!(codec.packages_root().as_str(), "/my-bucket/packages");
        assert_eq!(
            codec.package_path("foo", None, None).unwrap().as_str(),
            "/my-bucket/packages/foo"
        );
        assert_eq!(
            codec.package_path("foo", Some("1.0"), None).unwrap().as_str(),
            "/my-bucket/packages/foo/1.0"
        );
        assert_eq!(
            codec
                .package_path("foo", Some("1.0"), Some("foo-1.0.tar.gz"))
                .unwrap()
                .as_str(),
            "/my-bucket/packages/foo/1.0/foo-1.0.tar.gz"
        );
    }

    #[test]
    fn empty_components_truncate_the_path() {
        let codec = codec();
        assert_eq!(
            codec.package_path("foo", Some(""), None).unwrap(),
            codec.package_path("foo", None, None).unwrap()
        );
        assert_eq!(
            codec.package_path("foo", Some("2.1"), Some("")).unwrap(),
            codec.package_path("foo", Some("2.1"), None).unwrap()
        );
    }

    #[test]
    fn split_inverts_package_path() {
        let codec = codec();
        let triples = [
            ("foo", None, None),
            ("foo", Some("1.0"), None),
            ("foo", Some("1.0"), Some("foo-1.0.tar.gz")),
            ("Some_Pkg.name", Some("2024.1rc1"), Some("Some_Pkg.name-2024.1rc1-py3-none-any.whl")),
        ];
        for (package, version, filename) in triples {
            let path = codec.package_path(package, version, filename).unwrap();
            let parts = codec.split_path(&path).unwrap();
            assert_eq!(parts.package, package);
            assert_eq!(parts.version.as_deref(), version);
            assert_eq!(parts.filename.as_deref(), filename);
        }
    }

    #[test]
    fn split_ignores_directory_marker() {
        let codec = codec();
        let dir = StorePath::parse("/my-bucket/packages/foo/1.0/").unwrap();
        assert!(dir.is_dir());
        let parts = codec.split_path(&dir).unwrap();
        assert_eq!(parts.package, "foo");
        assert_eq!(parts.version.as_deref(), Some("1.0"));
        assert_eq!(parts.filename, None);
        assert_eq!(codec.split_path(&dir.trim_dir()).unwrap(), parts);
    }

    #[test]
    fn split_rejects_bad_segment_counts() {
        let codec = codec();
        for (path, n) in [
            ("/my-bucket/packages", 0),
            ("/my-bucket/packages/", 0),
            ("/my-bucket/packages/a/b/c/d", 4),
            ("/my-bucket/packages/a/b/c/d/e/", 5),
        ] {
            let path = StorePath::parse(path).unwrap();
            assert_eq!(codec.split_path(&path), Err(PathError::SegmentCount(n)));
        }
    }

    #[test]
    fn split_checks_store_identity() {
        let codec = codec();
        let path = StorePath::parse("/other-bucket/packages/foo").unwrap();
        assert_eq!(
            codec.split_path(&path),
            Err(PathError::StoreMismatch {
                expected: "my-bucket".into(),
                found: "other-bucket".into(),
            })
        );
        let path = StorePath::parse("/my-bucket/uploads/foo").unwrap();
        assert!(matches!(
            codec.split_path(&path),
            Err(PathError::NotPackagePath(_))
        ));
    }

    #[test]
    fn rejects_unsafe_components() {
        let codec = codec();
        for bad in ["", ".", "..", "a/b", "tab\there"] {
            assert!(matches!(
                codec.package_path(bad, None, None),
                Err(PathError::InvalidSegment(_))
            ));
        }
        assert!(codec.package_path("foo", Some(".."), None).is_err());
        assert!(codec.package_path("foo", Some("1.0"), Some("../../x")).is_err());
    }

    #[test]
    fn parse_rejects_relative_and_hollow_paths() {
        assert!(matches!(
            StorePath::parse("my-bucket/packages"),
            Err(PathError::NotAbsolute(_))
        ));
        assert!(matches!(
            StorePath::parse("/my-bucket//packages"),
            Err(PathError::EmptySegment(_))
        ));
        assert!(matches!(StorePath::parse("/"), Err(PathError::EmptySegment(_))));
    }

    #[test]
    fn listing_prefix_is_slash_terminated() {
        let codec = codec();
        let foo = codec.package_path("foo", None, None).unwrap().as_dir();
        let foobar = codec.package_path("foobar", Some("1.0"), None).unwrap();
        assert_eq!(foo.as_str(), "/my-bucket/packages/foo/");
        assert!(!foobar.as_str().starts_with(foo.as_str()));
        assert_eq!(foo.as_dir(), foo);
    }

    #[test]
    fn entity_kind_follows_segment_count() {
        let codec = codec();
        let kind = |p: &str| codec.entity_kind(&StorePath::parse(p).unwrap());
        assert_eq!(kind("/my-bucket/packages/"), Ok(EntityKind::Index));
        assert_eq!(kind("/my-bucket/packages/foo/"), Ok(EntityKind::Package));
        assert_eq!(kind("/my-bucket/packages/foo/1.0"), Ok(EntityKind::Version));
        assert_eq!(kind("/my-bucket/packages/foo/1.0/f.whl"), Ok(EntityKind::File));
        assert_eq!(kind("/my-bucket/packages/a/b/c/d"), Err(PathError::SegmentCount(4)));
    }

    #[test]
    fn keys_map_back_to_paths() {
        let codec = codec();
        let path = codec.package_path("foo", Some("1.0"), Some("f.whl")).unwrap();
        assert_eq!(codec.key(&path).unwrap(), "packages/foo/1.0/f.whl");
        assert_eq!(codec.from_key("packages/foo/1.0/f.whl").unwrap(), path);
        assert_eq!(
            codec.from_key("packages/foo/").unwrap().as_str(),
            "/my-bucket/packages/foo/"
        );
        let foreign = StorePath::parse("/elsewhere/packages/foo").unwrap();
        assert!(codec.key(&foreign).is_err());
    }
}
