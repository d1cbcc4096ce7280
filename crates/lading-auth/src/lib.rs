#![cfg_attr(docsrs, feature(doc_cfg))]

use async_trait::async_trait;
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::fmt;

#[cfg(feature = "yes-backend")]
#[cfg_attr(docsrs, doc(cfg(feature = "yes-backend")))]
pub mod yes_backend;

pub mod no_backend;

#[cfg(feature = "fs-backend")]
#[cfg_attr(docsrs, doc(cfg(feature = "fs-backend")))]
pub mod fs_backend;

mod error;

pub use error::*;

/// Role needed for anything that changes the index, i.e. uploads.
pub const WRITE_ROLE: &str = "write";

#[async_trait]
pub trait AuthProvider {
    type Config;

    async fn healthcheck(&self) -> anyhow::Result<()>;

    /// Verify that the credentials belong to a known account holding every one of
    /// `required_roles`. An empty slice only checks the credentials.
    async fn authorize(&self, credentials: &Credentials, required_roles: &[&str]) -> AuthResult<()>;

    /// `None` if the request carries no usable credentials, which callers answer with a login
    /// challenge rather than a rejection.
    fn credentials_from_headers(&self, headers: &HeaderMap) -> Option<Credentials> {
        default_credentials_from_headers(headers)
    }
}

/// Username and password from an HTTP Basic `Authorization` header.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Value for an `Authorization` header carrying these credentials.
    #[must_use]
    pub fn to_header_value(&self) -> String {
        let encoded = STANDARD.encode(format!("{}:{}", self.username, self.password));
        format!("Basic {encoded}")
    }
}

// keep passwords out of logs
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

pub(crate) fn default_credentials_from_headers(headers: &HeaderMap) -> Option<Credentials> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    if username.is_empty() || password.is_empty() {
        return None;
    }
    Some(Credentials::new(username, password))
}
