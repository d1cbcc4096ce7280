#![allow(dead_code)]

use axum::body::{to_bytes, Body, Bytes};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use lading_api_types::storage::{Metadata, ObjectStore};
use lading_auth::fs_backend::{Config as FsAuthConfig, FsAuthProvider};
use lading_auth::Credentials;
use lading_server::{FallbackResolver, ServiceConfig, UpstreamConfig};
use lading_storage::fs::FsStorageProvider;
use std::io::Write;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tempfile::{NamedTempFile, TempDir};
use tower::ServiceExt;

pub const STORE_NAME: &str = "test-store";

// sha1("secret")
const SECRET_SHA1: &str = "e5e9fa1ba31ecd1ae84f75caaa474f3a663f05f4";

pub fn reader() -> Credentials {
    Credentials::new("reader", "secret")
}

pub fn writer() -> Credentials {
    Credentials::new("writer", "secret")
}

pub struct TestApp {
    pub router: Router,
    pub store_dir: TempDir,
    _accounts: NamedTempFile,
}

impl TestApp {
    /// A second handle on the same store, for seeding and inspecting it.
    pub fn store(&self) -> FsStorageProvider {
        FsStorageProvider::new(self.store_dir.path().to_path_buf(), STORE_NAME).unwrap()
    }

    pub async fn seed(&self, package: &str, version: &str, filename: &str, data: &[u8]) {
        let store = self.store();
        let path = store
            .path_codec()
            .package_path(package, Some(version), Some(filename))
            .unwrap();
        store
            .write(&path, Bytes::copy_from_slice(data), Metadata::default())
            .await
            .unwrap();
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, HeaderMap, Bytes) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), 10_000_000).await.unwrap();
        (status, headers, body)
    }

    pub async fn get(&self, uri: &str, credentials: Option<&Credentials>) -> (StatusCode, HeaderMap, Bytes) {
        let mut request = Request::builder().uri(uri);
        if let Some(credentials) = credentials {
            request = request.header(AUTHORIZATION, credentials.to_header_value());
        }
        self.send(request.body(Body::empty()).unwrap()).await
    }

    pub async fn upload(&self, form: &[(&str, &str)], file: Option<(&str, &[u8])>, credentials: &Credentials) -> (StatusCode, HeaderMap, Bytes) {
        let (content_type, body) = multipart_body(form, file);
        let request = Request::builder()
            .method("POST")
            .uri("/")
            .header(AUTHORIZATION, credentials.to_header_value())
            .header(CONTENT_TYPE, content_type)
            .body(Body::from(body))
            .unwrap();
        self.send(request).await
    }
}

const BOUNDARY: &str = "----lading-test-boundary";

/// A `multipart/form-data` body with text fields and an optional file in the `content` field.
pub fn multipart_body(form: &[(&str, &str)], file: Option<(&str, &[u8])>) -> (String, Vec<u8>) {
    let mut body = Vec::new();
    for (name, value) in form {
        write!(
            body,
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
        )
        .unwrap();
    }
    if let Some((filename, data)) = file {
        write!(
            body,
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"content\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .unwrap();
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    write!(body, "--{BOUNDARY}--\r\n").unwrap();
    (format!("multipart/form-data; boundary={BOUNDARY}"), body)
}

pub struct TestAppBuilder {
    config: ServiceConfig,
    upstream: UpstreamConfig,
}

impl Default for TestAppBuilder {
    fn default() -> Self {
        Self {
            config: ServiceConfig {
                address: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 3000),
                metrics_address: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 3001),
                auth_required: true,
                upload_size_limit: 1024 * 1024,
            },
            // nothing listens on port 1, so unexpected upstream calls fail loudly
            upstream: UpstreamConfig {
                url_template: "http://127.0.0.1:1/simple/{package}".to_owned(),
                ..UpstreamConfig::default()
            },
        }
    }
}

impl TestAppBuilder {
    pub fn auth_required(mut self, auth_required: bool) -> Self {
        self.config.auth_required = auth_required;
        self
    }

    pub fn upload_size_limit(mut self, limit: usize) -> Self {
        self.config.upload_size_limit = limit;
        self
    }

    /// Point the upstream index at e.g. a mock server.
    pub fn upstream_base(mut self, base: &str) -> Self {
        self.upstream.url_template = format!("{base}/simple/{{package}}");
        self
    }

    pub fn build(self) -> TestApp {
        let _ = tracing_subscriber::fmt::fmt().with_test_writer().try_init();

        let store_dir = tempfile::tempdir().unwrap();
        let store = FsStorageProvider::new(store_dir.path().to_path_buf(), STORE_NAME).unwrap();

        let mut accounts = NamedTempFile::new().unwrap();
        write!(
            accounts,
            r#"{{"accounts": [
                {{"username": "reader", "password": "{SECRET_SHA1}", "roles": []}},
                {{"username": "writer", "password": "{SECRET_SHA1}", "roles": ["write"]}}
            ]}}"#
        )
        .unwrap();
        let auth = FsAuthProvider::new(FsAuthConfig {
            auth_path: accounts.path().to_path_buf(),
        })
        .unwrap();

        let client = reqwest::Client::builder().build().unwrap();
        let upstream = FallbackResolver::new(client, self.upstream);

        TestApp {
            router: lading_server::router(self.config, store, auth, upstream),
            store_dir,
            _accounts: accounts,
        }
    }
}
