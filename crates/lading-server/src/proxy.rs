//! Forwarding of index requests to a public upstream index.
//!
//! Used only when the local store has nothing under the requested name. Local and upstream
//! listings are never merged.

use axum::body::Body;
use axum::http::header::HeaderName;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::BytesMut;
use metrics::counter;
use serde::Deserialize;
use std::collections::HashSet;
use thiserror::Error;

/// Size of the chunks an upstream body is pulled in, and the initial size of the buffer.
const CHUNK_SIZE: usize = 16 * 1024;

/// Headers describing the connection to one peer. The body is re-framed before it is sent on,
/// so these are dropped from upstream responses.
fn is_hop_by_hop(name: &HeaderName) -> bool {
    matches!(
        name.as_str(),
        "connection" | "keep-alive" | "transfer-encoding" | "te" | "trailer" | "upgrade" | "proxy-connection"
    )
}

#[derive(Clone, Debug, Deserialize)]
pub struct UpstreamConfig {
    /// Upstream location of a package's index page. `{package}` is replaced with the name.
    #[serde(default = "default_url_template")]
    pub url_template: String,
    /// Inbound headers that are never forwarded. Matched case-insensitively.
    #[serde(default = "default_excluded_headers")]
    pub excluded_headers: Vec<String>,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url_template: default_url_template(),
            excluded_headers: default_excluded_headers(),
        }
    }
}

fn default_url_template() -> String {
    "https://pypi.org/simple/{package}".into()
}

fn default_excluded_headers() -> Vec<String> {
    [
        "authorization",
        "x-appengine-auth-domain",
        "x-appengine-user-is-admin",
        "host",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("Failed to fetch the package index from upstream")]
    Upstream(#[from] reqwest::Error),
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let Self::Upstream(error) = &self;
        tracing::error!(?error, "Upstream index request failed");
        counter!("lading_upstream_requests_total", "status" => "error").increment(1);

        (StatusCode::BAD_GATEWAY, self.to_string()).into_response()
    }
}

/// Replays index requests for packages the store doesn't have against the upstream index.
pub struct FallbackResolver {
    client: reqwest::Client,
    url_template: String,
    excluded_headers: HashSet<HeaderName>,
}

impl FallbackResolver {
    /// The client should not decompress bodies, so that they are forwarded exactly as received.
    pub fn new(client: reqwest::Client, config: UpstreamConfig) -> Self {
        let excluded_headers = config
            .excluded_headers
            .iter()
            .filter_map(|name| match HeaderName::try_from(name.to_ascii_lowercase()) {
                Ok(name) => Some(name),
                Err(_) => {
                    tracing::warn!(%name, "Ignoring invalid header name in upstream.excluded_headers");
                    None
                }
            })
            .collect();

        Self {
            client,
            url_template: config.url_template,
            excluded_headers,
        }
    }

    #[must_use]
    pub fn upstream_url(&self, package: &str) -> String {
        self.url_template.replace("{package}", package)
    }

    /// Inbound headers minus the exclusion set.
    #[must_use]
    pub fn forwarded_headers(&self, inbound: &HeaderMap) -> HeaderMap {
        let mut headers = inbound.clone();
        for name in &self.excluded_headers {
            headers.remove(name);
        }
        headers
    }

    /// Fetches the upstream index page of `package`, answering with the upstream status,
    /// headers and body bytes. Error statuses from upstream are passed through, only failing
    /// to get any response at all is an error.
    pub async fn resolve(&self, package: &str, inbound: &HeaderMap) -> Result<Response, ProxyError> {
        let url = self.upstream_url(package);
        tracing::debug!(%url, "Proxying index request upstream");

        let mut upstream = self
            .client
            .get(&url)
            .headers(self.forwarded_headers(inbound))
            .send()
            .await?;

        let status = upstream.status();
        let mut headers = HeaderMap::with_capacity(upstream.headers().len());
        for (name, value) in upstream.headers() {
            if !is_hop_by_hop(name) {
                headers.append(name, value.clone());
            }
        }

        let mut body = BytesMut::with_capacity(CHUNK_SIZE);
        while let Some(chunk) = upstream.chunk().await? {
            body.extend_from_slice(&chunk);
        }

        counter!("lading_upstream_requests_total", "status" => status.as_u16().to_string())
            .increment(1);
        tracing::info!(%url, status = status.as_u16(), size = body.len(), "Served index from upstream");

        let mut response = Response::new(Body::from(body.freeze()));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }
}
