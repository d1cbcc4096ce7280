use axum::body::Body;
use axum::extract::{DefaultBodyLimit, MatchedPath, Request, State};
use axum::http::{Method, StatusCode};
use axum::middleware::{from_fn, from_fn_with_state, Next};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use lading_api_types::storage::ObjectStore;
use lading_auth::{AuthError, AuthProvider, WRITE_ROLE};
use metrics::{counter, histogram};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tokio::try_join;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::classify::StatusInRangeAsFailures;
use tower_http::trace::{DefaultOnFailure, TraceLayer};

pub mod packages;

pub mod proxy;

pub mod pypi;

pub mod upload;

pub use proxy::{FallbackResolver, ProxyError, UpstreamConfig};

#[derive(Clone, Deserialize)]
pub struct ServiceConfig {
    pub address: SocketAddr,
    pub metrics_address: SocketAddr,

    /// Require Basic credentials for every request except the healthcheck.
    #[serde(default = "default_true")]
    pub auth_required: bool,

    /// Largest accepted upload request body, in bytes.
    #[serde(default = "default_upload_size_limit")]
    pub upload_size_limit: usize,
}

pub struct ServiceState<S, A> {
    pub config: ServiceConfig,
    pub store: S,
    pub auth: A,
    pub upstream: FallbackResolver,
}

impl<S, A> ServiceState<S, A> {
    pub fn new(config: ServiceConfig, store: S, auth: A, upstream: FallbackResolver) -> Self {
        Self {
            config,
            store,
            auth,
            upstream,
        }
    }
}

pub fn router<S, A>(
    config: ServiceConfig,
    store: S,
    auth_client: A,
    upstream: FallbackResolver,
) -> Router
where
    S: ObjectStore + Send + Sync + 'static,
    A: AuthProvider + Send + Sync + 'static,
{
    let upload_size_limit = config.upload_size_limit;
    let state = Arc::new(ServiceState::new(config, store, auth_client, upstream));

    Router::new()
        .route("/", get(landing).post(upload::upload::<S, A>))
        .merge(packages::packages_router::<S, A>())
        .merge(pypi::pypi_router::<S, A>())
        .route_layer(from_fn_with_state(state.clone(), auth_guard::<S, A>))
        .route("/healthcheck", get(healthcheck::<S, A>))
        .layer(DefaultBodyLimit::max(upload_size_limit))
        .with_state(state)
        .fallback(handle_global_fallback)
        .layer(CatchPanicLayer::custom(|_| {
            counter!("panics_total").increment(1);

            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }))
        .layer(
            TraceLayer::new(StatusInRangeAsFailures::new(400..=599).into_make_classifier())
                .make_span_with(|request: &Request<Body>| {
                    let method = request.method();
                    let uri = request.uri();

                    tracing::info_span!("http-request", ?method, ?uri)
                })
                .on_failure(DefaultOnFailure::new()),
        )
        .layer(from_fn(metrics_layer))
}

async fn metrics_layer(request: Request, next: Next) -> Response {
    let timer = Instant::now();

    let path = if let Some(path) = request.extensions().get::<MatchedPath>() {
        path.as_str().to_string()
    } else {
        request.uri().path().to_string()
    };

    let response = next.run(request).await;

    let elapsed = timer.elapsed();

    let code = response.status().as_u16().to_string();

    histogram!("request_duration_seconds", "code" => code, "endpoint" => path)
        .record(elapsed);

    response
}

/// Reading needs any valid account, everything else the write role.
async fn auth_guard<S, A>(
    State(state): State<Arc<ServiceState<S, A>>>,
    request: Request,
    next: Next,
) -> Response
where
    A: AuthProvider + Send + Sync,
{
    if state.config.auth_required {
        let required_roles: &[&str] = match *request.method() {
            Method::GET | Method::HEAD => &[],
            _ => &[WRITE_ROLE],
        };

        let Some(credentials) = state.auth.credentials_from_headers(request.headers()) else {
            return AuthError::Unauthorized.into_response();
        };
        if let Err(e) = state.auth.authorize(&credentials, required_roles).await {
            tracing::debug!(username = %credentials.username, "Rejected request: {e}");
            return e.into_response();
        }
    }

    next.run(request).await
}

async fn landing() -> Html<&'static str> {
    Html(r#"<a href="/packages">packages</a>"#)
}

async fn healthcheck<S, A>(State(state): State<Arc<ServiceState<S, A>>>) -> axum::response::Result<String>
where
    S: ObjectStore + Sync,
    A: AuthProvider + Sync,
{
    let check_time = Duration::from_secs(4);
    let label = |label, res: Result<Result<(), anyhow::Error>, _>| match res {
        // healthcheck is unauthenticated and shouldn't leak internals via errors
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            for e in e.chain() {
                tracing::error!("{label} healthcheck: {e}");
            }
            Err(format!("{label} failed"))
        },
        Err(_) => Err(format!("{label} timed out")),
    };

    try_join! {
        async { label("auth", timeout(check_time, state.auth.healthcheck()).await) },
        async { label("storage", timeout(check_time, state.store.healthcheck()).await) },
    }
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e))?;

    Ok("OK".into())
}

pub async fn handle_global_fallback() -> StatusCode {
    StatusCode::NOT_FOUND
}

#[inline(always)]
fn default_true() -> bool {
    true
}

fn default_upload_size_limit() -> usize {
    100 * 1024 * 1024
}
