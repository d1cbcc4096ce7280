use crate::ServiceState;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use chrono::{DateTime, Utc};
use lading_api_types::storage::ObjectStore;
use lading_index::{IndexError, Package, PackageIndex, NOTHING_UPLOADED};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use std::sync::Arc;

pub fn packages_router<S, A>() -> Router<Arc<ServiceState<S, A>>>
where
    S: ObjectStore + Send + Sync + 'static,
    A: Send + Sync + 'static,
{
    Router::new()
        .route("/packages", get(list_packages))
        .route("/packages/:package", get(package_index))
        .route("/packages/:package/", get(package_index))
        .route("/packages/:package/:version", get(version_page))
        .route("/packages/:package/:version/", get(version_page))
        .route(
            "/packages/:package/:version/:filename",
            get(download).head(download_head),
        )
}

async fn list_packages<S, A>(State(state): State<Arc<ServiceState<S, A>>>) -> axum::response::Result<Response>
where
    S: ObjectStore + Send + Sync,
{
    let index = PackageIndex::all(&state.store);
    if index.empty().await? {
        return Ok(NOTHING_UPLOADED.into_response());
    }
    Ok(Html(index.render(false).await?).into_response())
}

/// Local versions of the package, or the upstream index page if there are none.
async fn package_index<S, A>(
    headers: HeaderMap,
    State(state): State<Arc<ServiceState<S, A>>>,
    Path(package): Path<String>,
) -> axum::response::Result<Response>
where
    S: ObjectStore + Send + Sync,
{
    let index = PackageIndex::named(&state.store, &package);
    match index.exists().await {
        Ok(true) => return Ok(Html(index.render(false).await?).into_response()),
        // a name that can't be stored locally can still be known upstream
        Ok(false) | Err(IndexError::MalformedPath(_)) => {}
        Err(e) => return Err(e.into()),
    }

    Ok(state.upstream.resolve(&package, &headers).await?)
}

async fn version_page<S, A>(
    State(state): State<Arc<ServiceState<S, A>>>,
    Path((package, version)): Path<(String, String)>,
) -> axum::response::Result<Response>
where
    S: ObjectStore + Send + Sync,
{
    let package = Package::new(&state.store, &package, &version).map_err(not_found)?;
    if !package.exists().await? {
        return Err(StatusCode::NOT_FOUND.into());
    }
    Ok(Html(package.render().await?).into_response())
}

async fn download<S, A>(
    State(state): State<Arc<ServiceState<S, A>>>,
    Path((package, version, filename)): Path<(String, String, String)>,
) -> axum::response::Result<Response>
where
    S: ObjectStore + Send + Sync,
{
    let package = Package::new(&state.store, &package, &version).map_err(not_found)?;
    let file = package.get_file(&filename).await.map_err(not_found)?;

    let mut res = Response::new(Body::from(file.data));
    insert_file_headers(res.headers_mut(), &filename, file.last_modified);
    Ok(res)
}

/// Download headers from the file's metadata, without reading the file.
async fn download_head<S, A>(
    State(state): State<Arc<ServiceState<S, A>>>,
    Path((package, version, filename)): Path<(String, String, String)>,
) -> axum::response::Result<Response>
where
    S: ObjectStore + Send + Sync,
{
    let package = Package::new(&state.store, &package, &version).map_err(not_found)?;
    let meta = package.file_metadata(&filename).await.map_err(not_found)?;

    let mut res = Response::new(Body::empty());
    let headers = res.headers_mut();
    insert_file_headers(headers, &filename, meta.last_modified);
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(meta.size));
    if let Some(etag) = meta.etag.and_then(|e| HeaderValue::try_from(e).ok()) {
        headers.insert(header::ETAG, etag);
    }
    Ok(res)
}

fn insert_file_headers(headers: &mut HeaderMap, filename: &str, last_modified: Option<DateTime<Utc>>) {
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    headers.insert(header::CONTENT_DISPOSITION, content_disposition(filename));
    if let Some(last_mod) = last_modified
        .and_then(|d| d.format("%a, %d %b %Y %H:%M:%S GMT").to_string().try_into().ok())
    {
        headers.insert(header::LAST_MODIFIED, last_mod);
    }
}

/// Names that can't be stored are as absent as names that weren't.
fn not_found(e: IndexError) -> Response {
    match e {
        IndexError::NotFound | IndexError::MalformedPath(_) => StatusCode::NOT_FOUND.into_response(),
        e => e.into_response(),
    }
}

/// `attachment` with the original filename, RFC 6266 style.
fn content_disposition(filename: &str) -> HeaderValue {
    let value = if filename
        .bytes()
        .all(|b| (b.is_ascii_graphic() && b != b'"' && b != b'\\') || b == b' ')
    {
        format!(r#"attachment; filename="{filename}""#)
    } else {
        let fallback: String = filename
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || ".-_".contains(c) { c } else { '_' })
            .collect();
        let encoded = utf8_percent_encode(filename, NON_ALPHANUMERIC);
        format!(r#"attachment; filename="{fallback}"; filename*=UTF-8''{encoded}"#)
    };
    HeaderValue::try_from(value).unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}
