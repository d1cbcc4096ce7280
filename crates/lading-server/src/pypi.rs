//! The simple index that installers are pointed at.

use crate::ServiceState;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use lading_api_types::storage::ObjectStore;
use lading_index::{IndexError, PackageIndex};
use std::sync::Arc;

pub fn pypi_router<S, A>() -> Router<Arc<ServiceState<S, A>>>
where
    S: ObjectStore + Send + Sync + 'static,
    A: Send + Sync + 'static,
{
    Router::new()
        .route("/pypi/", get(full_index))
        .route("/pypi/*package", get(package_index))
}

async fn full_index<S, A>(State(state): State<Arc<ServiceState<S, A>>>) -> axum::response::Result<Html<String>>
where
    S: ObjectStore + Send + Sync,
{
    Ok(Html(PackageIndex::all(&state.store).render(true).await?))
}

/// Every local file of the package, or the upstream page when there are none.
///
/// Installers ask for `/pypi/{name}/`. The slash is dropped for the local lookup but kept in
/// the upstream request.
async fn package_index<S, A>(
    headers: HeaderMap,
    State(state): State<Arc<ServiceState<S, A>>>,
    Path(package): Path<String>,
) -> axum::response::Result<Response>
where
    S: ObjectStore + Send + Sync,
{
    let name = package.strip_suffix('/').unwrap_or(&package);
    let index = PackageIndex::named(&state.store, name);
    match index.exists().await {
        Ok(true) => return Ok(Html(index.render(true).await?).into_response()),
        Ok(false) | Err(IndexError::MalformedPath(_)) => {}
        Err(e) => return Err(e.into()),
    }

    Ok(state.upstream.resolve(&package, &headers).await?)
}
