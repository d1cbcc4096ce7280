use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use lading_api_types::storage::{PathError, StorageError};
use thiserror::Error;

pub type IndexResult<T> = Result<T, IndexError>;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Failed to find the resource")]
    NotFound,
    #[error("Requested a package, version or file name that can't be stored: {0}")]
    MalformedPath(#[from] PathError),
    #[error("Failed to render the index page")]
    Render(#[from] askama::Error),
    #[error("Encountered uncategorized error")]
    ServiceError(#[from] anyhow::Error),
}

impl From<StorageError> for IndexError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound => Self::NotFound,
            StorageError::MalformedPath(e) => Self::MalformedPath(e),
            StorageError::ServiceError(e) => Self::ServiceError(e),
        }
    }
}

impl IntoResponse for IndexError {
    fn into_response(self) -> Response {
        let code = match &self {
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::MalformedPath(_) => StatusCode::BAD_REQUEST,
            Self::Render(error) => {
                tracing::error!(?error, "Failed to render index page");

                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::ServiceError(error) => {
                tracing::error!(?error, "Encountered service error in index operation");

                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (code, self.to_string()).into_response()
    }
}
