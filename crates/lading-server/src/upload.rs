use crate::ServiceState;
use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use lading_api_types::storage::ObjectStore;
use lading_index::{IndexError, Package};
use metrics::counter;
use std::sync::Arc;

/// Value of the `:action` field for a file upload.
const FILE_UPLOAD_ACTION: &str = "file_upload";

/// The fields of an upload form this index cares about. Anything else is read and dropped.
#[derive(Default)]
struct UploadForm {
    name: Option<String>,
    version: Option<String>,
    action: Option<String>,
    content: Option<(String, Bytes)>,
}

impl UploadForm {
    async fn read(multipart: &mut Multipart) -> axum::response::Result<Self> {
        let mut form = Self::default();
        while let Some(field) = multipart.next_field().await? {
            let Some(field_name) = field.name().map(str::to_owned) else {
                continue;
            };
            match field_name.as_str() {
                "name" => form.name = Some(field.text().await?),
                "version" => form.version = Some(field.text().await?),
                ":action" => form.action = Some(field.text().await?),
                "content" => {
                    // a content field without a filename is not a file
                    if let Some(filename) = field.file_name().map(str::to_owned) {
                        form.content = Some((filename, field.bytes().await?));
                    }
                }
                _ => {
                    field.bytes().await?;
                }
            }
        }
        Ok(form)
    }

    /// `None` unless every part of a file upload is present.
    fn into_upload(self) -> Option<(String, String, String, Bytes)> {
        let name = self.name.filter(|n| !n.is_empty())?;
        let version = self.version.filter(|v| !v.is_empty())?;
        if self.action.as_deref() != Some(FILE_UPLOAD_ACTION) {
            return None;
        }
        let (filename, data) = self.content?;
        Some((name, version, filename, data))
    }
}

/// Upload endpoint compatible with `twine` and `setup.py upload`.
///
/// Incomplete forms, and bodies that are not multipart forms at all, are acknowledged and
/// ignored.
pub async fn upload<S, A>(
    State(state): State<Arc<ServiceState<S, A>>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> axum::response::Result<Response>
where
    S: ObjectStore + Send + Sync,
{
    let mut multipart = match multipart {
        Ok(multipart) => multipart,
        Err(rejection) => {
            tracing::debug!("Ignoring upload request without a multipart form: {rejection}");
            return Ok(ignored());
        }
    };
    let Some((name, version, filename, data)) = UploadForm::read(&mut multipart).await?.into_upload() else {
        tracing::debug!("Ignoring upload request with missing fields");
        return Ok(ignored());
    };

    let stored = async {
        let package = Package::new(&state.store, &name, &version)?;
        package.put_file(&filename, data).await
    }
    .await;

    match stored {
        Ok(()) => {
            counter!("lading_uploads_total", "outcome" => "stored").increment(1);
            Ok(().into_response())
        }
        Err(IndexError::MalformedPath(e)) => {
            tracing::warn!(%name, %version, %filename, "Rejected upload: {e}");
            counter!("lading_uploads_total", "outcome" => "rejected").increment(1);
            Err(StatusCode::FORBIDDEN.into())
        }
        Err(e) => {
            counter!("lading_uploads_total", "outcome" => "failed").increment(1);
            Err(e.into())
        }
    }
}

fn ignored() -> Response {
    counter!("lading_uploads_total", "outcome" => "ignored").increment(1);
    ().into_response()
}
