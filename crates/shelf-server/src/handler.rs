use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::{FromRequest, Multipart, Path, Query, Request, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{Html, IntoResponse, Json, Redirect, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;
use shelf_store::{StorageService, StoreResult};
use shelf_types::{base_name, sanitize_display_name};

use crate::error::{ServerError, ServerResult};
use crate::html;

pub type SharedStorage = Arc<StorageService>;

/// Name given to raw uploads that do not supply one.
pub const DEFAULT_UPLOAD_NAME: &str = "upload.bin";

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileEntry {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub id: String,
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UploadParams {
    pub filename: Option<String>,
}

/// Run a storage call on the blocking pool.
async fn blocking<T, F>(storage: &SharedStorage, f: F) -> ServerResult<T>
where
    F: FnOnce(&StorageService) -> StoreResult<T> + Send + 'static,
    T: Send + 'static,
{
    let storage = Arc::clone(storage);
    let result = tokio::task::spawn_blocking(move || f(&storage))
        .await
        .map_err(|e| ServerError::Internal(format!("storage task failed: {e}")))?;
    Ok(result?)
}

pub async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn index_handler(State(storage): State<SharedStorage>) -> ServerResult<Html<String>> {
    let max = storage.config().max_file_size;
    let entries = blocking(&storage, |s| Ok(s.list())).await?;
    Ok(Html(html::render_index(&entries, max)))
}

pub async fn list_handler(
    State(storage): State<SharedStorage>,
) -> ServerResult<Json<Vec<FileEntry>>> {
    let entries = blocking(&storage, |s| Ok(s.list())).await?;
    Ok(Json(
        entries
            .into_iter()
            .map(|(id, name)| FileEntry {
                id: id.to_string(),
                name,
            })
            .collect(),
    ))
}

/// Accepts a multipart form with a `file` field, or the raw request body
/// named by the `filename` query parameter.
pub async fn upload_handler(
    State(storage): State<SharedStorage>,
    Query(params): Query<UploadParams>,
    headers: HeaderMap,
    request: Request,
) -> ServerResult<Response> {
    let multipart = is_multipart(&headers);
    let (filename, content) = if multipart {
        read_multipart(request).await?
    } else {
        let content = Bytes::from_request(request, &())
            .await
            .map_err(|e| ServerError::rejected(e.status(), e.body_text()))?;
        let filename = params
            .filename
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| DEFAULT_UPLOAD_NAME.to_string());
        (filename, content)
    };

    let filename = base_name(&filename).to_string();
    let stored_name = sanitize_display_name(&filename);
    let outcome = blocking(&storage, move |s| s.add(&content, &filename)).await?;

    if multipart && accepts_html(&headers) {
        return Ok(Redirect::to("/").into_response());
    }
    Ok(Json(UploadResponse {
        id: outcome.value.to_string(),
        filename: stored_name,
        warning: outcome.warning.map(|w| w.message),
    })
    .into_response())
}

pub async fn download_handler(
    State(storage): State<SharedStorage>,
    Path(id): Path<String>,
) -> ServerResult<Response> {
    let (content, name) = blocking(&storage, move |s| s.read(&id)).await?;

    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{name}\""))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/octet-stream")),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Body::from(content),
    )
        .into_response())
}

pub async fn delete_handler(
    State(storage): State<SharedStorage>,
    Path(id): Path<String>,
) -> ServerResult<Json<serde_json::Value>> {
    let outcome = blocking(&storage, move |s| s.delete(&id)).await?;
    Ok(Json(match outcome.warning {
        Some(w) => json!({ "status": "ok", "warning": w.message }),
        None => json!({ "status": "ok" }),
    }))
}

async fn read_multipart(request: Request) -> ServerResult<(String, Bytes)> {
    let mut multipart = Multipart::from_request(request, &())
        .await
        .map_err(|e| ServerError::rejected(e.status(), e.body_text()))?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::rejected(e.status(), e.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field
            .file_name()
            .filter(|n| !n.is_empty())
            .unwrap_or(DEFAULT_UPLOAD_NAME)
            .to_string();
        let content = field
            .bytes()
            .await
            .map_err(|e| ServerError::rejected(e.status(), e.body_text()))?;
        return Ok((filename, content));
    }
    Err(ServerError::BadRequest(
        "multipart form has no `file` field".to_string(),
    ))
}

fn header_contains(headers: &HeaderMap, name: header::HeaderName, needle: &str) -> bool {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.to_ascii_lowercase().contains(needle))
}

fn is_multipart(headers: &HeaderMap) -> bool {
    header_contains(headers, header::CONTENT_TYPE, "multipart/form-data")
}

fn accepts_html(headers: &HeaderMap) -> bool {
    header_contains(headers, header::ACCEPT, "text/html")
}
