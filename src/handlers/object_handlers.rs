//! HTTP handlers for the gallery's object operations.
//! Request parsing and response shaping live here; every storage concern is
//! delegated to `StorageService`.

use crate::{
    errors::AppError,
    models::object::StoredObject,
    services::storage_service::StorageService,
};
use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, Query, State, multipart::MultipartError},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::Response,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Multipart field carrying the uploaded file.
const FILE_FIELD: &str = "file";

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub message: &'static str,
    pub filename: String,
    pub size: u64,
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub files: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct DownloadResponse {
    pub download_url: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub message: &'static str,
    pub filename: String,
}

/// Query params carried by a locally signed download link.
#[derive(Debug, Deserialize)]
pub struct SignedLinkQuery {
    pub expires: i64,
    pub signature: String,
}

struct FilePart {
    filename: String,
    content_type: Option<String>,
    content: Bytes,
}

/// POST `/upload/`: store the single `file` part under its own filename.
pub async fn upload_object(
    State(service): State<StorageService>,
    multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let part = read_file_part(multipart).await?;

    let object = service
        .upload(&part.filename, part.content, part.content_type.as_deref())
        .await?;

    Ok(Json(UploadResponse {
        message: "Uploaded",
        filename: object.name,
        size: object.size_bytes,
    }))
}

/// GET `/list/`: every object name currently in the bucket.
pub async fn list_objects(
    State(service): State<StorageService>,
) -> Result<Json<ListResponse>, AppError> {
    let files = service.list().await?;
    Ok(Json(ListResponse { files }))
}

/// GET `/download/{filename}`: a fresh signed URL, never the bytes.
pub async fn download_url(
    State(service): State<StorageService>,
    Path(filename): Path<String>,
) -> Result<Json<DownloadResponse>, AppError> {
    let signed = service.download_url(&filename).await?;
    Ok(Json(DownloadResponse {
        download_url: signed.url,
        expires_at: signed.expires_at,
    }))
}

/// DELETE `/delete/{filename}`
pub async fn delete_object(
    State(service): State<StorageService>,
    Path(filename): Path<String>,
) -> Result<Json<DeleteResponse>, AppError> {
    service.delete(&filename).await?;
    Ok(Json(DeleteResponse {
        message: "Deleted",
        filename,
    }))
}

/// `/download/` and `/delete/` without a name.
pub async fn missing_object_name() -> AppError {
    AppError::bad_request("object name must not be empty")
}

/// GET `/signed/{filename}?expires=..&signature=..`: target of links minted
/// by the in-memory backend.
pub async fn signed_download(
    State(service): State<StorageService>,
    Path(filename): Path<String>,
    Query(link): Query<SignedLinkQuery>,
) -> Result<Response, AppError> {
    let download = service
        .open_signed(&filename, link.expires, &link.signature)
        .await?;

    let mut response = Response::new(Body::from(download.content));
    *response.status_mut() = StatusCode::OK;
    set_object_headers(
        response.headers_mut(),
        &download.object,
        download.content_type.as_deref(),
    );
    Ok(response)
}

/// Pull exactly one `file` part out of the form. Other fields are ignored.
async fn read_file_part(mut multipart: Multipart) -> Result<FilePart, AppError> {
    let mut found: Option<FilePart> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        if found.is_some() {
            return Err(AppError::bad_request(format!(
                "expected exactly one `{}` part",
                FILE_FIELD
            )));
        }

        let filename = field
            .file_name()
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .ok_or_else(|| AppError::bad_request("uploaded file has no filename"))?;
        let content_type = field.content_type().map(str::to_string);
        let content = field.bytes().await.map_err(multipart_error)?;

        found = Some(FilePart {
            filename,
            content_type,
            content,
        });
    }

    found.ok_or_else(|| AppError::bad_request(format!("missing `{}` part", FILE_FIELD)))
}

fn multipart_error(err: MultipartError) -> AppError {
    AppError::new(err.status(), err.body_text())
}

fn set_object_headers(headers: &mut HeaderMap, meta: &StoredObject, content_type: Option<&str>) {
    let content_type = content_type.unwrap_or("application/octet-stream");
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );

    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(meta.size_bytes));

    if let Some(etag) = meta.e_tag.as_ref() {
        let quoted = format!("\"{}\"", etag);
        if let Ok(value) = HeaderValue::from_str(&quoted) {
            headers.insert(header::ETAG, value);
        }
    }

    if let Ok(value) = HeaderValue::from_str(&meta.last_modified.to_rfc2822()) {
        headers.insert(header::LAST_MODIFIED, value);
    }
}
