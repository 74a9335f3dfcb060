use axum::{
    body::Body,
    extract::{Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::Response,
    Json,
};
use axum_extra::extract::WithRejection;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::{
    auth::AuthenticatedUser,
    error::{AppError, AppResult},
    files::{self, IncomingFile, Listing},
    models::File,
    state::AppState,
};

#[derive(Deserialize, Default)]
pub struct ListFilesRequest {
    #[serde(default)]
    pub folder: Option<String>,
}

#[derive(Deserialize)]
pub struct FolderQuery {
    #[serde(default)]
    pub folder: Option<String>,
}

#[derive(Deserialize)]
pub struct RenameRequest {
    #[serde(rename = "newName")]
    pub new_name: Option<String>,
    #[serde(default)]
    pub folder: Option<String>,
}

#[derive(Serialize)]
pub struct StoredFile {
    pub file_id: i32,
    pub filename: String,
    pub original_name: String,
    pub folder: String,
    pub size_bytes: i64,
}

impl From<File> for StoredFile {
    fn from(file: File) -> Self {
        Self {
            file_id: file.file_id,
            filename: file.filename,
            original_name: file.original_name,
            folder: file.folder,
            size_bytes: file.size_bytes,
        }
    }
}

#[derive(Serialize)]
pub struct UploadResponse {
    pub message: &'static str,
    pub files: Vec<StoredFile>,
    pub folder: String,
}

#[derive(Serialize)]
pub struct ImageResponse {
    pub file_id: i32,
    pub filename: String,
    pub folder: String,
    pub created: String,
}

#[derive(Serialize)]
pub struct RenameResponse {
    pub message: &'static str,
    #[serde(rename = "oldName")]
    pub old_name: String,
    #[serde(rename = "newName")]
    pub new_name: String,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

pub async fn list_files(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    body: Option<Json<ListFilesRequest>>,
) -> AppResult<Json<Listing>> {
    let payload = body.map(|Json(payload)| payload).unwrap_or_default();
    let listing = files::list_files(
        &state,
        user.user_id,
        payload.folder.as_deref().unwrap_or_default(),
    )
    .await?;
    Ok(Json(listing))
}

pub async fn upload_files(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    mut multipart: Multipart,
) -> AppResult<Json<UploadResponse>> {
    let mut incoming = Vec::new();
    let mut folder = String::new();

    while let Some(field) = multipart.next_field().await.map_err(|err| {
        error!(error = %err, "invalid multipart data");
        AppError::bad_request(format!("invalid multipart data: {err}"))
    })? {
        match field.name() {
            Some("files") | Some("files[]") => {
                let original_name = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(|err| {
                    error!(error = %err, "failed to read file bytes");
                    AppError::bad_request(format!("failed to read file bytes: {err}"))
                })?;
                incoming.push(IncomingFile {
                    original_name,
                    bytes,
                });
            }
            Some("folder") => {
                folder = field.text().await.map_err(|err| {
                    AppError::bad_request(format!("invalid folder: {err}"))
                })?;
            }
            _ => {}
        }
    }

    let stored = files::upload_files(&state, user.user_id, &folder, incoming).await?;
    let folder = stored
        .first()
        .map(|file| file.folder.clone())
        .unwrap_or_default();

    Ok(Json(UploadResponse {
        message: "Files uploaded successfully",
        files: stored.into_iter().map(StoredFile::from).collect(),
        folder,
    }))
}

pub async fn list_images(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<ImageResponse>>> {
    let images = files::list_images(&state, user.user_id)?;
    Ok(Json(
        images
            .into_iter()
            .map(|file| ImageResponse {
                file_id: file.file_id,
                filename: file.filename,
                folder: file.folder,
                created: file.created_at.and_utc().to_rfc3339(),
            })
            .collect(),
    ))
}

pub async fn download_file(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(filename): Path<String>,
    Query(query): Query<FolderQuery>,
) -> AppResult<Response> {
    let (file, bytes) = files::download_file(
        &state,
        user.user_id,
        query.folder.as_deref().unwrap_or_default(),
        &filename,
    )
    .await?;
    file_response(&file, bytes)
}

pub async fn rename_file(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(filename): Path<String>,
    WithRejection(Json(payload), _): WithRejection<Json<RenameRequest>, AppError>,
) -> AppResult<Json<RenameResponse>> {
    let outcome = files::rename_file(
        &state,
        user.user_id,
        payload.folder.as_deref().unwrap_or_default(),
        &filename,
        payload.new_name.as_deref(),
    )
    .await?;

    Ok(Json(RenameResponse {
        message: "File renamed successfully",
        old_name: outcome.old_name,
        new_name: outcome.new_name,
    }))
}

pub async fn delete_file(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(file_id): Path<String>,
) -> AppResult<Json<MessageResponse>> {
    let file_id: i32 = file_id
        .trim()
        .parse()
        .map_err(|_| AppError::bad_request("fileId must be an integer"))?;
    files::delete_file(&state, user.user_id, file_id).await?;
    Ok(Json(MessageResponse {
        message: "File deleted successfully",
    }))
}

/// Builds an attachment response carrying the original upload name.
pub(crate) fn file_response(file: &File, bytes: Vec<u8>) -> AppResult<Response> {
    let content_type = mime_guess::from_path(&file.filename).first_or_octet_stream();
    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type.as_ref())
        .header(header::CONTENT_LENGTH, bytes.len());

    if let Some(disposition) = attachment_disposition(&file.original_name) {
        builder = builder.header(header::CONTENT_DISPOSITION, disposition);
    }

    builder
        .body(Body::from(bytes))
        .map_err(|err| AppError::internal(format!("failed to build response: {err}")))
}

fn attachment_disposition(filename: &str) -> Option<String> {
    if filename.is_empty() {
        return None;
    }

    let sanitized: String = filename
        .chars()
        .map(|ch| match ch {
            '"' | '\\' => '_',
            ch if ch.is_control() => '_',
            _ => ch,
        })
        .collect();

    let encoded =
        percent_encoding::utf8_percent_encode(&sanitized, percent_encoding::NON_ALPHANUMERIC);
    Some(format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        sanitized, encoded
    ))
}

#[cfg(test)]
mod tests {
    use super::attachment_disposition;

    #[test]
    fn disposition_escapes_quotes() {
        let value = attachment_disposition("my \"report\".pdf").unwrap();
        assert!(value.starts_with("attachment; filename=\"my _report_.pdf\""));
        assert!(value.contains("filename*=UTF-8''my%20%5Freport%5F%2Epdf"));
    }

    #[test]
    fn disposition_skips_empty_names() {
        assert!(attachment_disposition("").is_none());
    }
}
