use axum::{
    extract::{Path, State},
    response::Response,
    Json,
};
use axum_extra::{extract::WithRejection, headers::Host, TypedHeader};
use serde::{Deserialize, Serialize};

use crate::{
    auth::AuthenticatedUser,
    error::{AppError, AppResult},
    files,
    state::AppState,
};

use super::files::{file_response, StoredFile};

/// Clients send the id either as a number or as a numeric string.
#[derive(Deserialize)]
#[serde(untagged)]
pub enum FileIdValue {
    Number(i32),
    Text(String),
}

impl FileIdValue {
    fn parse(self) -> AppResult<i32> {
        match self {
            FileIdValue::Number(id) => Ok(id),
            FileIdValue::Text(raw) => raw
                .trim()
                .parse()
                .map_err(|_| AppError::bad_request("fileId must be an integer")),
        }
    }
}

#[derive(Deserialize)]
pub struct ShareRequest {
    #[serde(rename = "fileId")]
    pub file_id: Option<FileIdValue>,
}

#[derive(Serialize)]
pub struct ShareLinkResponse {
    #[serde(rename = "shareableLink")]
    pub shareable_link: String,
}

#[derive(Serialize)]
pub struct SharedFileResponse {
    pub message: &'static str,
    pub file: StoredFile,
    #[serde(rename = "sharedAt")]
    pub shared_at: String,
}

pub async fn create_share_link(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    host: Option<TypedHeader<Host>>,
    WithRejection(Json(payload), _): WithRejection<Json<ShareRequest>, AppError>,
) -> AppResult<Json<ShareLinkResponse>> {
    let file_id = payload.file_id.map(FileIdValue::parse).transpose()?;
    let base_url = match state.config.public_base_url.as_ref() {
        Some(url) => url.as_str().trim_end_matches('/').to_string(),
        None => match host {
            Some(TypedHeader(host)) => format!("http://{host}"),
            None => format!("http://localhost:{}", state.config.server_port),
        },
    };

    let shareable_link = files::create_share_link(&state, user.user_id, file_id, &base_url)?;
    Ok(Json(ShareLinkResponse { shareable_link }))
}

pub async fn resolve_share_link(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> AppResult<Json<SharedFileResponse>> {
    let shared = files::resolve_share_link(&state, &token)?;
    Ok(Json(SharedFileResponse {
        message: "Shared file found",
        file: StoredFile::from(shared.file),
        shared_at: shared.shared_at.and_utc().to_rfc3339(),
    }))
}

pub async fn download_shared(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> AppResult<Response> {
    let (file, bytes) = files::download_shared(&state, &token).await?;
    file_response(&file, bytes)
}
