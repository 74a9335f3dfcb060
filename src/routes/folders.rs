use axum::{extract::State, Json};
use axum_extra::extract::WithRejection;
use serde::{Deserialize, Serialize};

use crate::{
    auth::AuthenticatedUser,
    error::{AppError, AppResult},
    files,
    state::AppState,
};

#[derive(Deserialize)]
pub struct CreateFolderRequest {
    #[serde(rename = "currentFolder", default)]
    pub current_folder: Option<String>,
    #[serde(rename = "newFolder")]
    pub new_folder: Option<String>,
}

#[derive(Serialize)]
pub struct CreateFolderResponse {
    pub message: &'static str,
    #[serde(rename = "folderPath")]
    pub folder_path: String,
}

pub async fn create_folder(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    WithRejection(Json(payload), _): WithRejection<Json<CreateFolderRequest>, AppError>,
) -> AppResult<Json<CreateFolderResponse>> {
    let folder_path = files::create_folder(
        &state,
        user.user_id,
        payload.current_folder.as_deref(),
        payload.new_folder.as_deref(),
    )
    .await?;

    Ok(Json(CreateFolderResponse {
        message: "Folder created successfully",
        folder_path,
    }))
}
