use axum::{extract::State, Json};
use axum_extra::extract::WithRejection;
use serde::{Deserialize, Serialize};

use crate::{
    auth::{
        session::{self, SessionError, UserSummary},
        AuthenticatedUser, SessionCredentials,
    },
    error::{AppError, AppResult},
    state::AppState,
};

#[derive(Deserialize)]
pub struct LoginRequest {
    pub user_email: Option<String>,
    pub user_password: Option<String>,
    pub device_name: Option<String>,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub message: &'static str,
    pub access_token: String,
    pub refresh_token: String,
    pub user: UserSummary,
}

#[derive(Deserialize)]
pub struct RefreshRequest {
    #[serde(rename = "refreshToken")]
    pub refresh_token: Option<String>,
    pub device_name: Option<String>,
}

#[derive(Serialize)]
pub struct RefreshResponse {
    pub message: &'static str,
    #[serde(rename = "accessToken")]
    pub access_token: String,
    #[serde(rename = "refreshToken")]
    pub refresh_token: String,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

#[derive(Serialize)]
pub struct MeResponse {
    pub user_id: i32,
    pub user_name: String,
    pub user_email: String,
    pub role: String,
}

pub async fn login(
    State(state): State<AppState>,
    WithRejection(Json(payload), _): WithRejection<Json<LoginRequest>, AppError>,
) -> AppResult<Json<LoginResponse>> {
    let outcome = session::login(
        &state,
        payload.user_email.as_deref(),
        payload.user_password.as_deref(),
        payload.device_name.as_deref(),
    )?;

    Ok(Json(LoginResponse {
        message: "Login successful",
        access_token: outcome.tokens.access_token,
        refresh_token: outcome.tokens.refresh_token,
        user: outcome.user,
    }))
}

pub async fn refresh(
    State(state): State<AppState>,
    WithRejection(Json(payload), _): WithRejection<Json<RefreshRequest>, AppError>,
) -> AppResult<Json<RefreshResponse>> {
    let tokens = session::refresh(
        &state,
        payload.refresh_token.as_deref(),
        payload.device_name.as_deref(),
    )
    .map_err(|err| match err {
        SessionError::MissingField(field) => {
            AppError::unauthorized(format!("missing field: {field}"))
        }
        other => AppError::from(other),
    })?;

    Ok(Json(RefreshResponse {
        message: "Token refreshed",
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
    }))
}

pub async fn logout(
    State(state): State<AppState>,
    credentials: SessionCredentials,
) -> Json<MessageResponse> {
    session::logout(
        &state,
        credentials.access_token.as_deref(),
        credentials.device_name.as_deref(),
    );
    Json(MessageResponse {
        message: "Logged out successfully",
    })
}

pub async fn me(user: AuthenticatedUser) -> Json<MeResponse> {
    Json(MeResponse {
        user_id: user.user_id,
        user_name: user.user_name,
        user_email: user.user_email,
        role: user.role,
    })
}
