pub mod jwt;
pub mod password;
pub mod session;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use axum_extra::headers::{authorization::Bearer, Authorization};
use axum_extra::TypedHeader;
use serde::{Deserialize, Serialize};

use crate::{error::AppError, state::AppState};

pub const DEVICE_HEADER: &str = "x-device-name";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub user_id: i32,
    pub user_name: String,
    pub user_email: String,
    pub role: String,
    pub device_name: String,
}

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        // Already validated by the route layer for this request.
        if let Some(user) = parts.extensions.get::<AuthenticatedUser>() {
            return Ok(user.clone());
        }

        let credentials = SessionCredentials::from_request_parts(parts, state).await?;
        let user = session::authenticate(
            state,
            credentials.access_token.as_deref(),
            credentials.device_name.as_deref(),
        )?;

        parts.extensions.insert(user.clone());
        Ok(user)
    }
}

/// Bearer token and device name as presented, without any validation.
#[derive(Debug, Clone, Default)]
pub struct SessionCredentials {
    pub access_token: Option<String>,
    pub device_name: Option<String>,
}

#[async_trait]
impl<S> FromRequestParts<S> for SessionCredentials
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let access_token = TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
            .await
            .ok()
            .map(|TypedHeader(Authorization(bearer))| bearer.token().to_string());
        let device_name = parts
            .headers
            .get(DEVICE_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());

        Ok(Self {
            access_token,
            device_name,
        })
    }
}
