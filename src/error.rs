use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt::Display;
use tracing::error;

use crate::auth::session::SessionError;
use crate::files::FileError;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn too_many_requests() -> Self {
        Self::new(
            StatusCode::TOO_MANY_REQUESTS,
            "too many requests, please try again later",
        )
    }

    pub fn internal<E: Display>(error: E) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, error.to_string())
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status;
        let body = Json(ErrorResponse {
            error: self.message,
        });
        (status, body).into_response()
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl From<SessionError> for AppError {
    fn from(value: SessionError) -> Self {
        match value {
            SessionError::MissingField(field) => {
                AppError::bad_request(format!("missing field: {field}"))
            }
            SessionError::MissingToken => {
                AppError::unauthorized("missing token or device information")
            }
            SessionError::InvalidCredentials => AppError::unauthorized("invalid email or password"),
            SessionError::InvalidToken => AppError::forbidden("invalid token for this device"),
            SessionError::TokenExpired => AppError::unauthorized("token expired"),
            other => {
                error!(error = %other, "session operation failed");
                AppError::internal("internal server error")
            }
        }
    }
}

impl From<FileError> for AppError {
    fn from(value: FileError) -> Self {
        match value {
            FileError::MissingField(field) => {
                AppError::bad_request(format!("missing field: {field}"))
            }
            FileError::InvalidPath(reason) => {
                AppError::bad_request(format!("invalid path: {reason}"))
            }
            FileError::ForbiddenFileType(name) => {
                AppError::forbidden(format!("file type not allowed: {name}"))
            }
            FileError::NotFound(what) => AppError::not_found(format!("{what} not found")),
            FileError::Database(err) => {
                error!(error = %err, "file metadata query failed");
                AppError::internal("database error")
            }
            FileError::Pool(err) => {
                error!(error = %err, "database pool error");
                AppError::internal("database error")
            }
            FileError::Io(err) => {
                error!(error = %err, "storage operation failed");
                AppError::internal("storage error")
            }
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(value: JsonRejection) -> Self {
        AppError::bad_request(value.body_text())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(value: anyhow::Error) -> Self {
        error!(error = ?value, "unexpected error");
        AppError::internal("internal server error")
    }
}
