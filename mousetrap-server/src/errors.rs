use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use mousetrap_contracts::BackendError;
use mousetrap_core::MousetrapError;
use mousetrap_model::{ErrorCode, ModelError};
use serde_json::json;
use std::fmt;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
    /// Machine-readable code, e.g. `FILE_NOT_EXIST`.
    pub code: Option<&'static str>,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            code: None,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message)
    }

    pub fn unprocessable(code: ErrorCode) -> Self {
        Self {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            message: code.message().to_string(),
            code: Some(code.code()),
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": {
                "code": self.code,
                "message": self.message,
                "status": self.status.as_u16(),
            }
        }));

        (self.status, body).into_response()
    }
}

impl From<MousetrapError> for AppError {
    fn from(err: MousetrapError) -> Self {
        match err {
            MousetrapError::Backend(BackendError::NotFound(msg)) => {
                Self::not_found(msg)
            }
            MousetrapError::Backend(
                BackendError::Timeout(msg) | BackendError::Unavailable(msg),
            ) => Self::service_unavailable(msg),
            MousetrapError::Model(err) => Self::bad_request(err.to_string()),
            _ => Self::internal(err.to_string()),
        }
    }
}

impl From<BackendError> for AppError {
    fn from(err: BackendError) -> Self {
        MousetrapError::from(err).into()
    }
}

impl From<ModelError> for AppError {
    fn from(err: ModelError) -> Self {
        Self::bad_request(err.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal(err.to_string())
    }
}
