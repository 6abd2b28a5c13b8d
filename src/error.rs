/*
 * Responsibility
 * - gate 共通の AppError 定義
 * - IntoResponse 実装 (HTTP status / JSON error body)
 * - ApiClientError / ConfigError を統一的に変換
 */
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::config::ConfigError;
use crate::services::request_client::{ApiClientError, ApiErrorKind};

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{code}: {message}")]
    BadRequest { code: &'static str, message: String },
    #[error("not found: {resource}")]
    NotFound { resource: &'static str },
    #[error("unauthorized: {code}")]
    Unauthorized { code: &'static str },
    // upstream (backend API) failures; message is the raw client error message
    #[error("{message}")]
    Upstream {
        status: StatusCode,
        code: &'static str,
        message: String,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("internal server error")]
    Internal,
}

impl AppError {
    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::BadRequest {
            code,
            message: message.into(),
        }
    }

    pub fn not_found(resource: &'static str) -> Self {
        Self::NotFound { resource }
    }

    pub fn unauthorized(code: &'static str) -> Self {
        Self::Unauthorized { code }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AppError::BadRequest { code, message } => (StatusCode::BAD_REQUEST, code, message),
            AppError::NotFound { resource } => (
                StatusCode::NOT_FOUND,
                "not_found",
                format!("{resource} not found."),
            ),
            AppError::Unauthorized { code } => {
                (StatusCode::UNAUTHORIZED, code, "unauthorized".into())
            }
            AppError::Upstream {
                status,
                code,
                message,
            } => (status, code, message),
            AppError::Config(_) | AppError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_SERVER_ERROR",
                "internal server error".into(),
            ),
        };

        let body = ErrorResponse {
            error: ErrorBody { code, message },
        };

        (status, Json(body)).into_response()
    }
}

impl From<ApiClientError> for AppError {
    fn from(e: ApiClientError) -> Self {
        let (status, code) = match e.kind {
            ApiErrorKind::Http => match StatusCode::from_u16(e.status) {
                Ok(status) if status.is_client_error() => (status, "UPSTREAM_REJECTED"),
                _ => (StatusCode::BAD_GATEWAY, "UPSTREAM_FAILURE"),
            },
            ApiErrorKind::Aborted => (StatusCode::GATEWAY_TIMEOUT, "UPSTREAM_TIMEOUT"),
            ApiErrorKind::Transport | ApiErrorKind::Decode => {
                (StatusCode::BAD_GATEWAY, "UPSTREAM_FAILURE")
            }
        };

        AppError::Upstream {
            status,
            code,
            message: e.message,
        }
    }
}
