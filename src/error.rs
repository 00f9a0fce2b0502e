/*
 * Responsibility
 * - アプリ共通の AppError 定義
 * - IntoResponse 実装 (HTTP status / JSON error body)
 * - filter / upstream のエラーを統一的に変換
 */
use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::services::auth::{AuthRejection, FilterError};
use crate::services::upstream::UpstreamError;

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
    #[error("unauthenticated: {code}")]
    Unauthenticated { code: &'static str },
    #[error("bad gateway")]
    BadGateway,
    #[error("gateway timeout")]
    GatewayTimeout,
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

    pub fn unauthenticated(code: &'static str) -> Self {
        Self::Unauthenticated { code }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AppError::BadRequest { code, message } => (StatusCode::BAD_REQUEST, code, message),
            // The reason stays generic; details are only in the logs.
            AppError::Unauthenticated { code } => (
                StatusCode::UNAUTHORIZED,
                code,
                "authentication required".into(),
            ),
            AppError::BadGateway => (
                StatusCode::BAD_GATEWAY,
                "BAD_GATEWAY",
                "upstream service unavailable".into(),
            ),
            AppError::GatewayTimeout => (
                StatusCode::GATEWAY_TIMEOUT,
                "GATEWAY_TIMEOUT",
                "request deadline exceeded".into(),
            ),
            AppError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_SERVER_ERROR",
                "internal server error".into(),
            ),
        };

        let body = ErrorResponse {
            error: ErrorBody { code, message },
        };

        let mut response = (status, Json(body)).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

impl From<AuthRejection> for AppError {
    fn from(e: AuthRejection) -> Self {
        match e {
            AuthRejection::InvalidPath => {
                AppError::bad_request("INVALID_PATH", "path must not contain dot segments")
            }
            AuthRejection::MissingHeader => AppError::unauthenticated("MISSING_AUTHORIZATION"),
            AuthRejection::MalformedHeader => AppError::unauthenticated("MALFORMED_AUTHORIZATION"),
            AuthRejection::InvalidToken(_) => AppError::unauthenticated("INVALID_TOKEN"),
        }
    }
}

impl From<FilterError> for AppError {
    fn from(e: FilterError) -> Self {
        match e {
            FilterError::Rejected(rejection) => rejection.into(),
            FilterError::IdentityHeader(err) => {
                tracing::error!(error = %err, "resolved identity is not a valid header value");
                AppError::Internal
            }
        }
    }
}

impl From<UpstreamError> for AppError {
    fn from(e: UpstreamError) -> Self {
        match e {
            UpstreamError::Body(message) => AppError::bad_request("INVALID_BODY", message),
            UpstreamError::Path(_) => {
                AppError::bad_request("INVALID_PATH", "path must not contain dot segments")
            }
            UpstreamError::Transport(_) | UpstreamError::Response(_) => AppError::BadGateway,
        }
    }
}
