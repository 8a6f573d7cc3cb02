// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use serde_json::json;

use agcluster_session::SessionError;
use agcluster_translate::TranslateError;

/// Errors an HTTP handler can surface, mapped to the status codes named in
/// the gateway's error-handling table: unknown config/session -> 404,
/// invalid request shape -> 400, invalid config -> 422, id conflict -> 409,
/// container/connection failure -> 502, resource exhaustion -> 507,
/// everything else -> 500.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("unknown config: {0}")]
    UnknownConfig(String),
    #[error("unknown session: {0}")]
    UnknownSession(String),
    #[error("invalid request: {0}")]
    BadRequest(String),
    #[error("invalid config: {0:?}")]
    InvalidConfig(Vec<agcluster_config::ValidationError>),
    #[error("config conflict: {0}")]
    Conflict(String),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Translate(#[from] TranslateError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::UnknownConfig(_) => (StatusCode::NOT_FOUND, self.to_string()),
            ApiError::UnknownSession(_) => (StatusCode::NOT_FOUND, self.to_string()),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ApiError::InvalidConfig(_) => (StatusCode::UNPROCESSABLE_ENTITY, self.to_string()),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, self.to_string()),
            ApiError::Translate(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ApiError::Session(e) => (session_error_status(e), self.to_string()),
        };
        (status, Json(json!({ "error": { "message": message } }))).into_response()
    }
}

fn session_error_status(e: &SessionError) -> StatusCode {
    match e {
        SessionError::UnknownConfig(_) => StatusCode::NOT_FOUND,
        SessionError::SessionNotFound(_) => StatusCode::NOT_FOUND,
        SessionError::InvalidConfig(_) => StatusCode::UNPROCESSABLE_ENTITY,
        SessionError::ContainerStartFailed(_)
        | SessionError::ContainerReadinessTimeout
        | SessionError::ConnectionLost => StatusCode::BAD_GATEWAY,
        SessionError::ResourceExhausted => StatusCode::INSUFFICIENT_STORAGE,
        SessionError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
