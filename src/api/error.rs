use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::pairing::PairingError;
use crate::session::SessionError;
use crate::storage::StorageError;
use crate::upload::UploadError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    #[error("upload error: {0}")]
    Upload(#[from] UploadError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("pairing error: {0}")]
    Pairing(#[from] PairingError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("not found")]
    NotFound,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, code) = match &self {
            ApiError::Session(SessionError::InvalidCode) => {
                (StatusCode::NOT_FOUND, self.to_string(), "INVALID_CODE")
            }
            ApiError::Session(SessionError::SessionFull) => {
                (StatusCode::CONFLICT, self.to_string(), "SESSION_FULL")
            }
            ApiError::Session(SessionError::NotMember) => {
                (StatusCode::FORBIDDEN, self.to_string(), "NOT_MEMBER")
            }
            ApiError::Session(SessionError::NotConnected) => {
                (StatusCode::FORBIDDEN, self.to_string(), "NOT_CONNECTED")
            }
            ApiError::Session(SessionError::RateLimited) => {
                (StatusCode::TOO_MANY_REQUESTS, self.to_string(), "RATE_LIMITED")
            }
            ApiError::Session(SessionError::QuotaExceeded { .. }) => {
                (StatusCode::PAYLOAD_TOO_LARGE, self.to_string(), "QUOTA_EXCEEDED")
            }
            ApiError::Session(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string(), "SESSION_ERROR")
            }
            ApiError::Upload(UploadError::NotFound) => {
                (StatusCode::NOT_FOUND, self.to_string(), "UPLOAD_NOT_FOUND")
            }
            ApiError::Upload(UploadError::InvalidIndex { .. }) => {
                (StatusCode::BAD_REQUEST, self.to_string(), "INVALID_CHUNK_INDEX")
            }
            ApiError::Upload(UploadError::Incomplete(_)) => {
                (StatusCode::BAD_REQUEST, self.to_string(), "UPLOAD_INCOMPLETE")
            }
            ApiError::Upload(UploadError::SizeMismatch { .. }) => {
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string(), "SIZE_MISMATCH")
            }
            ApiError::Upload(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string(), "UPLOAD_ERROR")
            }
            ApiError::Storage(StorageError::InvalidPath(_)) => {
                (StatusCode::BAD_REQUEST, self.to_string(), "INVALID_PATH")
            }
            ApiError::Storage(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string(), "STORAGE_ERROR")
            }
            ApiError::Pairing(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, self.to_string(), "CODE_CAPACITY_EXHAUSTED")
            }
            ApiError::InvalidRequest(_) => {
                (StatusCode::BAD_REQUEST, self.to_string(), "INVALID_REQUEST")
            }
            ApiError::NotFound => (StatusCode::NOT_FOUND, self.to_string(), "NOT_FOUND"),
        };

        let body = Json(json!({
            "error": message,
            "code": code,
        }));

        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
