use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::{auth::AuthError, report::DateRangeError, store::StoreError};

/// Every failure a handler can return. Internal details are logged, never
/// sent to the client.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    InvalidCredentials,
    InvalidToken,
    ExpiredToken,
    Upload(MultipartError),
    Storage(StoreError),
    Internal(anyhow::Error),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        ApiError::BadRequest(msg.into())
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingCredentials
            | AuthError::UsernameTooLong
            | AuthError::DuplicateUsername => ApiError::BadRequest(err.to_string()),
            AuthError::InvalidCredentials => ApiError::InvalidCredentials,
            AuthError::InvalidToken => ApiError::InvalidToken,
            AuthError::ExpiredToken => ApiError::ExpiredToken,
            AuthError::Store(err) => ApiError::Storage(err),
            AuthError::MalformedCredential | AuthError::Hashing(_) | AuthError::InvalidSecret => {
                ApiError::Internal(err.into())
            }
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Storage(err)
    }
}

impl From<DateRangeError> for ApiError {
    fn from(err: DateRangeError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        ApiError::Upload(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            ApiError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                json!({ "error": "Invalid credentials" }),
            ),
            ApiError::InvalidToken => (
                StatusCode::UNAUTHORIZED,
                json!({
                    "error": "Invalid token",
                    "message": "The token provided is invalid",
                }),
            ),
            ApiError::ExpiredToken => (
                StatusCode::UNAUTHORIZED,
                json!({ "error": "Token has expired" }),
            ),
            ApiError::Upload(err) => {
                log::warn!("cannot read upload: {}", err);
                (err.status(), json!({ "error": err.body_text() }))
            }
            ApiError::Storage(err) => {
                log::error!("database error: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Database error occurred" }),
                )
            }
            ApiError::Internal(err) => {
                log::error!("internal error: {:#}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Internal server error" }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}
