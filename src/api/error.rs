use axum::{Json, http::StatusCode, response::IntoResponse};
use thiserror::Error;

use super::models::ErrorResponse;
use crate::accounts::AccountError;
use crate::stats::{AggregateError, RefreshError};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("payload invalid: {0}")]
    InvalidPayload(String),
    #[error("payload exceeds the {0} byte limit")]
    PayloadTooLarge(usize),
    #[error("unauthorized: {0}")]
    Unauthorized(&'static str),
    #[error("resource not found: {0}")]
    NotFound(String),
    #[error("{message}")]
    Upstream { message: String, details: Vec<String> },
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Upstream { .. } => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidPayload(_) => "INVALID_PAYLOAD",
            ApiError::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Upstream { .. } => "PROVIDER_UNAVAILABLE",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let code = self.code();
        let message = self.to_string();
        let details = match self {
            ApiError::Upstream { details, .. } => Some(details),
            _ => None,
        };

        (status, Json(ErrorResponse { code, message, details })).into_response()
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(value: serde_json::Error) -> Self {
        ApiError::InvalidPayload(value.to_string())
    }
}

impl From<AccountError> for ApiError {
    fn from(value: AccountError) -> Self {
        match value {
            AccountError::UserNotFound(id) => ApiError::NotFound(format!("user {id}")),
            AccountError::AccountNotFound(id) => ApiError::NotFound(format!("account {id}")),
            AccountError::Invalid(msg) => ApiError::InvalidPayload(msg),
            AccountError::Store(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<AggregateError> for ApiError {
    fn from(value: AggregateError) -> Self {
        let message = value.to_string();
        match value {
            AggregateError::TotalFailure { errors } => ApiError::Upstream {
                message,
                details: errors,
            },
        }
    }
}

impl From<RefreshError> for ApiError {
    fn from(value: RefreshError) -> Self {
        ApiError::Internal(value.to_string())
    }
}
