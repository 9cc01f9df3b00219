use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::store::StoreError;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorObject,
}

#[derive(Debug, Serialize)]
pub struct ErrorObject {
    pub code: String,
    pub message: String,
}

/// Failures of the scheduling core. Every variant leaves state untouched.
#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Permission(String),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
    #[error("notification {0} has already been reviewed")]
    AlreadyReviewed(uuid::Uuid),
    #[error("storage error: {0}")]
    Storage(String),
}

impl ScheduleError {
    pub fn validation(msg: impl Into<String>) -> Self {
        ScheduleError::Validation(msg.into())
    }

    pub fn permission(msg: impl Into<String>) -> Self {
        ScheduleError::Permission(msg.into())
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        ScheduleError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

impl From<StoreError> for ScheduleError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Constraint(msg) => ScheduleError::Conflict(msg),
            StoreError::Backend(msg) => ScheduleError::Storage(msg),
        }
    }
}

#[derive(Debug)]
pub enum ApiError {
    Unauthorized(&'static str, String),
    Forbidden(&'static str, String),
    BadRequest(&'static str, String),
    NotFound(&'static str, String),
    Conflict(&'static str, String),
    Internal(String),
}

impl ApiError {
    pub fn invalid_credentials() -> Self {
        ApiError::Unauthorized("INVALID_CREDENTIALS", "Username or password is incorrect".into())
    }

    pub fn session_expired() -> Self {
        ApiError::Unauthorized("SESSION_EXPIRED", "Session expired".into())
    }

    fn to_error_response(code: &str, message: &str) -> Json<ErrorResponse> {
        Json(ErrorResponse {
            error: ErrorObject {
                code: code.to_string(),
                message: message.to_string(),
            },
        })
    }
}

impl From<ScheduleError> for ApiError {
    fn from(e: ScheduleError) -> Self {
        let message = e.to_string();
        match e {
            ScheduleError::Validation(_) => ApiError::BadRequest("VALIDATION_ERROR", message),
            ScheduleError::Conflict(_) => ApiError::Conflict("SCHEDULE_CONFLICT", message),
            ScheduleError::Permission(_) => ApiError::Forbidden("FORBIDDEN", message),
            ScheduleError::NotFound { .. } => ApiError::NotFound("NOT_FOUND", message),
            ScheduleError::AlreadyReviewed(_) => ApiError::Conflict("ALREADY_REVIEWED", message),
            ScheduleError::Storage(_) => {
                tracing::error!(error = %message, "storage failure");
                ApiError::Internal("storage error".into())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Unauthorized(code, msg) => {
                (StatusCode::UNAUTHORIZED, ApiError::to_error_response(code, &msg)).into_response()
            }
            ApiError::Forbidden(code, msg) => {
                (StatusCode::FORBIDDEN, ApiError::to_error_response(code, &msg)).into_response()
            }
            ApiError::BadRequest(code, msg) => {
                (StatusCode::BAD_REQUEST, ApiError::to_error_response(code, &msg)).into_response()
            }
            ApiError::NotFound(code, msg) => {
                (StatusCode::NOT_FOUND, ApiError::to_error_response(code, &msg)).into_response()
            }
            ApiError::Conflict(code, msg) => {
                (StatusCode::CONFLICT, ApiError::to_error_response(code, &msg)).into_response()
            }
            ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiError::to_error_response("INTERNAL", &msg),
            )
                .into_response(),
        }
    }
}
