//! API errors with structured JSON responses.

use axum::extract::multipart::MultipartError;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use clinic_core::ClinicError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, warn};
use uuid::Uuid;

const GENERIC_MESSAGE: &str = "An internal error occurred";

/// Body of every error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    /// Correlates the response with the server log line
    pub error_id: String,
    pub error_type: String,
    pub message: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Core(#[from] ClinicError),

    #[error("authentication required")]
    Unauthorized,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Core(e) => match e {
                ClinicError::Validation { .. } => StatusCode::BAD_REQUEST,
                ClinicError::Authentication(_) => StatusCode::UNAUTHORIZED,
                ClinicError::NotFound(_) => StatusCode::NOT_FOUND,
                ClinicError::Conflict(_) => StatusCode::CONFLICT,
                ClinicError::Storage(s) if s.is_rejection() => StatusCode::UNPROCESSABLE_ENTITY,
                ClinicError::Storage(_) | ClinicError::Database(_) | ClinicError::Internal(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            ApiError::Core(e) => e.error_type(),
            ApiError::Unauthorized => "authentication_error",
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Internal(_) => "internal_error",
        }
    }

    fn is_internal(&self) -> bool {
        match self {
            ApiError::Core(e) => e.is_internal(),
            ApiError::Internal(_) => true,
            _ => false,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let error_id = Uuid::new_v4().to_string();
        let status = self.status_code();

        let message = if self.is_internal() {
            error!(
                error_id = %error_id,
                error_type = self.error_type(),
                error = %self,
                "Request failed"
            );
            GENERIC_MESSAGE.to_string()
        } else {
            if status == StatusCode::UNPROCESSABLE_ENTITY {
                warn!(error_id = %error_id, error = %self, "Upload rejected");
            }
            self.to_string()
        };

        let body = ApiErrorResponse {
            error_id,
            error_type: self.error_type().to_string(),
            message,
            timestamp: chrono::Utc::now(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        ApiError::BadRequest(e.body_text())
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(e: tokio::task::JoinError) -> Self {
        ApiError::Internal(format!("blocking task failed: {}", e))
    }
}
