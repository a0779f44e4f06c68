//! JSON error responses for the API.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use compass_query::GenerationError;
use compass_stats::StatsError;
use compass_store::StoreError;
use serde::Serialize;
use tracing::error;

use crate::auth::AuthError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Unprocessable(String),

    #[error("{0}")]
    Upstream(String),

    #[error("{0}")]
    Internal(String),

    #[error(transparent)]
    Auth(#[from] AuthError),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::Auth(e) => return e.into_response(),
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(ErrorResponse { error: self.to_string() })).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(msg) => ApiError::NotFound(msg),
            StoreError::Invalid(msg) | StoreError::InvalidPath(msg) => ApiError::BadRequest(msg),
            StoreError::InvalidBackup => ApiError::BadRequest(e.to_string()),
            other => {
                error!(error = %other, "Store operation failed");
                ApiError::Internal(other.to_string())
            }
        }
    }
}

impl From<GenerationError> for ApiError {
    fn from(e: GenerationError) -> Self {
        match e {
            GenerationError::NoQueryBlock | GenerationError::Exhausted { .. } => ApiError::Unprocessable(e.to_string()),
            GenerationError::Llm(_) => ApiError::Upstream(e.to_string()),
            GenerationError::Compile(_) => ApiError::BadRequest(e.to_string()),
            GenerationError::Prompt(_) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<StatsError> for ApiError {
    fn from(e: StatsError) -> Self {
        match e {
            StatsError::AlreadyRunning(_) => ApiError::Conflict(e.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
