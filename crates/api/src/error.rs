/// API error types. Kept the teacher's shape (one variant per status family,
/// `IntoResponse` mapping to a JSON body), extended with the conflict/quota
/// variants SPEC_FULL §7 requires and a `From<CoreError>` conversion so
/// route handlers can just use `?`.
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use postbox_core::error::CoreError;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Non-fatal warnings surfaced alongside an otherwise-successful
    /// response body, e.g. a receipt-rule provisioning failure on domain
    /// creation that shouldn't fail the whole request.
    pub fn as_warning(&self) -> String {
        self.to_string()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::QuotaExceeded(msg) => (StatusCode::TOO_MANY_REQUESTS, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(json!({
            "success": false,
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Unauthenticated(msg) => ApiError::Unauthorized(msg),
            CoreError::Forbidden(msg) => ApiError::Forbidden(msg),
            CoreError::NotFound(msg) => ApiError::NotFound(msg),
            CoreError::Conflict(msg) => ApiError::Conflict(msg),
            CoreError::Validation(msg) => ApiError::BadRequest(msg),
            CoreError::QuotaExceeded(msg) => ApiError::QuotaExceeded(msg),
            CoreError::DependencyBusy(msg)
            | CoreError::UpstreamMailer(msg)
            | CoreError::UpstreamStore(msg)
            | CoreError::ParseFailure(msg)
            | CoreError::Config(msg) => ApiError::Internal(msg),
        }
    }
}
