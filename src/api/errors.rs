use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::warn;

use crate::config::ModelProvider;

/// Failures detected before the event stream is opened. These are answered
/// with a plain JSON error instead of stream events.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{}", .0.body_text())]
    InvalidBody(#[from] JsonRejection),

    #[error("Query is required")]
    MissingQuery,

    #[error("Unsupported time range '{0}'. Use one of: all, 1d, 7d, 30d")]
    InvalidTimeRange(String),

    #[error("Firecrawl API key not configured")]
    MissingSearchKey,

    #[error("{} API key not configured", .0.display_name())]
    MissingModelKey(ModelProvider),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidBody(rejection) => rejection.status(),
            ApiError::MissingQuery | ApiError::InvalidTimeRange(_) => StatusCode::BAD_REQUEST,
            ApiError::MissingSearchKey | ApiError::MissingModelKey(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        warn!(status = %status, error = %self, "request rejected");
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}
