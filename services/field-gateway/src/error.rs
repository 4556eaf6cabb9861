//! HTTP-facing error type
//!
//! Every failure leaves the gateway as `{"error":{"type","message"}}`.
//! Dataverse failures keep their message verbatim.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use dataverse_client::Error as DataverseError;
use thiserror::Error;

use crate::metrics;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Dataverse(#[from] DataverseError),

    #[error("writes are disabled on this gateway")]
    WritesDisabled,

    #[error("{0}")]
    NotFound(String),

    /// Request body or query could not be extracted.
    #[error("{message}")]
    Rejected { status: StatusCode, message: String },
}

pub type Result<T> = std::result::Result<T, ApiError>;

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::Dataverse(DataverseError::Validation(message.into()))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Dataverse(DataverseError::Validation(_)) => StatusCode::BAD_REQUEST,
            ApiError::Dataverse(DataverseError::Upstream { status: 404, .. }) => {
                StatusCode::NOT_FOUND
            }
            ApiError::Dataverse(_) => StatusCode::BAD_GATEWAY,
            ApiError::WritesDisabled => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Rejected { status, .. } => *status,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Dataverse(DataverseError::Validation(_)) => "validation_error",
            ApiError::Dataverse(DataverseError::Upstream { status: 404, .. }) => "not_found",
            ApiError::Dataverse(DataverseError::Authentication(_)) => "authentication_error",
            ApiError::Dataverse(DataverseError::Upstream { .. }) => "upstream_error",
            ApiError::Dataverse(DataverseError::MalformedResponse(_)) => "malformed_response",
            ApiError::Dataverse(DataverseError::Transport(_)) => "upstream_unreachable",
            ApiError::WritesDisabled => "writes_disabled",
            ApiError::NotFound(_) => "not_found",
            ApiError::Rejected { .. } => "invalid_request",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            ApiError::Dataverse(DataverseError::Validation(_)) => {}
            ApiError::Dataverse(err) => {
                metrics::record_upstream_error(self.kind());
                tracing::warn!(error = %err, error_type = self.kind(), "Dataverse call failed");
            }
            _ => {}
        }

        let body = serde_json::json!({
            "error": {
                "type": self.kind(),
                "message": self.to_string(),
            }
        });
        (status, Json(body)).into_response()
    }
}
