//! API error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use regsync_metadata::MetadataError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// API error response.
///
/// Store failures name the pair that failed so a sender's logs can tell which
/// image to look at; `tag` is absent for repository-wide deletes.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("invalid json: {0}")]
    InvalidJson(String),

    /// A transition for one pair failed; nothing after it was attempted.
    #[error("store error for {repository}: {source}")]
    Persistence {
        repository: String,
        tag: Option<String>,
        #[source]
        source: MetadataError,
    },

    #[error("store did not answer within {timeout:?} for {repository}")]
    StoreTimeout {
        repository: String,
        tag: Option<String>,
        timeout: Duration,
    },

    #[error("metadata error: {0}")]
    Metadata(#[from] MetadataError),
}

impl ApiError {
    /// Get the error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::InvalidJson(_) => "invalid json",
            Self::Persistence { .. } | Self::StoreTimeout { .. } | Self::Metadata(_) => "db error",
        }
    }

    /// Get the HTTP status code for this error.
    ///
    /// Timeouts stay in the 5xx range so registries retry the delivery.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::InvalidJson(_) => StatusCode::BAD_REQUEST,
            Self::Persistence { .. } | Self::StoreTimeout { .. } | Self::Metadata(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn pair(&self) -> (Option<String>, Option<String>) {
        match self {
            Self::Persistence {
                repository, tag, ..
            }
            | Self::StoreTimeout {
                repository, tag, ..
            } => (Some(repository.clone()), tag.clone()),
            _ => (None, None),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let (repository, tag) = self.pair();
        let body = ErrorResponse {
            error: self.code().to_string(),
            repository,
            tag,
        };
        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;
