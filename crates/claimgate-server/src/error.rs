//! Error types for the server.
//!
//! Client errors carry a short public message. Server errors are logged in
//! full under a random instance id, and only that id reaches the caller.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use claimgate_oauth::{ErrorCode, OAuthError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Message returned for every 401.
pub const UNAUTHORIZED_MESSAGE: &str = "Missing, invalid or expired access token";

/// Message returned for every 5xx.
pub const SERVER_ERROR_MESSAGE: &str = "A technical problem was encountered in the API";

/// Area reported when no API name is available.
pub const DEFAULT_AREA: &str = "claimgate";

/// Server error type.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Authentication failed. The detail is logged, never returned.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// An expected claim was absent or empty.
    #[error("An empty value was found for the expected claim {claim}")]
    Claims { claim: String },

    /// Discovery, introspection or userinfo failed.
    #[error("{code}: {message}")]
    TokenOperation {
        code: ErrorCode,
        message: String,
        url: String,
    },

    /// Raised on request by the test-exception header.
    #[error("An unexpected exception occurred in the API")]
    ExceptionSimulation,

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServerError {
    pub fn unauthorized(detail: impl Into<String>) -> Self {
        ServerError::Unauthorized(detail.into())
    }

    pub fn missing_claim(claim: impl Into<String>) -> Self {
        ServerError::Claims {
            claim: claim.into(),
        }
    }

    pub fn operation(code: ErrorCode, message: impl Into<String>, url: impl Into<String>) -> Self {
        ServerError::TokenOperation {
            code,
            message: message.into(),
            url: url.into(),
        }
    }

    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            ServerError::Unauthorized(_) => "unauthorized",
            ServerError::Claims { .. } => ErrorCode::ClaimsFailure.as_str(),
            ServerError::TokenOperation { code, .. } => code.as_str(),
            ServerError::ExceptionSimulation => "exception_simulation",
            ServerError::Internal(_) => "server_error",
        }
    }

    /// Render the response, reporting 5xx errors under `area`.
    ///
    /// The correlation id, when known, is logged with the error and returned
    /// in the 5xx body so callers can quote it.
    pub fn into_response_for(self, area: &str, correlation_id: Option<&str>) -> Response {
        let status = self.status();
        let code = self.code();

        if status == StatusCode::UNAUTHORIZED {
            tracing::warn!(status = %status, code, correlation_id, error = %self, "Client error");
            let body = ErrorResponse {
                code: code.to_string(),
                message: UNAUTHORIZED_MESSAGE.to_string(),
            };
            return (status, Json(body)).into_response();
        }

        let id = uuid::Uuid::new_v4().to_string();
        match &self {
            ServerError::TokenOperation { url, .. } => {
                tracing::error!(status = %status, code, id = %id, correlation_id, url = %url, error = %self, "Server error");
            }
            _ => {
                tracing::error!(status = %status, code, id = %id, correlation_id, error = %self, "Server error");
            }
        }

        let body = ServerErrorResponse {
            code: code.to_string(),
            message: SERVER_ERROR_MESSAGE.to_string(),
            area: area.to_string(),
            id,
            utc_time: chrono::Utc::now().to_rfc3339(),
            correlation_id: correlation_id.map(str::to_string),
        };
        (status, Json(body)).into_response()
    }
}

impl From<OAuthError> for ServerError {
    fn from(e: OAuthError) -> Self {
        match e {
            OAuthError::TokenOperationFailed { code, message, url } => {
                ServerError::TokenOperation { code, message, url }
            }
            other => ServerError::Internal(other.to_string()),
        }
    }
}

/// Result type for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;

/// Client error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

/// Server error response body.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerErrorResponse {
    pub code: String,
    pub message: String,
    /// API that reported the error.
    pub area: String,
    /// Instance id to find the full detail in the logs.
    pub id: String,
    pub utc_time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        self.into_response_for(DEFAULT_AREA, None)
    }
}
