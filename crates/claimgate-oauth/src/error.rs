//! Error types for OAuth operations.

use serde::{Deserialize, Serialize};

/// Result type alias for this crate.
pub type Result<T> = std::result::Result<T, OAuthError>;

/// Stable error codes a UI or API client can program against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    LoginRequired,
    LoginRequestFailed,
    LoginResponseFailed,
    AuthorizationCodeGrantFailed,
    TokenRefreshFailed,
    MetadataLookupFailure,
    IntrospectionFailure,
    UserinfoFailure,
    ClaimsFailure,
    ApiRequestFailed,
}

impl ErrorCode {
    /// Wire representation of the code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::LoginRequired => "login_required",
            ErrorCode::LoginRequestFailed => "login_request_failed",
            ErrorCode::LoginResponseFailed => "login_response_failed",
            ErrorCode::AuthorizationCodeGrantFailed => "authorization_code_grant_failed",
            ErrorCode::TokenRefreshFailed => "token_refresh_failed",
            ErrorCode::MetadataLookupFailure => "metadata_lookup_failure",
            ErrorCode::IntrospectionFailure => "introspection_failure",
            ErrorCode::UserinfoFailure => "userinfo_failure",
            ErrorCode::ClaimsFailure => "claims_failure",
            ErrorCode::ApiRequestFailed => "api_request_failed",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Standard OAuth error response body (RFC 6749 section 5.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthErrorBody {
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
}

/// Errors that can occur during OAuth operations.
///
/// Cloneable so a single refresh outcome can be handed to every caller that
/// queued behind it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum OAuthError {
    /// No usable access token and no way to obtain one without user interaction.
    #[error("Login required")]
    LoginRequired,

    /// The interactive login did not complete (timeout, cancel or abandoned).
    #[error("Login cancelled")]
    LoginCancelled,

    /// Another interactive login is already running on this manager.
    #[error("A login is already in progress")]
    LoginInProgress,

    /// Could not start the interactive login (listener or browser failure).
    #[error("Login request failed: {0}")]
    LoginRequestFailed(String),

    /// The browser phase completed with an OAuth error.
    #[error("Login failed: {code}")]
    LoginFailed {
        code: String,
        description: Option<String>,
    },

    /// The authorization server returned a standard OAuth error body.
    #[error("OAuth error: {error}")]
    Protocol {
        error: String,
        description: Option<String>,
    },

    /// Network or protocol failure while talking to the authorization server.
    #[error("{code}: {message}")]
    TokenOperationFailed {
        code: ErrorCode,
        message: String,
        url: String,
    },

    /// An API called with the access token failed.
    #[error("API request failed: {message}")]
    ApiRequest {
        status: Option<u16>,
        message: String,
    },

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),
}

impl OAuthError {
    /// Build a [`OAuthError::TokenOperationFailed`].
    pub fn operation(code: ErrorCode, message: impl Into<String>, url: impl Into<String>) -> Self {
        OAuthError::TokenOperationFailed {
            code,
            message: message.into(),
            url: url.into(),
        }
    }

    /// Turn a raw OAuth wire error into an operation failure with `code`.
    /// Errors that are already typed pass through unchanged.
    pub fn into_operation(self, code: ErrorCode, url: &str) -> Self {
        match self {
            OAuthError::Protocol { error, description } => {
                let message = match description {
                    Some(d) => format!("{} : {}", error, d),
                    None => error,
                };
                OAuthError::operation(code, message, url)
            }
            other => other,
        }
    }

    /// The stable error code for this error, if it has one.
    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            OAuthError::LoginRequired => Some(ErrorCode::LoginRequired),
            OAuthError::LoginRequestFailed(_) => Some(ErrorCode::LoginRequestFailed),
            OAuthError::LoginFailed { .. } => Some(ErrorCode::LoginResponseFailed),
            OAuthError::TokenOperationFailed { code, .. } => Some(*code),
            OAuthError::ApiRequest { .. } => Some(ErrorCode::ApiRequestFailed),
            OAuthError::LoginCancelled
            | OAuthError::LoginInProgress
            | OAuthError::Protocol { .. }
            | OAuthError::Config(_) => None,
        }
    }

    /// Whether this is an OAuth wire error with the given `error` value.
    pub fn is_protocol(&self, error: &str) -> bool {
        matches!(self, OAuthError::Protocol { error: e, .. } if e == error)
    }
}
