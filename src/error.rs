// HTTP API Error Types
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};

use crate::auth::TokenError;
use crate::synthesis::SynthesisError;

/// Every failure a middleware chain or a handler can report.
///
/// The `IntoResponse` impl is the one place errors become HTTP responses, so
/// authentication failures, role denials and handler errors all pass through
/// the same reporter and only ever expose a short categorical message.
#[derive(Debug, Clone)]
pub enum ApiError {
    // 400 Bad Request
    BadRequest(String),

    // 401 Unauthorized
    AuthenticationMissing(String),
    AuthenticationExpired(String),
    AuthenticationInvalid(String),
    AuthorizationRoleDenied(String),

    // 404 Not Found
    NotFound(String),

    // 500 by default, handlers may choose another status
    HandlerInvocation { status: u16, message: String },
}

impl ApiError {
    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::BadRequest(_) => 400,
            ApiError::AuthenticationMissing(_) => 401,
            ApiError::AuthenticationExpired(_) => 401,
            ApiError::AuthenticationInvalid(_) => 401,
            ApiError::AuthorizationRoleDenied(_) => 401,
            ApiError::NotFound(_) => 404,
            ApiError::HandlerInvocation { status, .. } => *status,
        }
    }

    /// Get client-safe error message
    pub fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(msg) => msg,
            ApiError::AuthenticationMissing(msg) => msg,
            ApiError::AuthenticationExpired(msg) => msg,
            ApiError::AuthenticationInvalid(msg) => msg,
            ApiError::AuthorizationRoleDenied(msg) => msg,
            ApiError::NotFound(msg) => msg,
            ApiError::HandlerInvocation { message, .. } => message,
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::AuthenticationMissing(_) => "AUTHENTICATION_MISSING",
            ApiError::AuthenticationExpired(_) => "AUTHENTICATION_EXPIRED",
            ApiError::AuthenticationInvalid(_) => "AUTHENTICATION_INVALID",
            ApiError::AuthorizationRoleDenied(_) => "AUTHORIZATION_ROLE_DENIED",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::HandlerInvocation { .. } => "HANDLER_ERROR",
        }
    }

    /// Convert to JSON response body
    pub fn to_json(&self) -> Value {
        json!({
            "error": true,
            "message": self.message(),
            "code": self.error_code()
        })
    }

    pub fn is_auth_failure(&self) -> bool {
        self.status_code() == 401
    }
}

// Static constructor methods
impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn authentication_missing(message: impl Into<String>) -> Self {
        ApiError::AuthenticationMissing(message.into())
    }

    pub fn role_denied(message: impl Into<String>) -> Self {
        ApiError::AuthorizationRoleDenied(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    /// Handler failure reported as 500
    pub fn handler(message: impl Into<String>) -> Self {
        ApiError::HandlerInvocation {
            status: 500,
            message: message.into(),
        }
    }

    /// Handler failure with a handler-chosen status
    pub fn handler_with_status(status: u16, message: impl Into<String>) -> Self {
        ApiError::HandlerInvocation {
            status,
            message: message.into(),
        }
    }
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        // Only the category leaves the process, never the underlying cause
        match err {
            TokenError::Expired => ApiError::AuthenticationExpired("Token expired".to_string()),
            TokenError::Malformed
            | TokenError::BadSignature
            | TokenError::Decryption
            | TokenError::Payload(_) => ApiError::AuthenticationInvalid("Invalid token".to_string()),
            TokenError::Encryption | TokenError::InvalidKey(_) | TokenError::ReservedClaim(_) => {
                tracing::error!("Token subsystem failure: {}", err);
                ApiError::handler("Token processing failed")
            }
        }
    }
}

impl From<SynthesisError> for ApiError {
    fn from(err: SynthesisError) -> Self {
        tracing::error!("Client synthesis failure: {}", err);
        ApiError::handler("Client build failed")
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        tracing::error!("JSON serialization error: {}", err);
        ApiError::handler("Failed to format response")
    }
}

// Standard error trait implementations
impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ApiError {}

// Automatic HTTP response conversion for Axum
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        if self.is_auth_failure() {
            tracing::warn!("Request rejected: {} ({})", self.message(), self.error_code());
        } else if self.status_code() >= 500 {
            tracing::error!("Request failed: {} ({})", self.message(), self.error_code());
        }
        let status = StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.to_json())).into_response()
    }
}
