//! API error types and handling.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use security::SecurityError;

/// API error response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Additional details (optional).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// API error type.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Infrastructure failure outside the security taxonomy.
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),

    #[error(transparent)]
    Security(#[from] SecurityError),
}

impl ApiError {
    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Security(e) => match e {
                // Bad or missing credentials, or no token at all.
                SecurityError::InvalidCredentials
                | SecurityError::InvalidTwoFactorCode
                | SecurityError::Unauthenticated => StatusCode::UNAUTHORIZED,
                // A token was presented but does not grant access. Expired
                // and forged tokens carry distinct codes so clients know
                // whether a refresh is worth attempting.
                SecurityError::TokenExpired
                | SecurityError::TokenInvalid
                | SecurityError::PermissionDenied(_) => StatusCode::FORBIDDEN,
                SecurityError::ConfirmationRequired(_)
                | SecurityError::UnknownOperationType(_)
                | SecurityError::InvalidOperationPayload(_)
                | SecurityError::DecryptionFailed => StatusCode::BAD_REQUEST,
                SecurityError::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
                SecurityError::NotFound(_) => StatusCode::NOT_FOUND,
                SecurityError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    /// Get the error code string.
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::Internal(_) => "INTERNAL_ERROR",
            ApiError::Security(e) => e.code(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // 500s indicate bugs or infrastructure failure; log them here so the
        // response body can stay terse.
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(
                error_code = self.error_code(),
                error = %self,
                "Internal server error"
            );
        }

        let mut body = ErrorResponse::new(self.error_code(), self.to_string());

        // Denied operation validations carry the decision in the body, not
        // just the status line.
        if let ApiError::Security(
            SecurityError::ConfirmationRequired(_) | SecurityError::UnknownOperationType(_),
        ) = &self
        {
            body = body.with_details(serde_json::json!({ "allowed": false }));
        }

        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;
