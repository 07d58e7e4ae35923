//! Error taxonomy shared by every security component.

use thiserror::Error;

/// Failures surfaced by the trust core.
///
/// Each variant carries a stable reason string suitable for API responses;
/// internal detail (which byte of a tag mismatched, which lookup failed) is
/// logged locally and never included here.
#[derive(Debug, Error)]
pub enum SecurityError {
    /// Unknown user or wrong password. The two causes are deliberately
    /// indistinguishable to prevent username enumeration.
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid two-factor code")]
    InvalidTwoFactorCode,

    #[error("Token expired")]
    TokenExpired,

    #[error("Token invalid")]
    TokenInvalid,

    /// No token was presented at all.
    #[error("Authentication required")]
    Unauthenticated,

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// A critical operation above the confirmation threshold arrived without
    /// the caller-supplied confirmation flag.
    #[error("Confirmation required: {0}")]
    ConfirmationRequired(String),

    #[error("Unknown operation type: {0}")]
    UnknownOperationType(String),

    /// A recognized operation type arrived with a payload that does not
    /// match its shape (missing or mistyped fields).
    #[error("Invalid operation payload: {0}")]
    InvalidOperationPayload(String),

    /// Malformed envelope, wrong key, or tampered data. Callers cannot tell
    /// which from the response shape.
    #[error("Decryption failed")]
    DecryptionFailed,

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Not found: {0}")]
    NotFound(String),

    /// Storage backend failure (user directory or audit store).
    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl SecurityError {
    /// Stable machine-readable code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            SecurityError::InvalidCredentials => "INVALID_CREDENTIALS",
            SecurityError::InvalidTwoFactorCode => "INVALID_2FA_CODE",
            SecurityError::TokenExpired => "TOKEN_EXPIRED",
            SecurityError::TokenInvalid => "TOKEN_INVALID",
            SecurityError::Unauthenticated => "UNAUTHENTICATED",
            SecurityError::PermissionDenied(_) => "PERMISSION_DENIED",
            SecurityError::ConfirmationRequired(_) => "CONFIRMATION_REQUIRED",
            SecurityError::UnknownOperationType(_) => "UNKNOWN_OPERATION_TYPE",
            SecurityError::InvalidOperationPayload(_) => "INVALID_OPERATION_PAYLOAD",
            SecurityError::DecryptionFailed => "DECRYPTION_FAILED",
            SecurityError::RateLimitExceeded => "RATE_LIMITED",
            SecurityError::NotFound(_) => "NOT_FOUND",
            SecurityError::Storage(_) => "STORAGE_ERROR",
        }
    }
}

/// Result alias used throughout the crate.
pub type SecurityResult<T> = Result<T, SecurityError>;
