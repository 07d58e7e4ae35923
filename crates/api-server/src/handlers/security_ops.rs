//! Security operation handlers: envelope encryption and critical-operation
//! validation.

use axum::extract::State;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use security::{AccessClaims, AuditAction, Operation, SecurityError};

use crate::error::ApiResult;
use crate::handlers::ClientIp;
use crate::state::AppState;

/// Encryption request.
#[derive(Debug, Deserialize, ToSchema)]
pub struct EncryptRequest {
    /// Plaintext to protect.
    pub data: String,
}

/// Encryption response.
#[derive(Debug, Serialize, ToSchema)]
pub struct EncryptResponse {
    /// Hex envelope: IV, auth tag, ciphertext.
    pub encrypted: String,
}

/// Decryption request.
#[derive(Debug, Deserialize, ToSchema)]
pub struct DecryptRequest {
    pub encrypted: String,
}

/// Decryption response.
#[derive(Debug, Serialize, ToSchema)]
pub struct DecryptResponse {
    pub decrypted: String,
}

/// Critical operation validation request.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ValidateOperationRequest {
    /// Operation tag: `mode_switch`, `trade_execution`, or `config_update`.
    pub operation_type: String,
    /// Operation payload, shape depends on the type.
    #[serde(default)]
    pub data: serde_json::Value,
    /// Caller's explicit confirmation for large trades.
    #[serde(default)]
    pub confirmed: bool,
}

/// Validation verdict for an allowed operation. Denials are reported as
/// error responses with `allowed: false` in the details.
#[derive(Debug, Serialize, ToSchema)]
pub struct ValidateOperationResponse {
    pub allowed: bool,
    /// The client should re-prompt for a TOTP code before proceeding.
    pub requires_two_factor: bool,
}

/// Encrypt data under the platform key.
#[utoipa::path(
    post,
    path = "/api/v1/security/encrypt",
    request_body = EncryptRequest,
    responses(
        (status = 200, description = "Data encrypted", body = EncryptResponse),
        (status = 401, description = "Not authenticated"),
    ),
    security(("bearer_auth" = [])),
    tag = "security"
)]
pub async fn encrypt(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<AccessClaims>,
    ClientIp(ip): ClientIp,
    Json(req): Json<EncryptRequest>,
) -> ApiResult<Json<EncryptResponse>> {
    let encrypted = state.encryption.encrypt(req.data.as_bytes())?;
    state
        .audit
        .append(
            Some(&claims.sub),
            AuditAction::EncryptData,
            serde_json::json!({ "plaintext_len": req.data.len() }),
            ip,
        )
        .await;
    Ok(Json(EncryptResponse { encrypted }))
}

/// Decrypt a stored envelope. Admin only.
#[utoipa::path(
    post,
    path = "/api/v1/security/decrypt",
    request_body = DecryptRequest,
    responses(
        (status = 200, description = "Data decrypted", body = DecryptResponse),
        (status = 400, description = "Malformed, tampered, or wrong-key envelope"),
        (status = 403, description = "Admin role required"),
    ),
    security(("bearer_auth" = [])),
    tag = "security"
)]
pub async fn decrypt(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<AccessClaims>,
    ClientIp(ip): ClientIp,
    Json(req): Json<DecryptRequest>,
) -> ApiResult<Json<DecryptResponse>> {
    let plaintext = state.encryption.decrypt(&req.encrypted)?;
    let decrypted =
        String::from_utf8(plaintext).map_err(|_| SecurityError::DecryptionFailed)?;
    state
        .audit
        .append(
            Some(&claims.sub),
            AuditAction::DecryptData,
            serde_json::Value::Null,
            ip,
        )
        .await;
    Ok(Json(DecryptResponse { decrypted }))
}

/// Validate a critical operation against the caller's role and the
/// confirmation policy.
#[utoipa::path(
    post,
    path = "/api/v1/security/validate-operation",
    request_body = ValidateOperationRequest,
    responses(
        (status = 200, description = "Operation allowed", body = ValidateOperationResponse),
        (status = 400, description = "Denied: unknown type or missing confirmation"),
        (status = 403, description = "Denied: insufficient role"),
    ),
    security(("bearer_auth" = [])),
    tag = "security"
)]
pub async fn validate_operation(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<AccessClaims>,
    ClientIp(ip): ClientIp,
    Json(req): Json<ValidateOperationRequest>,
) -> ApiResult<Json<ValidateOperationResponse>> {
    let operation = Operation::parse(&req.operation_type, &req.data)?;

    // Stage one: confirmation precheck, before the user lookup.
    state
        .validator
        .precheck(&claims.sub, &operation, req.confirmed, ip)
        .await?;

    // Stage two: role policy, audited.
    let validated = state
        .validator
        .validate(&claims.sub, &operation, req.confirmed, ip)
        .await?;

    Ok(Json(ValidateOperationResponse {
        allowed: true,
        requires_two_factor: validated.requires_two_factor,
    }))
}
