//! Authentication handlers: login, 2FA verification, token refresh, logout.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use security::{AccessClaims, AuthOutcome, UserProfile};

use crate::error::ApiResult;
use crate::handlers::ClientIp;
use crate::state::AppState;

/// Login request.
#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    /// TOTP code, required only when the account has 2FA enabled. May also
    /// be supplied later via the verify endpoint.
    #[serde(default)]
    pub two_factor_code: Option<String>,
}

/// 2FA verification request, completing a challenged login.
#[derive(Debug, Deserialize, ToSchema)]
pub struct VerifyTwoFactorRequest {
    pub user_id: String,
    pub code: String,
}

/// Refresh request.
#[derive(Debug, Deserialize, ToSchema)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// User information in session responses.
#[derive(Debug, Serialize, ToSchema)]
pub struct UserInfo {
    pub id: String,
    pub username: String,
    pub email: String,
    pub role: String,
    pub two_factor_enabled: bool,
    pub permissions: Vec<String>,
}

impl From<UserProfile> for UserInfo {
    fn from(profile: UserProfile) -> Self {
        let mut permissions: Vec<String> = profile.permissions.into_iter().collect();
        permissions.sort();
        Self {
            id: profile.id,
            username: profile.username,
            email: profile.email,
            role: profile.role.as_str().to_string(),
            two_factor_enabled: profile.two_factor_enabled,
            permissions,
        }
    }
}

/// Successful authentication: a token pair plus the user.
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub user: UserInfo,
}

/// Password was accepted but a TOTP code is still needed.
#[derive(Debug, Serialize, ToSchema)]
pub struct TwoFactorChallenge {
    pub requires_two_factor: bool,
    pub user_id: String,
}

/// New access token from a refresh.
#[derive(Debug, Serialize, ToSchema)]
pub struct RefreshResponse {
    pub access_token: String,
}

fn session_response(outcome: AuthOutcome) -> Response {
    match outcome {
        AuthOutcome::Success { tokens, user } => Json(SessionResponse {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            user: UserInfo::from(user),
        })
        .into_response(),
        AuthOutcome::TwoFactorRequired { user_id } => Json(TwoFactorChallenge {
            requires_two_factor: true,
            user_id,
        })
        .into_response(),
    }
}

/// Authenticate with username and password.
#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Authenticated, or 2FA challenge issued", body = SessionResponse),
        (status = 401, description = "Invalid credentials or 2FA code"),
        (status = 429, description = "Rate limit exceeded"),
    ),
    tag = "auth"
)]
pub async fn login(
    State(state): State<Arc<AppState>>,
    ClientIp(ip): ClientIp,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Response> {
    let outcome = state
        .auth
        .login(
            &req.username,
            &req.password,
            req.two_factor_code.as_deref(),
            ip,
        )
        .await?;
    Ok(session_response(outcome))
}

/// Complete a login that was challenged for a TOTP code.
#[utoipa::path(
    post,
    path = "/api/v1/auth/2fa/verify",
    request_body = VerifyTwoFactorRequest,
    responses(
        (status = 200, description = "Authenticated", body = SessionResponse),
        (status = 401, description = "Invalid 2FA code"),
    ),
    tag = "auth"
)]
pub async fn verify_two_factor(
    State(state): State<Arc<AppState>>,
    ClientIp(ip): ClientIp,
    Json(req): Json<VerifyTwoFactorRequest>,
) -> ApiResult<Response> {
    let outcome = state
        .auth
        .verify_two_factor(&req.user_id, &req.code, ip)
        .await?;
    Ok(session_response(outcome))
}

/// Exchange a refresh token for a new access token.
#[utoipa::path(
    post,
    path = "/api/v1/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New access token issued", body = RefreshResponse),
        (status = 403, description = "Expired, forged, or superseded refresh token"),
    ),
    tag = "auth"
)]
pub async fn refresh(
    State(state): State<Arc<AppState>>,
    ClientIp(ip): ClientIp,
    Json(req): Json<RefreshRequest>,
) -> ApiResult<Json<RefreshResponse>> {
    let access_token = state
        .auth
        .refresh(&req.refresh_token, ip)
        .await?;
    Ok(Json(RefreshResponse { access_token }))
}

/// Invalidate the caller's refresh token.
#[utoipa::path(
    post,
    path = "/api/v1/auth/logout",
    responses(
        (status = 204, description = "Logged out"),
        (status = 401, description = "Not authenticated"),
    ),
    security(("bearer_auth" = [])),
    tag = "auth"
)]
pub async fn logout(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<AccessClaims>,
    ClientIp(ip): ClientIp,
) -> ApiResult<StatusCode> {
    state.auth.logout(&claims.sub, ip).await?;
    Ok(StatusCode::NO_CONTENT)
}
