//! Authentication and rate-limiting middleware for API routes.

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header::AUTHORIZATION, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use std::sync::Arc;

use security::{AccessClaims, SecurityError};

use crate::error::ApiError;
use crate::state::AppState;

/// Extract and validate the bearer token from the Authorization header.
/// On success, injects [`AccessClaims`] into request extensions.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let bearer = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "));

    let claims = match state.gate.authenticate(bearer) {
        Ok(c) => c,
        Err(e) => {
            tracing::debug!(error = %e, "Authentication failed");
            return ApiError::from(e).into_response();
        }
    };

    tracing::debug!(user_id = %claims.sub, role = ?claims.role, "Authenticated request");
    request.extensions_mut().insert(claims);
    next.run(request).await
}

/// Require the admin role. Must be applied AFTER `require_auth`.
pub async fn require_admin(request: Request<Body>, next: Next) -> Response {
    let Some(claims) = request.extensions().get::<AccessClaims>() else {
        return ApiError::from(SecurityError::Unauthenticated).into_response();
    };
    if !claims.role.can_configure() {
        return ApiError::from(SecurityError::PermissionDenied(
            "requires role admin".to_string(),
        ))
        .into_response();
    }
    next.run(request).await
}

/// Require a trading role (trader or admin). Must be applied AFTER
/// `require_auth`.
pub async fn require_trader(request: Request<Body>, next: Next) -> Response {
    let Some(claims) = request.extensions().get::<AccessClaims>() else {
        return ApiError::from(SecurityError::Unauthenticated).into_response();
    };
    if !claims.role.can_trade() {
        return ApiError::from(SecurityError::PermissionDenied(
            "requires role trader or admin".to_string(),
        ))
        .into_response();
    }
    next.run(request).await
}

/// Sliding-window rate limiting.
///
/// Keyed by user id when the request is already authenticated, otherwise by
/// client IP so pre-auth endpoints (login) are still limited.
pub async fn rate_limit(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let key = match request.extensions().get::<AccessClaims>() {
        Some(claims) => claims.sub.clone(),
        None => request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|info| format!("ip:{}", info.0.ip()))
            .unwrap_or_else(|| "ip:unknown".to_string()),
    };

    if !state.rate_limiter.allow(&key) {
        return ApiError::from(SecurityError::RateLimitExceeded).into_response();
    }
    next.run(request).await
}
