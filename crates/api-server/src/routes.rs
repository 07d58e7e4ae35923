//! API route definitions.

use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::handlers::{arbitrage, audit, auth, health, security_ops};
use crate::middleware;
use crate::state::AppState;

/// OpenAPI documentation.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Arbitrage Platform Trust API",
        version = "1.0.0",
        description = "Authentication, authorization, and security operations for the arbitrage platform"
    ),
    paths(
        health::health_check,
        health::readiness,
        auth::login,
        auth::verify_two_factor,
        auth::refresh,
        auth::logout,
        security_ops::encrypt,
        security_ops::decrypt,
        security_ops::validate_operation,
        audit::audit_logs,
        arbitrage::list_opportunities,
        arbitrage::execute_trade,
    ),
    components(
        schemas(
            crate::error::ErrorResponse,
            health::HealthResponse,
            auth::LoginRequest,
            auth::VerifyTwoFactorRequest,
            auth::RefreshRequest,
            auth::SessionResponse,
            auth::TwoFactorChallenge,
            auth::RefreshResponse,
            auth::UserInfo,
            security_ops::EncryptRequest,
            security_ops::EncryptResponse,
            security_ops::DecryptRequest,
            security_ops::DecryptResponse,
            security_ops::ValidateOperationRequest,
            security_ops::ValidateOperationResponse,
            audit::AuditEntryDto,
            audit::AuditLogsResponse,
            arbitrage::OpportunityDto,
            arbitrage::ExecuteTradeRequest,
            arbitrage::TradeResultDto,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "auth", description = "Authentication and token lifecycle"),
        (name = "security", description = "Encryption, operation validation, audit trail"),
        (name = "arbitrage", description = "Opportunity scanning and trade execution"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Create the main router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    // Pre-auth routes, rate limited by client IP.
    let public_auth = Router::new()
        .route("/api/v1/auth/login", post(auth::login))
        .route("/api/v1/auth/2fa/verify", post(auth::verify_two_factor))
        .route("/api/v1/auth/refresh", post(auth::refresh))
        .route_layer(from_fn_with_state(state.clone(), middleware::rate_limit));

    // Authenticated routes, rate limited by user id.
    let protected = Router::new()
        .route("/api/v1/auth/logout", post(auth::logout))
        .route("/api/v1/security/encrypt", post(security_ops::encrypt))
        .route(
            "/api/v1/security/validate-operation",
            post(security_ops::validate_operation),
        )
        .route("/api/v1/security/audit-logs", get(audit::audit_logs))
        .route(
            "/api/v1/arbitrage/opportunities",
            get(arbitrage::list_opportunities),
        )
        .route_layer(from_fn_with_state(state.clone(), middleware::rate_limit))
        .route_layer(from_fn_with_state(state.clone(), middleware::require_auth));

    // Trading routes additionally require a trading role.
    let trading = Router::new()
        .route("/api/v1/arbitrage/execute", post(arbitrage::execute_trade))
        .route_layer(from_fn_with_state(state.clone(), middleware::rate_limit))
        .route_layer(from_fn(middleware::require_trader))
        .route_layer(from_fn_with_state(state.clone(), middleware::require_auth));

    // Admin routes.
    let admin = Router::new()
        .route("/api/v1/security/decrypt", post(security_ops::decrypt))
        .route_layer(from_fn_with_state(state.clone(), middleware::rate_limit))
        .route_layer(from_fn(middleware::require_admin))
        .route_layer(from_fn_with_state(state.clone(), middleware::require_auth));

    Router::new()
        // Health endpoints
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness))
        .merge(public_auth)
        .merge(protected)
        .merge(trading)
        .merge(admin)
        // Swagger UI
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Add state
        .with_state(state)
}
