//! API Server
//!
//! REST API for the arbitrage platform's trust core.
//!
//! # Features
//!
//! - **Authentication**: password + TOTP login, access/refresh JWT lifecycle
//! - **Authorization**: role and permission gates on every protected route
//! - **Security operations**: envelope encryption, critical-operation
//!   validation, audit trail queries
//! - **OpenAPI**: auto-generated Swagger documentation
//!
//! # Example
//!
//! ```ignore
//! use api_server::{ApiServer, ServerConfig};
//!
//! let config = ServerConfig::from_env();
//! let server = ApiServer::new(config, None).await?;
//! server.run().await?;
//! ```

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod seed;
pub mod state;

pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;

use axum::extract::DefaultBodyLimit;
use axum::http::Request;
use rust_decimal::Decimal;
use sqlx::PgPool;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{DefaultOnResponse, TraceLayer};
use tracing::Level;

// Development-only key; never valid for production deployments.
const DEV_ENCRYPTION_KEY_HEX: &str =
    "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Enable CORS for all origins (development only).
    pub cors_permissive: bool,
    /// Secret for signing access tokens.
    pub access_secret: String,
    /// Secret for signing refresh tokens. Must differ from the access secret.
    pub refresh_secret: String,
    /// 256-bit envelope encryption key, hex encoded.
    pub encryption_key_hex: String,
    /// Rate limit window length in seconds.
    pub rate_limit_window_secs: u64,
    /// Requests admitted per identity per window.
    pub rate_limit_max_requests: usize,
    /// Trades above this notional need explicit confirmation.
    pub confirmation_threshold_usd: Decimal,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            cors_permissive: true,
            access_secret: "development-access-secret-change-in-production".to_string(),
            refresh_secret: "development-refresh-secret-change-in-production".to_string(),
            encryption_key_hex: DEV_ENCRYPTION_KEY_HEX.to_string(),
            rate_limit_window_secs: 60,
            rate_limit_max_requests: 100,
            confirmation_threshold_usd: Decimal::from(1000),
        }
    }
}

impl ServerConfig {
    /// Create from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("API_HOST").unwrap_or(defaults.host),
            port: std::env::var("PORT")
                .or_else(|_| std::env::var("API_PORT"))
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            cors_permissive: std::env::var("CORS_PERMISSIVE")
                .map(|v| v == "true")
                .unwrap_or(defaults.cors_permissive),
            access_secret: std::env::var("JWT_ACCESS_SECRET").unwrap_or(defaults.access_secret),
            refresh_secret: std::env::var("JWT_REFRESH_SECRET").unwrap_or(defaults.refresh_secret),
            encryption_key_hex: std::env::var("ENCRYPTION_KEY")
                .unwrap_or(defaults.encryption_key_hex),
            rate_limit_window_secs: std::env::var("RATE_LIMIT_WINDOW_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.rate_limit_window_secs),
            rate_limit_max_requests: std::env::var("RATE_LIMIT_MAX_REQUESTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.rate_limit_max_requests),
            confirmation_threshold_usd: std::env::var("CONFIRMATION_THRESHOLD_USD")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.confirmation_threshold_usd),
        }
    }

    /// Get the socket address.
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid bind address: {e}"))
    }
}

/// The API server.
pub struct ApiServer {
    config: ServerConfig,
    state: Arc<AppState>,
}

impl ApiServer {
    /// Create a new API server. `pool` is optional: without it the server
    /// runs on in-memory stores with seeded demo users.
    pub async fn new(config: ServerConfig, pool: Option<PgPool>) -> anyhow::Result<Self> {
        if config.access_secret == config.refresh_secret {
            anyhow::bail!("JWT_ACCESS_SECRET and JWT_REFRESH_SECRET must differ");
        }
        let state = Arc::new(AppState::new(&config, pool).await?);
        Ok(Self { config, state })
    }

    /// Run the server.
    pub async fn run(self) -> anyhow::Result<()> {
        let router = create_router(self.state.clone())
            .layer(
                TraceLayer::new_for_http()
                    .on_request(|request: &Request<_>, _span: &tracing::Span| {
                        tracing::info!(
                            method = %request.method(),
                            uri = %request.uri(),
                            "Incoming request"
                        );
                    })
                    .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
            )
            .layer(DefaultBodyLimit::max(1024 * 1024)) // 1 MB
            .layer(if self.config.cors_permissive {
                CorsLayer::permissive()
            } else {
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any)
            });

        // Periodic retention sweep for the rate limiter's key map.
        security::spawn_sweeper(self.state.rate_limiter.clone(), Duration::from_secs(60));

        let addr = self.config.socket_addr()?;
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!(%addr, "API server listening");

        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await?;
        Ok(())
    }
}
