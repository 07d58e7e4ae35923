//! Shared application state.

use sqlx::PgPool;
use std::sync::Arc;

use arb_engine::{ExecutorConfig, OpportunityScanner, TradeExecutor};
use security::{
    AuditLog, AuthenticationService, AuthorizationGate, CriticalOperationValidator,
    EncryptionService, MemoryAuditStore, MemoryUserDirectory, PgUserDirectory,
    PostgresAuditStore, RateLimitConfig, RateLimiter, TokenConfig, TokenService,
    UserDirectory,
};

use crate::seed;
use crate::ServerConfig;

/// Application state shared across request handlers.
pub struct AppState {
    pub auth: AuthenticationService,
    pub gate: AuthorizationGate,
    pub validator: CriticalOperationValidator,
    pub encryption: EncryptionService,
    pub audit: Arc<AuditLog>,
    pub rate_limiter: Arc<RateLimiter>,
    pub scanner: OpportunityScanner,
    pub executor: TradeExecutor,
    /// Present only when running against Postgres.
    pub pool: Option<PgPool>,
}

impl AppState {
    /// Build the state graph. With a pool, users and audit entries live in
    /// Postgres; without one, in-memory stores are used and demo users are
    /// seeded.
    pub async fn new(config: &ServerConfig, pool: Option<PgPool>) -> anyhow::Result<Self> {
        let tokens = Arc::new(TokenService::new(TokenConfig {
            access_secret: config.access_secret.clone(),
            refresh_secret: config.refresh_secret.clone(),
            ..TokenConfig::default()
        }));

        let (users, audit_log): (Arc<dyn UserDirectory>, Arc<AuditLog>) = match &pool {
            Some(pool) => {
                tracing::info!("Using Postgres-backed user directory and audit store");
                (
                    Arc::new(PgUserDirectory::new(pool.clone())),
                    Arc::new(AuditLog::new(Arc::new(PostgresAuditStore::new(
                        pool.clone(),
                    )))),
                )
            }
            None => {
                tracing::warn!("DATABASE_URL not set; using in-memory stores with demo users");
                let directory = Arc::new(MemoryUserDirectory::new());
                seed::seed_demo_users(&directory).await?;
                (
                    directory,
                    Arc::new(AuditLog::new(Arc::new(MemoryAuditStore::new()))),
                )
            }
        };

        let encryption = EncryptionService::from_hex_key(&config.encryption_key_hex)?;

        let validator = CriticalOperationValidator::new(users.clone(), audit_log.clone())
            .with_threshold(config.confirmation_threshold_usd);

        let rate_limiter = Arc::new(RateLimiter::new(RateLimitConfig {
            window: std::time::Duration::from_secs(config.rate_limit_window_secs),
            max_requests: config.rate_limit_max_requests,
        }));

        Ok(Self {
            auth: AuthenticationService::new(users, tokens.clone(), audit_log.clone()),
            gate: AuthorizationGate::new(tokens),
            validator,
            encryption,
            audit: audit_log,
            rate_limiter,
            scanner: OpportunityScanner::new(),
            executor: TradeExecutor::new(ExecutorConfig::default()),
            pool,
        })
    }
}
