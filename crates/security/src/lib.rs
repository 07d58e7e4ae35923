//! Trust and Access Control
//!
//! Authentication with TOTP 2FA, JWT token lifecycle, role and permission
//! gates, critical-operation validation, envelope encryption, audit logging,
//! and rate limiting for the arbitrage platform.

pub mod audit;
pub mod audit_store_pg;
pub mod auth_service;
pub mod critical;
pub mod encryption;
pub mod error;
pub mod gate;
pub mod rate_limit;
pub mod token;
pub mod totp;
pub mod user;

pub use audit::{AuditAction, AuditEntry, AuditFilter, AuditLog, AuditPage, AuditStore, MemoryAuditStore};
pub use audit_store_pg::PostgresAuditStore;
pub use auth_service::{AuthOutcome, AuthenticationService, UserProfile};
pub use critical::{CriticalOperationValidator, Operation, TradingMode, Validated};
pub use encryption::EncryptionService;
pub use error::{SecurityError, SecurityResult};
pub use gate::AuthorizationGate;
pub use rate_limit::{spawn_sweeper, RateLimitConfig, RateLimiter};
pub use token::{AccessClaims, RefreshClaims, TokenConfig, TokenPair, TokenService};
pub use user::{
    hash_password, verify_password, MemoryUserDirectory, PgUserDirectory, Role, User,
    UserDirectory,
};
