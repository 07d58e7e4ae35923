//! Append-only audit trail for security-relevant decisions.
//!
//! Every gate decision, login outcome, and secret access lands here. Entries
//! are immutable once written and queried newest-first.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Tags for auditable actions. `Custom` is the escape hatch for actions the
/// core does not know about (callers outside this crate).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    LoginSuccess,
    LoginFail,
    LoginTwoFactorRequired,
    TwoFactorVerifySuccess,
    TwoFactorVerifyFail,
    RefreshTokenSuccess,
    RefreshTokenFail,
    Logout,
    EncryptData,
    DecryptData,
    ValidateOperation,
    Custom(String),
}

impl AuditAction {
    /// Stable tag string, as stored and as matched by query filters.
    pub fn as_tag(&self) -> &str {
        match self {
            AuditAction::LoginSuccess => "login_success",
            AuditAction::LoginFail => "login_fail",
            AuditAction::LoginTwoFactorRequired => "login_2fa_required",
            AuditAction::TwoFactorVerifySuccess => "2fa_verify_success",
            AuditAction::TwoFactorVerifyFail => "2fa_verify_fail",
            AuditAction::RefreshTokenSuccess => "refresh_token_success",
            AuditAction::RefreshTokenFail => "refresh_token_fail",
            AuditAction::Logout => "logout",
            AuditAction::EncryptData => "encrypt_data",
            AuditAction::DecryptData => "decrypt_data",
            AuditAction::ValidateOperation => "validate_operation",
            AuditAction::Custom(s) => s,
        }
    }

    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "login_success" => AuditAction::LoginSuccess,
            "login_fail" => AuditAction::LoginFail,
            "login_2fa_required" => AuditAction::LoginTwoFactorRequired,
            "2fa_verify_success" => AuditAction::TwoFactorVerifySuccess,
            "2fa_verify_fail" => AuditAction::TwoFactorVerifyFail,
            "refresh_token_success" => AuditAction::RefreshTokenSuccess,
            "refresh_token_fail" => AuditAction::RefreshTokenFail,
            "logout" => AuditAction::Logout,
            "encrypt_data" => AuditAction::EncryptData,
            "decrypt_data" => AuditAction::DecryptData,
            "validate_operation" => AuditAction::ValidateOperation,
            other => AuditAction::Custom(other.to_string()),
        }
    }
}

/// One immutable audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    /// None for pre-authentication failures (e.g. login with unknown user).
    pub user_id: Option<String>,
    pub action: AuditAction,
    /// Structured key/value context. Never contains passwords or secrets.
    pub details: serde_json::Value,
    pub ip_address: Option<IpAddr>,
}

/// Filter for audit queries. All supplied fields must match.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditFilter {
    pub user_id: Option<String>,
    pub action: Option<AuditAction>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl AuditFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn action(mut self, action: AuditAction) -> Self {
        self.action = Some(action);
        self
    }

    pub fn between(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self.end = Some(end);
        self
    }
}

/// Storage backend for audit entries.
#[async_trait::async_trait]
pub trait AuditStore: Send + Sync {
    /// Persist one entry, returning its assigned id.
    async fn append(&self, entry: &AuditEntry) -> Result<i64>;

    /// Fetch entries matching the filter, newest first, sliced by
    /// offset/limit.
    async fn query(&self, filter: &AuditFilter, limit: u32, offset: u64)
        -> Result<Vec<AuditEntry>>;

    /// Count all entries matching the filter.
    async fn count(&self, filter: &AuditFilter) -> Result<u64>;
}

/// Concurrency-safe in-memory store for tests and demo deployments.
pub struct MemoryAuditStore {
    entries: RwLock<Vec<AuditEntry>>,
    next_id: AtomicI64,
}

impl MemoryAuditStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            next_id: AtomicI64::new(1),
        }
    }

    fn matches(entry: &AuditEntry, filter: &AuditFilter) -> bool {
        if let Some(ref user) = filter.user_id {
            if entry.user_id.as_ref() != Some(user) {
                return false;
            }
        }
        if let Some(ref action) = filter.action {
            if &entry.action != action {
                return false;
            }
        }
        if let Some(start) = filter.start {
            if entry.timestamp < start {
                return false;
            }
        }
        if let Some(end) = filter.end {
            if entry.timestamp > end {
                return false;
            }
        }
        true
    }
}

impl Default for MemoryAuditStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl AuditStore for MemoryAuditStore {
    async fn append(&self, entry: &AuditEntry) -> Result<i64> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut stored = entry.clone();
        stored.id = id;

        let mut entries = self.entries.write().await;
        entries.push(stored);
        Ok(id)
    }

    async fn query(
        &self,
        filter: &AuditFilter,
        limit: u32,
        offset: u64,
    ) -> Result<Vec<AuditEntry>> {
        let entries = self.entries.read().await;
        let mut matched: Vec<_> = entries
            .iter()
            .filter(|e| Self::matches(e, filter))
            .cloned()
            .collect();
        // Newest first; id breaks ties between entries in the same instant.
        matched.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        Ok(matched
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn count(&self, filter: &AuditFilter) -> Result<u64> {
        let entries = self.entries.read().await;
        Ok(entries.iter().filter(|e| Self::matches(e, filter)).count() as u64)
    }
}

/// One page of query results.
#[derive(Debug, Clone, Serialize)]
pub struct AuditPage {
    pub entries: Vec<AuditEntry>,
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u64,
}

/// Facade the rest of the core writes through.
pub struct AuditLog {
    store: Arc<dyn AuditStore>,
}

impl AuditLog {
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self { store }
    }

    /// Append one entry.
    ///
    /// A storage failure must never break the caller's critical path: it is
    /// logged locally and swallowed. The trade-off (a security record can be
    /// silently lost) is deliberate; the alternative makes the audit store a
    /// single point of failure for every authentication decision.
    pub async fn append(
        &self,
        user_id: Option<&str>,
        action: AuditAction,
        details: serde_json::Value,
        ip_address: Option<IpAddr>,
    ) {
        let entry = AuditEntry {
            id: 0, // assigned by the store
            timestamp: Utc::now(),
            user_id: user_id.map(String::from),
            action,
            details,
            ip_address,
        };
        if let Err(e) = self.store.append(&entry).await {
            tracing::error!(
                error = %e,
                action = entry.action.as_tag(),
                "Failed to persist audit entry"
            );
        }
    }

    /// Paginated, filtered query. Pages are 1-based; `limit` is clamped to
    /// a sane range so a caller cannot request the whole table at once.
    pub async fn query(
        &self,
        page: u32,
        limit: u32,
        filter: &AuditFilter,
    ) -> Result<AuditPage> {
        let page = page.max(1);
        let limit = limit.clamp(1, 200);
        // u64 arithmetic: page and limit are caller-supplied, and the
        // largest page number times the largest limit overflows u32.
        let offset = (page as u64 - 1) * limit as u64;

        let total = self.store.count(filter).await?;
        let entries = self.store.query(filter, limit, offset).await?;
        let total_pages = total.div_ceil(limit as u64);

        Ok(AuditPage {
            entries,
            page,
            limit,
            total,
            total_pages,
        })
    }
}
