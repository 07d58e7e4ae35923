//! Audit log query handler.

use axum::extract::{Query, State};
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};

use security::{AccessClaims, AuditAction, AuditFilter, Role};

use crate::error::ApiResult;
use crate::state::AppState;

/// Audit log query parameters.
#[derive(Debug, Deserialize, IntoParams)]
pub struct AuditLogQuery {
    /// 1-based page number.
    pub page: Option<u32>,
    /// Page size, clamped server-side.
    pub limit: Option<u32>,
    /// Filter by user id. Ignored for viewers, who only see their own
    /// entries.
    pub user_id: Option<String>,
    /// Filter by action tag, e.g. `login_fail`.
    pub action: Option<String>,
    /// Inclusive range start.
    pub start: Option<DateTime<Utc>>,
    /// Inclusive range end.
    pub end: Option<DateTime<Utc>>,
}

/// One audit entry.
#[derive(Debug, Serialize, ToSchema)]
pub struct AuditEntryDto {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub user_id: Option<String>,
    pub action: String,
    pub details: serde_json::Value,
    pub ip_address: Option<String>,
}

/// One page of audit entries, newest first.
#[derive(Debug, Serialize, ToSchema)]
pub struct AuditLogsResponse {
    pub entries: Vec<AuditEntryDto>,
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u64,
}

/// Query the audit trail.
#[utoipa::path(
    get,
    path = "/api/v1/security/audit-logs",
    params(AuditLogQuery),
    responses(
        (status = 200, description = "Audit entries", body = AuditLogsResponse),
        (status = 401, description = "Not authenticated"),
    ),
    security(("bearer_auth" = [])),
    tag = "security"
)]
pub async fn audit_logs(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<AccessClaims>,
    Query(query): Query<AuditLogQuery>,
) -> ApiResult<Json<AuditLogsResponse>> {
    let mut filter = AuditFilter::new();

    // Viewers are scoped to their own trail regardless of what they ask for.
    filter.user_id = if claims.role == Role::Viewer {
        Some(claims.sub.clone())
    } else {
        query.user_id
    };
    filter.action = query.action.as_deref().map(AuditAction::from_tag);
    filter.start = query.start;
    filter.end = query.end;

    let page = state
        .audit
        .query(query.page.unwrap_or(1), query.limit.unwrap_or(50), &filter)
        .await?;

    Ok(Json(AuditLogsResponse {
        entries: page
            .entries
            .into_iter()
            .map(|e| AuditEntryDto {
                id: e.id,
                timestamp: e.timestamp,
                user_id: e.user_id,
                action: e.action.as_tag().to_string(),
                details: e.details,
                ip_address: e.ip_address.map(|ip| ip.to_string()),
            })
            .collect(),
        page: page.page,
        limit: page.limit,
        total: page.total,
        total_pages: page.total_pages,
    }))
}
