//! PostgreSQL storage backend for the audit trail.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::net::IpAddr;

use crate::audit::{AuditAction, AuditEntry, AuditFilter, AuditStore};

/// Postgres-backed audit store. The table is append-only by convention:
/// nothing in this crate issues UPDATE or DELETE against it.
pub struct PostgresAuditStore {
    pool: PgPool,
}

impl PostgresAuditStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Database row for audit entries.
#[derive(Debug, sqlx::FromRow)]
struct AuditRow {
    id: i64,
    timestamp: DateTime<Utc>,
    user_id: Option<String>,
    action: String,
    details: Option<serde_json::Value>,
    ip_address: Option<String>,
}

impl AuditRow {
    fn into_entry(self) -> AuditEntry {
        AuditEntry {
            id: self.id,
            timestamp: self.timestamp,
            user_id: self.user_id,
            action: AuditAction::from_tag(&self.action),
            details: self.details.unwrap_or(serde_json::Value::Null),
            ip_address: self.ip_address.and_then(|s| s.parse::<IpAddr>().ok()),
        }
    }
}

/// Append the filter's WHERE clauses to `query`, returning the number of
/// bind parameters consumed.
fn push_filter_sql(query: &mut String, filter: &AuditFilter) -> usize {
    let mut param = 0;
    if filter.user_id.is_some() {
        param += 1;
        query.push_str(&format!(" AND user_id = ${param}"));
    }
    if filter.action.is_some() {
        param += 1;
        query.push_str(&format!(" AND action = ${param}"));
    }
    if filter.start.is_some() {
        param += 1;
        query.push_str(&format!(" AND timestamp >= ${param}"));
    }
    if filter.end.is_some() {
        param += 1;
        query.push_str(&format!(" AND timestamp <= ${param}"));
    }
    param
}

fn bind_filter<'q, O>(
    mut builder: sqlx::query::QueryAs<'q, sqlx::Postgres, O, sqlx::postgres::PgArguments>,
    filter: &'q AuditFilter,
) -> sqlx::query::QueryAs<'q, sqlx::Postgres, O, sqlx::postgres::PgArguments> {
    if let Some(ref user_id) = filter.user_id {
        builder = builder.bind(user_id);
    }
    if let Some(ref action) = filter.action {
        builder = builder.bind(action.as_tag().to_string());
    }
    if let Some(start) = filter.start {
        builder = builder.bind(start);
    }
    if let Some(end) = filter.end {
        builder = builder.bind(end);
    }
    builder
}

#[async_trait::async_trait]
impl AuditStore for PostgresAuditStore {
    async fn append(&self, entry: &AuditEntry) -> Result<i64> {
        let ip = entry.ip_address.map(|ip| ip.to_string());
        let row: (i64,) = sqlx::query_as(
            r#"
            INSERT INTO audit_log (timestamp, user_id, action, details, ip_address)
            VALUES ($1, $2, $3, $4, $5::inet)
            RETURNING id
            "#,
        )
        .bind(entry.timestamp)
        .bind(&entry.user_id)
        .bind(entry.action.as_tag())
        .bind(&entry.details)
        .bind(&ip)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }

    async fn query(
        &self,
        filter: &AuditFilter,
        limit: u32,
        offset: u64,
    ) -> Result<Vec<AuditEntry>> {
        let mut query = String::from(
            r#"
            SELECT id, timestamp, user_id, action, details, ip_address::text
            FROM audit_log
            WHERE 1=1
            "#,
        );
        let mut param = push_filter_sql(&mut query, filter);

        query.push_str(" ORDER BY timestamp DESC, id DESC");
        param += 1;
        query.push_str(&format!(" LIMIT ${param}"));
        param += 1;
        query.push_str(&format!(" OFFSET ${param}"));

        let builder = bind_filter(sqlx::query_as::<_, AuditRow>(&query), filter)
            .bind(limit as i64)
            .bind(offset as i64);

        let rows = builder.fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(AuditRow::into_entry).collect())
    }

    async fn count(&self, filter: &AuditFilter) -> Result<u64> {
        let mut query = String::from("SELECT COUNT(*) FROM audit_log WHERE 1=1");
        push_filter_sql(&mut query, filter);

        let builder = bind_filter(sqlx::query_as::<_, (i64,)>(&query), filter);
        let (count,) = builder.fetch_one(&self.pool).await?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_sql_parameter_numbering() {
        let mut sql = String::from("SELECT COUNT(*) FROM audit_log WHERE 1=1");
        let filter = AuditFilter::new()
            .user("u1")
            .action(AuditAction::LoginSuccess);
        let params = push_filter_sql(&mut sql, &filter);
        assert_eq!(params, 2);
        assert!(sql.contains("user_id = $1"));
        assert!(sql.contains("action = $2"));
    }

    #[test]
    fn test_empty_filter_adds_no_clauses() {
        let mut sql = String::from("SELECT COUNT(*) FROM audit_log WHERE 1=1");
        assert_eq!(push_filter_sql(&mut sql, &AuditFilter::new()), 0);
        assert_eq!(sql, "SELECT COUNT(*) FROM audit_log WHERE 1=1");
    }
}
