//! User records and the directory the trust core consumes.
//!
//! The core does not own user storage: it talks to a [`UserDirectory`]
//! implementation. [`MemoryUserDirectory`] backs tests and single-node demo
//! deployments; [`PgUserDirectory`] is the persistent implementation.

use anyhow::{Context, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Platform roles, ordered from least to most privileged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Read-only access to dashboards and own audit entries.
    #[default]
    Viewer,
    /// Can execute trades and switch operating modes.
    Trader,
    /// Full access, including config updates and decryption of stored secrets.
    Admin,
}

impl Role {
    /// Check if this role can execute trades or switch modes.
    pub fn can_trade(&self) -> bool {
        matches!(self, Role::Trader | Role::Admin)
    }

    /// Check if this role can modify configuration.
    pub fn can_configure(&self) -> bool {
        matches!(self, Role::Admin)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Viewer => "viewer",
            Role::Trader => "trader",
            Role::Admin => "admin",
        }
    }
}

/// A user record as seen by the trust core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    /// Argon2 PHC-format hash. Never serialized into API responses.
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub two_factor_enabled: bool,
    /// Base32 TOTP secret, present only when 2FA is enabled.
    #[serde(skip_serializing)]
    pub two_factor_secret: Option<String>,
    /// Named permissions. Admin implicitly holds all of them.
    pub permissions: HashSet<String>,
    /// The single currently-valid refresh token, if any. Issuing a new one
    /// invalidates the prior one.
    #[serde(skip_serializing)]
    pub refresh_token: Option<String>,
}

impl User {
    /// True if the user holds the named permission, or is an admin.
    pub fn has_permission(&self, permission: &str) -> bool {
        self.role == Role::Admin || self.permissions.contains(permission)
    }
}

/// Hash a password with argon2id for storage.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {e}"))?
        .to_string();
    Ok(hash)
}

/// Verify a password against a stored argon2 hash.
///
/// Constant-time by construction (the argon2 verifier compares digests, not
/// inputs). An unparsable stored hash verifies as false rather than erroring,
/// so a corrupt record reads as a failed login, not a 500.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            tracing::error!(error = %e, "Stored password hash is unparsable");
            false
        }
    }
}

/// Lookup and refresh-token mutation interface the trust core consumes.
#[async_trait::async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>>;

    async fn find_by_id(&self, id: &str) -> Result<Option<User>>;

    async fn find_by_refresh_token(&self, token: &str) -> Result<Option<User>>;

    /// Set or clear (None) the user's stored refresh token.
    async fn update_refresh_token(&self, user_id: &str, token: Option<&str>) -> Result<()>;
}

/// Concurrency-safe in-memory directory for tests and demo deployments.
pub struct MemoryUserDirectory {
    users: RwLock<HashMap<String, User>>,
}

impl MemoryUserDirectory {
    pub fn new() -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
        }
    }

    pub async fn insert(&self, user: User) {
        let mut users = self.users.write().await;
        users.insert(user.id.clone(), user);
    }
}

impl Default for MemoryUserDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        let users = self.users.read().await;
        Ok(users.values().find(|u| u.username == username).cloned())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<User>> {
        let users = self.users.read().await;
        Ok(users.get(id).cloned())
    }

    async fn find_by_refresh_token(&self, token: &str) -> Result<Option<User>> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .find(|u| u.refresh_token.as_deref() == Some(token))
            .cloned())
    }

    async fn update_refresh_token(&self, user_id: &str, token: Option<&str>) -> Result<()> {
        let mut users = self.users.write().await;
        let user = users
            .get_mut(user_id)
            .with_context(|| format!("user {user_id} not found"))?;
        user.refresh_token = token.map(String::from);
        Ok(())
    }
}

/// Database row for users.
#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    username: String,
    email: String,
    password_hash: String,
    role: i16,
    two_factor_enabled: bool,
    two_factor_secret: Option<String>,
    permissions: Vec<String>,
    refresh_token: Option<String>,
}

impl UserRow {
    fn into_user(self) -> User {
        let role = match self.role {
            2 => Role::Admin,
            1 => Role::Trader,
            _ => Role::Viewer,
        };
        User {
            id: self.id.to_string(),
            username: self.username,
            email: self.email,
            password_hash: self.password_hash,
            role,
            two_factor_enabled: self.two_factor_enabled,
            two_factor_secret: self.two_factor_secret,
            permissions: self.permissions.into_iter().collect(),
            refresh_token: self.refresh_token,
        }
    }
}

const USER_COLUMNS: &str = "id, username, email, password_hash, role, two_factor_enabled, \
                            two_factor_secret, permissions, refresh_token";

/// PostgreSQL-backed directory.
pub struct PgUserDirectory {
    pool: PgPool,
}

impl PgUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl UserDirectory for PgUserDirectory {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(UserRow::into_user))
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<User>> {
        let user_id = match Uuid::parse_str(id) {
            Ok(u) => u,
            Err(_) => return Ok(None),
        };
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(UserRow::into_user))
    }

    async fn find_by_refresh_token(&self, token: &str) -> Result<Option<User>> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE refresh_token = $1"
        ))
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(UserRow::into_user))
    }

    async fn update_refresh_token(&self, user_id: &str, token: Option<&str>) -> Result<()> {
        let user_id = Uuid::parse_str(user_id).context("invalid user id")?;
        sqlx::query("UPDATE users SET refresh_token = $1, updated_at = NOW() WHERE id = $2")
            .bind(token)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_user(id: &str, username: &str, role: Role) -> User {
        User {
            id: id.to_string(),
            username: username.to_string(),
            email: format!("{username}@example.com"),
            password_hash: hash_password("correct horse battery staple").unwrap(),
            role,
            two_factor_enabled: false,
            two_factor_secret: None,
            permissions: HashSet::new(),
            refresh_token: None,
        }
    }

    #[test]
    fn test_password_roundtrip() {
        let hash = hash_password("s3cret").unwrap();
        assert!(verify_password("s3cret", &hash));
        assert!(!verify_password("wrong", &hash));
    }

    #[test]
    fn test_unparsable_hash_verifies_false() {
        assert!(!verify_password("anything", "not-a-phc-string"));
    }

    #[test]
    fn test_admin_wildcard_permission() {
        let mut user = test_user("u1", "alice", Role::Admin);
        assert!(user.has_permission("execute_trades"));
        assert!(user.has_permission("anything_at_all"));

        user.role = Role::Viewer;
        assert!(!user.has_permission("execute_trades"));
        user.permissions.insert("execute_trades".to_string());
        assert!(user.has_permission("execute_trades"));
    }

    #[tokio::test]
    async fn test_memory_directory_lookups() {
        let dir = MemoryUserDirectory::new();
        dir.insert(test_user("u1", "alice", Role::Trader)).await;

        let found = dir.find_by_username("alice").await.unwrap().unwrap();
        assert_eq!(found.id, "u1");
        assert!(dir.find_by_username("bob").await.unwrap().is_none());
        assert!(dir.find_by_id("u1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_refresh_token_overwrite() {
        let dir = MemoryUserDirectory::new();
        dir.insert(test_user("u1", "alice", Role::Trader)).await;

        dir.update_refresh_token("u1", Some("token-a")).await.unwrap();
        assert!(dir.find_by_refresh_token("token-a").await.unwrap().is_some());

        // A new token invalidates the prior one: at most one valid refresh
        // token per user.
        dir.update_refresh_token("u1", Some("token-b")).await.unwrap();
        assert!(dir.find_by_refresh_token("token-a").await.unwrap().is_none());
        assert!(dir.find_by_refresh_token("token-b").await.unwrap().is_some());

        dir.update_refresh_token("u1", None).await.unwrap();
        assert!(dir.find_by_refresh_token("token-b").await.unwrap().is_none());
    }
}
