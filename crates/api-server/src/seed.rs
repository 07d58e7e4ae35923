//! Demo users for the in-memory directory.
//!
//! Used only when no database is configured. Credentials are overridable via
//! environment so a demo box is not forced to ship the defaults.

use std::collections::HashSet;
use std::sync::Arc;

use security::{hash_password, MemoryUserDirectory, Role, User};

struct SeedAccount {
    id: &'static str,
    username: &'static str,
    email: &'static str,
    password_env: &'static str,
    default_password: &'static str,
    role: Role,
    permissions: &'static [&'static str],
}

const SEED_USERS: &[SeedAccount] = &[
    SeedAccount {
        id: "user-admin-001",
        username: "admin",
        email: "admin@arb.local",
        password_env: "SEED_ADMIN_PASSWORD",
        default_password: "admin123",
        role: Role::Admin,
        permissions: &[],
    },
    SeedAccount {
        id: "user-trader-002",
        username: "trader",
        email: "trader@arb.local",
        password_env: "SEED_TRADER_PASSWORD",
        default_password: "trader123",
        role: Role::Trader,
        permissions: &["execute_trades", "view_dashboard"],
    },
    SeedAccount {
        id: "user-viewer-003",
        username: "viewer",
        email: "viewer@arb.local",
        password_env: "SEED_VIEWER_PASSWORD",
        default_password: "viewer123",
        role: Role::Viewer,
        permissions: &["view_dashboard"],
    },
];

// Demo-only TOTP secret for the seeded admin (20 bytes, base32).
pub const DEFAULT_ADMIN_TOTP_SECRET: &str = "JBSWY3DPEHPK3PXPJBSWY3DPEHPK3PXP";

/// Populate the in-memory directory with the demo accounts. The admin has
/// 2FA enrolled; `SEED_ADMIN_TOTP_SECRET` (base32) overrides the demo secret.
pub async fn seed_demo_users(directory: &Arc<MemoryUserDirectory>) -> anyhow::Result<()> {
    let admin_totp = std::env::var("SEED_ADMIN_TOTP_SECRET")
        .unwrap_or_else(|_| DEFAULT_ADMIN_TOTP_SECRET.to_string());

    for account in SEED_USERS {
        let password =
            std::env::var(account.password_env).unwrap_or_else(|_| account.default_password.to_string());
        let two_factor_secret = if account.role == Role::Admin {
            Some(admin_totp.clone())
        } else {
            None
        };

        let user = User {
            id: account.id.to_string(),
            username: account.username.to_string(),
            email: account.email.to_string(),
            password_hash: hash_password(&password)?,
            role: account.role,
            two_factor_enabled: two_factor_secret.is_some(),
            two_factor_secret,
            permissions: account
                .permissions
                .iter()
                .map(|s| s.to_string())
                .collect::<HashSet<_>>(),
            refresh_token: None,
        };
        directory.insert(user).await;
        tracing::info!(
            username = account.username,
            role = account.role.as_str(),
            "Seeded demo user"
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use security::UserDirectory;

    #[tokio::test]
    async fn test_seed_creates_all_roles() {
        let dir = Arc::new(MemoryUserDirectory::new());
        seed_demo_users(&dir).await.unwrap();

        let admin = dir.find_by_username("admin").await.unwrap().unwrap();
        assert_eq!(admin.role, Role::Admin);
        assert!(admin.two_factor_enabled);
        assert!(admin.two_factor_secret.is_some());

        let trader = dir.find_by_username("trader").await.unwrap().unwrap();
        assert_eq!(trader.role, Role::Trader);
        assert!(trader.has_permission("execute_trades"));

        let viewer = dir.find_by_username("viewer").await.unwrap().unwrap();
        assert_eq!(viewer.role, Role::Viewer);
        assert!(!viewer.has_permission("execute_trades"));
    }
}
