//! Authentication orchestration: credential check, second factor, token
//! lifecycle. Every attempt is audited, and for successful logins the audit
//! write is awaited before the tokens are handed back, so the trail is never
//! behind an issued credential.

use serde::Serialize;
use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;

use crate::audit::{AuditAction, AuditLog};
use crate::error::{SecurityError, SecurityResult};
use crate::token::{TokenPair, TokenService};
use crate::totp;
use crate::user::{verify_password, Role, User, UserDirectory};

/// Response-safe view of a user. Excludes the password hash, TOTP secret,
/// and stored refresh token.
#[derive(Debug, Clone, Serialize)]
pub struct UserProfile {
    pub id: String,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub two_factor_enabled: bool,
    pub permissions: HashSet<String>,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            username: user.username.clone(),
            email: user.email.clone(),
            role: user.role,
            two_factor_enabled: user.two_factor_enabled,
            permissions: user.permissions.clone(),
        }
    }
}

/// Outcome of a login or 2FA verification. `TwoFactorRequired` is a flow
/// state, not a failure: the caller should re-prompt for a code.
#[derive(Debug)]
pub enum AuthOutcome {
    Success {
        tokens: TokenPair,
        user: UserProfile,
    },
    TwoFactorRequired {
        user_id: String,
    },
}

/// Entry point for identity establishment.
pub struct AuthenticationService {
    users: Arc<dyn UserDirectory>,
    tokens: Arc<TokenService>,
    audit: Arc<AuditLog>,
}

impl AuthenticationService {
    pub fn new(
        users: Arc<dyn UserDirectory>,
        tokens: Arc<TokenService>,
        audit: Arc<AuditLog>,
    ) -> Self {
        Self {
            users,
            tokens,
            audit,
        }
    }

    /// Authenticate with username and password, handling the 2FA challenge.
    ///
    /// Unknown user and wrong password both return `InvalidCredentials`; the
    /// audit trail records the real reason, the response never does.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        two_factor_code: Option<&str>,
        ip: Option<IpAddr>,
    ) -> SecurityResult<AuthOutcome> {
        let user = match self.users.find_by_username(username).await? {
            Some(user) => user,
            None => {
                self.audit
                    .append(
                        None,
                        AuditAction::LoginFail,
                        serde_json::json!({ "username": username, "reason": "user not found" }),
                        ip,
                    )
                    .await;
                return Err(SecurityError::InvalidCredentials);
            }
        };

        if !verify_password(password, &user.password_hash) {
            self.audit
                .append(
                    Some(&user.id),
                    AuditAction::LoginFail,
                    serde_json::json!({ "username": username, "reason": "invalid password" }),
                    ip,
                )
                .await;
            return Err(SecurityError::InvalidCredentials);
        }

        if user.two_factor_enabled {
            let code = match two_factor_code {
                Some(code) => code,
                None => {
                    // Password was right but the second factor is pending;
                    // no tokens are issued for this outcome.
                    self.audit
                        .append(
                            Some(&user.id),
                            AuditAction::LoginTwoFactorRequired,
                            serde_json::json!({ "username": username }),
                            ip,
                        )
                        .await;
                    return Ok(AuthOutcome::TwoFactorRequired {
                        user_id: user.id.clone(),
                    });
                }
            };

            if !self.check_totp(&user, code) {
                self.audit
                    .append(
                        Some(&user.id),
                        AuditAction::LoginFail,
                        serde_json::json!({ "username": username, "reason": "invalid 2FA code" }),
                        ip,
                    )
                    .await;
                return Err(SecurityError::InvalidTwoFactorCode);
            }
        }

        self.issue_session(&user, AuditAction::LoginSuccess, ip).await
    }

    /// Complete a login that returned [`AuthOutcome::TwoFactorRequired`].
    pub async fn verify_two_factor(
        &self,
        user_id: &str,
        code: &str,
        ip: Option<IpAddr>,
    ) -> SecurityResult<AuthOutcome> {
        let user = match self.users.find_by_id(user_id).await? {
            Some(user) if user.two_factor_enabled && user.two_factor_secret.is_some() => user,
            _ => {
                self.audit
                    .append(
                        Some(user_id),
                        AuditAction::TwoFactorVerifyFail,
                        serde_json::json!({ "reason": "user not found or 2FA not enabled" }),
                        ip,
                    )
                    .await;
                return Err(SecurityError::InvalidTwoFactorCode);
            }
        };

        if !self.check_totp(&user, code) {
            self.audit
                .append(
                    Some(&user.id),
                    AuditAction::TwoFactorVerifyFail,
                    serde_json::json!({ "reason": "invalid 2FA code" }),
                    ip,
                )
                .await;
            return Err(SecurityError::InvalidTwoFactorCode);
        }

        self.issue_session(&user, AuditAction::TwoFactorVerifySuccess, ip)
            .await
    }

    /// Exchange a valid refresh token for a new access token.
    ///
    /// The presented token must match the user's stored value byte for byte;
    /// a superseded token (rotated out by a newer login) is rejected and
    /// audited even though its signature still verifies.
    pub async fn refresh(
        &self,
        refresh_token: &str,
        ip: Option<IpAddr>,
    ) -> SecurityResult<String> {
        let claims = match self.tokens.verify_refresh(refresh_token) {
            Ok(claims) => claims,
            Err(e) => {
                self.audit
                    .append(
                        None,
                        AuditAction::RefreshTokenFail,
                        serde_json::json!({ "reason": "invalid or expired token" }),
                        ip,
                    )
                    .await;
                return Err(e);
            }
        };

        let user = self.users.find_by_refresh_token(refresh_token).await?;
        let user = match user {
            Some(user) if user.id == claims.sub => user,
            _ => {
                self.audit
                    .append(
                        Some(&claims.sub),
                        AuditAction::RefreshTokenFail,
                        serde_json::json!({ "reason": "token not associated with user" }),
                        ip,
                    )
                    .await;
                return Err(SecurityError::TokenInvalid);
            }
        };

        let access_token = self
            .tokens
            .issue_access(&user.id, &user.username, user.role)?;

        self.audit
            .append(Some(&user.id), AuditAction::RefreshTokenSuccess, serde_json::Value::Null, ip)
            .await;

        Ok(access_token)
    }

    /// Clear the stored refresh token. Outstanding access tokens remain
    /// valid until natural expiry; the short access TTL bounds the exposure.
    pub async fn logout(&self, user_id: &str, ip: Option<IpAddr>) -> SecurityResult<()> {
        self.users.update_refresh_token(user_id, None).await?;
        self.audit
            .append(Some(user_id), AuditAction::Logout, serde_json::Value::Null, ip)
            .await;
        Ok(())
    }

    fn check_totp(&self, user: &User, code: &str) -> bool {
        match user.two_factor_secret.as_deref() {
            Some(secret) => totp::verify_code(secret, code),
            None => {
                tracing::error!(user_id = %user.id, "2FA enabled but no secret stored");
                false
            }
        }
    }

    /// Issue a fresh token pair, persist the refresh token (overwriting any
    /// prior one), and audit — in that order, before returning the tokens.
    async fn issue_session(
        &self,
        user: &User,
        action: AuditAction,
        ip: Option<IpAddr>,
    ) -> SecurityResult<AuthOutcome> {
        let tokens = self
            .tokens
            .issue_pair(&user.id, &user.username, user.role)?;

        self.users
            .update_refresh_token(&user.id, Some(&tokens.refresh_token))
            .await?;

        self.audit
            .append(
                Some(&user.id),
                action,
                serde_json::json!({ "username": user.username }),
                ip,
            )
            .await;

        Ok(AuthOutcome::Success {
            tokens,
            user: UserProfile::from(user),
        })
    }
}
