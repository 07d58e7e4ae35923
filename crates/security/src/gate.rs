//! Request-level authorization: token presence, role, and permission checks.

use std::sync::Arc;

use crate::error::{SecurityError, SecurityResult};
use crate::token::{AccessClaims, TokenService};
use crate::user::{Role, User};

/// Stateless per-request gate. Token verification never touches storage, so
/// this sits on the hot path of every protected endpoint.
pub struct AuthorizationGate {
    tokens: Arc<TokenService>,
}

impl AuthorizationGate {
    pub fn new(tokens: Arc<TokenService>) -> Self {
        Self { tokens }
    }

    /// Establish identity from an optional bearer token.
    ///
    /// A missing token, an expired token, and a forged token are three
    /// distinct errors; callers map them to distinct response codes.
    pub fn authenticate(&self, bearer: Option<&str>) -> SecurityResult<AccessClaims> {
        let token = bearer.ok_or(SecurityError::Unauthenticated)?;
        self.tokens.verify_access(token)
    }

    /// Require that the authenticated role is one of `allowed`.
    pub fn require_role(&self, claims: &AccessClaims, allowed: &[Role]) -> SecurityResult<()> {
        if allowed.contains(&claims.role) {
            Ok(())
        } else {
            let wanted: Vec<&str> = allowed.iter().map(Role::as_str).collect();
            Err(SecurityError::PermissionDenied(format!(
                "requires role {}",
                wanted.join(" or ")
            )))
        }
    }

    /// Require a named permission on the full user record. Admins hold every
    /// permission implicitly.
    pub fn require_permission(&self, user: &User, permission: &str) -> SecurityResult<()> {
        if user.has_permission(permission) {
            Ok(())
        } else {
            Err(SecurityError::PermissionDenied(format!(
                "requires permission {permission}"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenConfig;
    use std::collections::HashSet;

    fn gate_and_tokens() -> (AuthorizationGate, Arc<TokenService>) {
        let tokens = Arc::new(TokenService::new(TokenConfig {
            access_secret: "gate-access".to_string(),
            refresh_secret: "gate-refresh".to_string(),
            access_ttl_secs: 900,
            refresh_ttl_secs: 3600,
        }));
        (AuthorizationGate::new(tokens.clone()), tokens)
    }

    #[test]
    fn test_missing_expired_and_forged_tokens_are_distinct() {
        let (gate, tokens) = gate_and_tokens();

        assert!(matches!(
            gate.authenticate(None),
            Err(SecurityError::Unauthenticated)
        ));
        assert!(matches!(
            gate.authenticate(Some("junk")),
            Err(SecurityError::TokenInvalid)
        ));

        let expired = TokenService::new(TokenConfig {
            access_secret: "gate-access".to_string(),
            refresh_secret: "gate-refresh".to_string(),
            access_ttl_secs: -5,
            refresh_ttl_secs: 3600,
        });
        let pair = expired.issue_pair("u1", "alice", Role::Viewer).unwrap();
        assert!(matches!(
            gate.authenticate(Some(&pair.access_token)),
            Err(SecurityError::TokenExpired)
        ));

        let pair = tokens.issue_pair("u1", "alice", Role::Viewer).unwrap();
        assert!(gate.authenticate(Some(&pair.access_token)).is_ok());
    }

    #[test]
    fn test_role_gate() {
        let (gate, tokens) = gate_and_tokens();
        let pair = tokens.issue_pair("u1", "alice", Role::Trader).unwrap();
        let claims = gate.authenticate(Some(&pair.access_token)).unwrap();

        assert!(gate.require_role(&claims, &[Role::Trader, Role::Admin]).is_ok());
        let err = gate.require_role(&claims, &[Role::Admin]).unwrap_err();
        assert!(matches!(err, SecurityError::PermissionDenied(_)));
        assert!(err.to_string().contains("admin"));
    }

    #[test]
    fn test_permission_gate_with_admin_wildcard() {
        let (gate, _) = gate_and_tokens();
        let mut user = User {
            id: "u1".to_string(),
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            password_hash: String::new(),
            role: Role::Viewer,
            two_factor_enabled: false,
            two_factor_secret: None,
            permissions: HashSet::from(["view_dashboard".to_string()]),
            refresh_token: None,
        };

        assert!(gate.require_permission(&user, "view_dashboard").is_ok());
        assert!(gate.require_permission(&user, "execute_trades").is_err());

        user.role = Role::Admin;
        assert!(gate.require_permission(&user, "execute_trades").is_ok());
    }
}
