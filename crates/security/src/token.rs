//! Access and refresh token issuance and verification.
//!
//! Access tokens are stateless: they are never checked against storage and
//! remain valid until expiry. Refresh tokens are stateful: the presented
//! value must match the single token stored on the user record.

use anyhow::Result;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{SecurityError, SecurityResult};
use crate::user::Role;

/// Claims embedded in a short-lived access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject (user ID).
    pub sub: String,
    /// Username, for display and audit context.
    pub username: String,
    /// User's role.
    pub role: Role,
    /// Issued at timestamp.
    pub iat: i64,
    /// Expiration timestamp.
    pub exp: i64,
    /// Unique identifier for this token.
    pub jti: String,
}

/// Claims embedded in a longer-lived refresh token. Deliberately minimal:
/// role and username are re-read from the directory on refresh. The `jti`
/// makes every issued token unique even within one `iat` second, so rotating
/// in a new token always produces a value distinct from the one it replaces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    /// Subject (user ID).
    pub sub: String,
    /// Issued at timestamp.
    pub iat: i64,
    /// Expiration timestamp.
    pub exp: i64,
    /// Unique identifier for this token.
    pub jti: String,
}

/// An access/refresh token pair issued at login or 2FA verification.
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Configuration for token signing.
///
/// The two secrets must differ so a refresh token can never be replayed as
/// an access token.
#[derive(Clone)]
pub struct TokenConfig {
    /// Secret for signing access tokens.
    pub access_secret: String,
    /// Secret for signing refresh tokens.
    pub refresh_secret: String,
    /// Access token lifetime in seconds.
    pub access_ttl_secs: i64,
    /// Refresh token lifetime in seconds.
    pub refresh_ttl_secs: i64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            access_secret: "change-me-access-secret".to_string(),
            refresh_secret: "change-me-refresh-secret".to_string(),
            access_ttl_secs: 15 * 60,
            refresh_ttl_secs: 7 * 24 * 60 * 60,
        }
    }
}

/// Issues and verifies both token kinds.
pub struct TokenService {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    validation: Validation,
    config: TokenConfig,
}

impl TokenService {
    pub fn new(config: TokenConfig) -> Self {
        let mut validation = Validation::default();
        // No leeway: an expired token is expired, full stop. The default 60s
        // grace window would blur the TokenExpired/TokenInvalid distinction.
        validation.leeway = 0;

        Self {
            access_encoding: EncodingKey::from_secret(config.access_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(config.access_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(config.refresh_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(config.refresh_secret.as_bytes()),
            validation,
            config,
        }
    }

    /// Issue a fresh access/refresh pair for a user.
    pub fn issue_pair(&self, user_id: &str, username: &str, role: Role) -> Result<TokenPair> {
        Ok(TokenPair {
            access_token: self.issue_access(user_id, username, role)?,
            refresh_token: self.issue_refresh(user_id)?,
        })
    }

    /// Issue a new access token only (the refresh path).
    pub fn issue_access(&self, user_id: &str, username: &str, role: Role) -> Result<String> {
        let now = Utc::now();
        let claims = AccessClaims {
            sub: user_id.to_string(),
            username: username.to_string(),
            role,
            iat: now.timestamp(),
            exp: (now + Duration::seconds(self.config.access_ttl_secs)).timestamp(),
            jti: Uuid::new_v4().to_string(),
        };
        let token = encode(&Header::default(), &claims, &self.access_encoding)?;
        Ok(token)
    }

    fn issue_refresh(&self, user_id: &str) -> Result<String> {
        let now = Utc::now();
        let claims = RefreshClaims {
            sub: user_id.to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::seconds(self.config.refresh_ttl_secs)).timestamp(),
            jti: Uuid::new_v4().to_string(),
        };
        let token = encode(&Header::default(), &claims, &self.refresh_encoding)?;
        Ok(token)
    }

    /// Verify an access token, distinguishing expiry from any other failure.
    pub fn verify_access(&self, token: &str) -> SecurityResult<AccessClaims> {
        decode::<AccessClaims>(token, &self.access_decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(map_jwt_error)
    }

    /// Verify a refresh token signature and expiry. The stateful check
    /// against the stored value belongs to the authentication service.
    pub fn verify_refresh(&self, token: &str) -> SecurityResult<RefreshClaims> {
        decode::<RefreshClaims>(token, &self.refresh_decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(map_jwt_error)
    }
}

fn map_jwt_error(err: jsonwebtoken::errors::Error) -> SecurityError {
    match err.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => SecurityError::TokenExpired,
        _ => SecurityError::TokenInvalid,
    }
}
