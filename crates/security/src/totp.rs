//! TOTP second-factor verification.
//!
//! Standard RFC 6238 parameters: SHA-1, 6 digits, 30-second step, and a
//! ±1-step drift window, so a code valid at T is accepted at T−30s and T+30s.

use std::time::{SystemTime, UNIX_EPOCH};
use totp_rs::{Algorithm, Secret, TOTP};

use crate::error::{SecurityError, SecurityResult};

const DIGITS: usize = 6;
const STEP_SECS: u64 = 30;
const SKEW_STEPS: u8 = 1;

fn build(secret_base32: &str) -> SecurityResult<TOTP> {
    let secret = Secret::Encoded(secret_base32.to_string())
        .to_bytes()
        .map_err(|e| {
            tracing::warn!(error = ?e, "TOTP secret is not valid base32");
            SecurityError::InvalidTwoFactorCode
        })?;

    TOTP::new(Algorithm::SHA1, DIGITS, SKEW_STEPS, STEP_SECS, secret).map_err(|e| {
        tracing::warn!(error = ?e, "TOTP secret rejected");
        SecurityError::InvalidTwoFactorCode
    })
}

/// Verify a 6-digit code against a base32 secret at the current time.
///
/// A malformed secret verifies as false: from the caller's perspective the
/// code simply did not match, which is the safe failure mode.
pub fn verify_code(secret_base32: &str, code: &str) -> bool {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    verify_code_at(secret_base32, code, now)
}

/// Verify a code at an explicit unix timestamp. Used by [`verify_code`] and
/// directly by tests to pin the clock.
pub fn verify_code_at(secret_base32: &str, code: &str, unix_time: u64) -> bool {
    match build(secret_base32) {
        Ok(totp) => totp.check(code, unix_time),
        Err(_) => false,
    }
}

/// Generate the code valid at an explicit unix timestamp. Test helper; the
/// server never generates codes, only verifies them.
pub fn code_at(secret_base32: &str, unix_time: u64) -> SecurityResult<String> {
    Ok(build(secret_base32)?.generate(unix_time))
}

#[cfg(test)]
mod tests {
    use super::*;

    // 20-byte secret, base32-encoded (standard authenticator-app size).
    const SECRET: &str = "JBSWY3DPEHPK3PXPJBSWY3DPEHPK3PXP";

    #[test]
    fn test_code_accepted_within_one_step() {
        let t = 1_700_000_000u64;
        let code = code_at(SECRET, t).unwrap();

        assert!(verify_code_at(SECRET, &code, t));
        assert!(verify_code_at(SECRET, &code, t - 30));
        assert!(verify_code_at(SECRET, &code, t + 30));
    }

    #[test]
    fn test_code_rejected_outside_window() {
        let t = 1_700_000_000u64;
        let code = code_at(SECRET, t).unwrap();

        assert!(!verify_code_at(SECRET, &code, t - 90));
        assert!(!verify_code_at(SECRET, &code, t + 90));
    }

    #[test]
    fn test_wrong_code_rejected() {
        let t = 1_700_000_000u64;
        let code = code_at(SECRET, t).unwrap();
        let wrong = if code == "000000" { "000001" } else { "000000" };
        assert!(!verify_code_at(SECRET, wrong, t));
    }

    #[test]
    fn test_malformed_secret_verifies_false() {
        assert!(!verify_code_at("not base32 !!!", "123456", 1_700_000_000));
    }
}
