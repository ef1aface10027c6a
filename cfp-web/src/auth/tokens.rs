//! One-time account tokens for activation and password reset
//!
//! A token is `<timestamp base36>-<hex HMAC-SHA256>`. The MAC covers the
//! user's password hash, last login, active flag and email confirmation, so
//! any of those changing invalidates outstanding tokens.

use crate::db::users::User;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, TimeZone, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

/// Token issuer for one purpose
#[derive(Debug, Clone, Copy)]
pub struct TokenGenerator {
    salt: &'static str,
}

pub const ACCOUNT_ACTIVATION: TokenGenerator = TokenGenerator {
    salt: "cfp.accounts.AccountActivationTokenGenerator",
};

pub const PASSWORD_RESET: TokenGenerator = TokenGenerator {
    salt: "cfp.accounts.PasswordResetTokenGenerator",
};

/// Seconds are counted from 2001-01-01 to keep timestamps short
fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2001, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or_default()
}

fn seconds_since_epoch(at: DateTime<Utc>) -> i64 {
    (at - epoch()).num_seconds()
}

pub(crate) fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

pub(crate) fn from_base36(value: &str) -> Option<u64> {
    if value.is_empty() || value.len() > 13 {
        return None;
    }
    u64::from_str_radix(value, 36).ok()
}

impl TokenGenerator {
    pub fn make_token(
        &self,
        secret: &str,
        user: &User,
        email_confirmed: bool,
        now: DateTime<Utc>,
    ) -> Option<String> {
        let timestamp = u64::try_from(seconds_since_epoch(now)).ok()?;
        self.token_with_timestamp(secret, user, email_confirmed, timestamp)
    }

    /// Verify a token and reject it once older than `timeout_days`
    pub fn check_token(
        &self,
        secret: &str,
        user: &User,
        email_confirmed: bool,
        token: &str,
        now: DateTime<Utc>,
        timeout_days: i64,
    ) -> bool {
        let Some((ts_b36, mac_hex)) = token.split_once('-') else {
            return false;
        };
        let Some(timestamp) = from_base36(ts_b36) else {
            return false;
        };
        let Ok(expected) = hex::decode(mac_hex) else {
            return false;
        };

        let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
            return false;
        };
        mac.update(self.hash_value(user, email_confirmed, timestamp).as_bytes());
        if mac.verify_slice(&expected).is_err() {
            return false;
        }

        let age = seconds_since_epoch(now) - timestamp as i64;
        (0..=timeout_days * 24 * 60 * 60).contains(&age)
    }

    fn token_with_timestamp(
        &self,
        secret: &str,
        user: &User,
        email_confirmed: bool,
        timestamp: u64,
    ) -> Option<String> {
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).ok()?;
        mac.update(self.hash_value(user, email_confirmed, timestamp).as_bytes());
        Some(format!(
            "{}-{}",
            to_base36(timestamp),
            hex::encode(mac.finalize().into_bytes())
        ))
    }

    fn hash_value(&self, user: &User, email_confirmed: bool, timestamp: u64) -> String {
        let last_login = user
            .last_login
            .map(|t| t.timestamp().to_string())
            .unwrap_or_default();
        format!(
            "{}|{}|{}|{}|{}|{}|{}",
            self.salt, user.guid, user.password_hash, last_login, timestamp, user.is_active, email_confirmed
        )
    }
}

/// URL-safe encoding of a user id
pub fn encode_uid(guid: Uuid) -> String {
    URL_SAFE_NO_PAD.encode(guid.to_string())
}

pub fn decode_uid(uid: &str) -> Option<Uuid> {
    let bytes = URL_SAFE_NO_PAD.decode(uid.trim_end_matches('=')).ok()?;
    let text = String::from_utf8(bytes).ok()?;
    Uuid::parse_str(&text).ok()
}
