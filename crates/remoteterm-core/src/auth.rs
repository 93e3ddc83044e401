//! Admission and authentication state
//!
//! Two disjoint mechanisms: a one-time approval code that binds the first
//! Telegram user to the whitelist, and server-side session tokens behind an
//! HttpOnly cookie for the web UI.

use std::collections::HashMap;
use std::fmt::Write as FmtWrite;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use subtle::ConstantTimeEq;

/// Approval code lifetime.
const APPROVAL_TTL_MINUTES: i64 = 15;
/// Wrong-code attempts allowed before setup aborts.
const APPROVAL_MAX_ATTEMPTS: u32 = 5;
/// Web session token lifetime.
const SESSION_TOKEN_TTL_HOURS: i64 = 24;

/// Constant-time string equality. Length mismatch is decided without
/// inspecting content.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Generate an 8-digit approval code from a cryptographically secure source.
pub fn generate_approval_code() -> Result<String> {
    let mut bytes = [0u8; 8];
    getrandom::getrandom(&mut bytes).context("crypto random source failed")?;
    let n = u64::from_le_bytes(bytes) % 100_000_000;
    Ok(format!("{:08}", n))
}

/// Generate a 32-byte hex-encoded session token.
pub fn generate_session_token() -> Result<String> {
    let mut bytes = [0u8; 32];
    getrandom::getrandom(&mut bytes).context("crypto random source failed")?;
    let mut token = String::with_capacity(64);
    for b in bytes {
        let _ = write!(token, "{:02x}", b);
    }
    Ok(token)
}

pub fn hash_password(password: &str) -> Result<String> {
    bcrypt::hash(password, bcrypt::DEFAULT_COST).context("bcrypt hash failed")
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}

/// Outcome of checking one incoming message against the approval code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalOutcome {
    Approved,
    /// Wrong code; attempts left after this failure.
    Invalid { remaining: u32 },
    /// Attempt budget exhausted; setup must restart.
    Exhausted,
    /// Code expired before a correct entry arrived.
    Expired,
}

/// First-run approval handshake state.
#[derive(Debug)]
pub struct ApprovalState {
    code: String,
    expires_at: DateTime<Utc>,
    attempts_left: u32,
}

impl ApprovalState {
    pub fn new(code: String) -> Self {
        Self {
            code,
            expires_at: Utc::now() + Duration::minutes(APPROVAL_TTL_MINUTES),
            attempts_left: APPROVAL_MAX_ATTEMPTS,
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn check(&mut self, entry: &str) -> ApprovalOutcome {
        self.check_at(entry, Utc::now())
    }

    fn check_at(&mut self, entry: &str, now: DateTime<Utc>) -> ApprovalOutcome {
        if now > self.expires_at {
            return ApprovalOutcome::Expired;
        }
        if self.attempts_left == 0 {
            return ApprovalOutcome::Exhausted;
        }
        if constant_time_eq(entry, &self.code) {
            return ApprovalOutcome::Approved;
        }
        self.attempts_left -= 1;
        if self.attempts_left == 0 {
            ApprovalOutcome::Exhausted
        } else {
            ApprovalOutcome::Invalid {
                remaining: self.attempts_left,
            }
        }
    }
}

/// Server-authoritative web session store: token -> expiry. Expired entries
/// are evicted lazily on lookup.
#[derive(Debug, Default)]
pub struct SessionTokens {
    tokens: HashMap<String, DateTime<Utc>>,
}

impl SessionTokens {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a token valid for 24 hours.
    pub fn create(&mut self) -> Result<String> {
        let token = generate_session_token()?;
        self.tokens.insert(
            token.clone(),
            Utc::now() + Duration::hours(SESSION_TOKEN_TTL_HOURS),
        );
        Ok(token)
    }

    pub fn is_valid(&mut self, token: &str) -> bool {
        match self.tokens.get(token) {
            Some(expiry) if Utc::now() <= *expiry => true,
            Some(_) => {
                self.tokens.remove(token);
                false
            }
            None => false,
        }
    }

    pub fn remove(&mut self, token: &str) {
        self.tokens.remove(token);
    }

    #[cfg(test)]
    fn insert_with_expiry(&mut self, token: String, expiry: DateTime<Utc>) {
        self.tokens.insert(token, expiry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approval_code_is_eight_digits() {
        let code = generate_approval_code().unwrap();
        assert_eq!(code.len(), 8);
        assert!(code.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn session_token_is_64_hex_chars() {
        let token = generate_session_token().unwrap();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn tokens_are_unique() {
        let a = generate_session_token().unwrap();
        let b = generate_session_token().unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn constant_time_eq_behaves_like_equality() {
        assert!(constant_time_eq("12345678", "12345678"));
        assert!(!constant_time_eq("12345678", "12345679"));
        assert!(!constant_time_eq("1234", "12345678"));
        assert!(constant_time_eq("", ""));
    }

    #[test]
    fn correct_code_approves_within_window() {
        let mut state = ApprovalState::new("00112233".to_string());
        assert_eq!(state.check("00112233"), ApprovalOutcome::Approved);
    }

    #[test]
    fn wrong_code_decrements_attempts_then_exhausts() {
        let mut state = ApprovalState::new("00112233".to_string());
        assert_eq!(
            state.check("99999999"),
            ApprovalOutcome::Invalid { remaining: 4 }
        );
        assert_eq!(
            state.check("99999999"),
            ApprovalOutcome::Invalid { remaining: 3 }
        );
        assert_eq!(
            state.check("99999999"),
            ApprovalOutcome::Invalid { remaining: 2 }
        );
        assert_eq!(
            state.check("99999999"),
            ApprovalOutcome::Invalid { remaining: 1 }
        );
        assert_eq!(state.check("99999999"), ApprovalOutcome::Exhausted);
        // Even the right code is rejected once exhausted
        assert_eq!(state.check("00112233"), ApprovalOutcome::Exhausted);
    }

    #[test]
    fn code_is_valid_until_the_window_closes() {
        let mut state = ApprovalState::new("00112233".to_string());
        let near_expiry =
            Utc::now() + Duration::minutes(APPROVAL_TTL_MINUTES) - Duration::minutes(1);
        assert_eq!(
            state.check_at("00112233", near_expiry),
            ApprovalOutcome::Approved
        );
    }

    #[test]
    fn expired_code_is_rejected() {
        let mut state = ApprovalState::new("00112233".to_string());
        let later = Utc::now() + Duration::minutes(APPROVAL_TTL_MINUTES + 1);
        assert_eq!(state.check_at("00112233", later), ApprovalOutcome::Expired);
    }

    #[test]
    fn web_session_lifecycle() {
        let mut store = SessionTokens::new();
        let token = store.create().unwrap();
        assert!(store.is_valid(&token));

        store.remove(&token);
        assert!(!store.is_valid(&token));
        assert!(!store.is_valid("nonexistent"));
    }

    #[test]
    fn expired_web_session_is_evicted_on_lookup() {
        let mut store = SessionTokens::new();
        store.insert_with_expiry("tok".to_string(), Utc::now() - Duration::hours(1));
        assert!(!store.is_valid("tok"));
        // Second lookup misses entirely (lazy eviction happened)
        assert!(!store.is_valid("tok"));
    }

    #[test]
    fn password_hash_round_trip() {
        let hash = hash_password("hunter2").unwrap();
        assert!(hash.starts_with("$2"));
        assert!(verify_password("hunter2", &hash));
        assert!(!verify_password("hunter3", &hash));
        assert!(!verify_password("hunter2", "not-a-hash"));
    }
}
