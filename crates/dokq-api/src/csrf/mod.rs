// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! CSRF protection: double-submit token protocol.
//!
//! Tokens are delivered both as a non-HTTP-only cookie and in the response
//! body; a mutating request must present the token in the `x-csrf-token`
//! header (or `_csrf` body field) and it must match the cookie copy and the
//! server-side record for the caller's session.
//!
//! This module provides:
//! - [`CsrfTokenStore`]: the per-session token store with expiry and eviction
//! - [`CsrfProtection`]: issue / validate / rotate operations
//! - [`CsrfLayer`]: the request-gating middleware for mutating routes

mod middleware;
mod store;

pub use middleware::{derive_session_id, CsrfLayer, CsrfMiddleware, CsrfValidated, TransportSession};
pub use store::{CsrfTokenStore, StoreStats, SweeperHandle};

use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use crate::error::{ApiError, ApiResult};

/// Request header carrying the CSRF token.
pub const CSRF_HEADER_NAME: &str = "x-csrf-token";

/// Cookie carrying the double-submit copy of the token.
pub const CSRF_COOKIE_NAME: &str = "__csrf_token";

/// Body field accepted as an alternative to the header.
pub const CSRF_BODY_FIELD: &str = "_csrf";

// =============================================================================
// CsrfConfig
// =============================================================================

/// CSRF protocol configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CsrfConfig {
    /// Random token length in bytes (before encoding).
    pub token_length: usize,
    /// Token lifetime.
    #[serde(with = "duration_serde")]
    pub token_ttl: Duration,
    /// Age after which a token is due for rotation.
    #[serde(with = "duration_serde")]
    pub rotation_interval: Duration,
    /// Maximum outstanding tokens per session.
    pub max_tokens_per_session: usize,
    /// Interval of the background expiry sweep.
    #[serde(with = "duration_serde")]
    pub sweep_interval: Duration,
}

impl Default for CsrfConfig {
    fn default() -> Self {
        Self {
            token_length: 32,
            token_ttl: Duration::from_secs(30 * 60),
            rotation_interval: Duration::from_secs(15 * 60),
            max_tokens_per_session: 3,
            sweep_interval: Duration::from_secs(5 * 60),
        }
    }
}

// =============================================================================
// CsrfProtection
// =============================================================================

/// The CSRF protocol engine.
///
/// Owns the token store and implements issue, validate, and rotate. Built
/// explicitly at startup and injected into the middleware and handlers.
pub struct CsrfProtection {
    config: CsrfConfig,
    store: Arc<CsrfTokenStore>,
}

/// A freshly issued token.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// The opaque token value (URL-safe encoding of random bytes).
    pub token: String,
    /// When the token expires.
    pub expires_at: DateTime<Utc>,
    /// Cookie max-age for the double-submit copy.
    pub max_age: Duration,
}

/// Outcome of a refresh request.
#[derive(Debug, Clone)]
pub struct RefreshOutcome {
    /// Whether a new token was issued.
    pub rotated: bool,
    /// The new token, present only when rotation occurred.
    pub token: Option<IssuedToken>,
}

impl CsrfProtection {
    /// Creates the engine with a fresh store.
    pub fn new(config: CsrfConfig) -> Self {
        let store = Arc::new(CsrfTokenStore::new(config.clone()));
        Self { config, store }
    }

    /// Returns the protocol configuration.
    pub fn config(&self) -> &CsrfConfig {
        &self.config
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &Arc<CsrfTokenStore> {
        &self.store
    }

    /// Starts the background expiry sweep, returning its lifecycle handle.
    pub fn start_sweeper(&self) -> SweeperHandle {
        CsrfTokenStore::start_sweeper(&self.store)
    }

    /// Issues a new token for the given session.
    pub fn issue(&self, session_id: &str) -> IssuedToken {
        let token = self.generate_token();
        self.store.store_token(session_id, &token);

        IssuedToken {
            token,
            expires_at: Utc::now()
                + chrono::Duration::from_std(self.config.token_ttl)
                    .unwrap_or_else(|_| chrono::Duration::minutes(30)),
            max_age: self.config.token_ttl,
        }
    }

    /// Validates a candidate token for a session.
    ///
    /// `candidate` is the header/body-supplied value; `cookie` is the
    /// double-submit cookie copy, if present. Returns the accepted token
    /// value on success.
    pub fn validate(
        &self,
        candidate: Option<&str>,
        cookie: Option<&str>,
        session_id: &str,
    ) -> ApiResult<String> {
        let Some(token) = candidate else {
            return Err(ApiError::CsrfTokenMissing);
        };

        if let Some(cookie_token) = cookie {
            if !constant_time_eq(token, cookie_token) {
                return Err(ApiError::CsrfTokenMismatch);
            }
        }

        if !self.store.validate_token(token, session_id) {
            return Err(ApiError::CsrfTokenInvalid);
        }

        Ok(token.to_string())
    }

    /// Returns `true` if the given token (or its absence) warrants rotation.
    pub fn should_rotate(&self, token: Option<&str>) -> bool {
        match token {
            Some(token) => self.store.is_rotation_due(token),
            None => true,
        }
    }

    /// Rotates the session's token if due, otherwise confirms the current one.
    pub fn refresh(&self, session_id: &str, current: Option<&str>) -> RefreshOutcome {
        if !self.should_rotate(current) {
            return RefreshOutcome {
                rotated: false,
                token: None,
            };
        }

        if let Some(old) = current {
            self.store.remove_token(old);
        }

        RefreshOutcome {
            rotated: true,
            token: Some(self.issue(session_id)),
        }
    }

    /// Removes all tokens for a session (logout).
    pub fn cleanup_session(&self, session_id: &str) {
        let removed = self.store.remove_session_tokens(session_id);
        if removed > 0 {
            tracing::debug!(session_id, removed, "Cleared session CSRF tokens");
        }
    }

    /// Returns store statistics.
    pub fn stats(&self) -> StoreStats {
        self.store.stats()
    }

    fn generate_token(&self) -> String {
        let mut bytes = vec![0u8; self.config.token_length];
        rand::thread_rng().fill_bytes(&mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }
}

/// Constant-time string equality for token comparison.
fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

// =============================================================================
// Duration Serde
// =============================================================================

mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> CsrfProtection {
        CsrfProtection::new(CsrfConfig::default())
    }

    #[test]
    fn test_issued_tokens_are_unique_and_urlsafe() {
        let csrf = engine();
        let t1 = csrf.issue("s1");
        let t2 = csrf.issue("s1");

        assert_ne!(t1.token, t2.token);
        // 32 random bytes in unpadded base64url
        assert_eq!(t1.token.len(), 43);
        assert!(t1
            .token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_validate_accepts_issued_token() {
        let csrf = engine();
        let issued = csrf.issue("u1");

        let accepted = csrf
            .validate(Some(&issued.token), Some(&issued.token), "u1")
            .unwrap();
        assert_eq!(accepted, issued.token);
    }

    #[test]
    fn test_validate_missing_token() {
        let csrf = engine();
        let err = csrf.validate(None, None, "u1").unwrap_err();
        assert_eq!(err.error_code(), "CSRF_TOKEN_MISSING");
    }

    #[test]
    fn test_validate_cookie_mismatch() {
        let csrf = engine();
        let issued = csrf.issue("u1");

        let err = csrf
            .validate(Some(&issued.token), Some("a-different-cookie-value"), "u1")
            .unwrap_err();
        assert_eq!(err.error_code(), "CSRF_TOKEN_MISMATCH");
    }

    #[test]
    fn test_validate_foreign_session() {
        let csrf = engine();
        let issued = csrf.issue("u1");

        let err = csrf
            .validate(Some(&issued.token), Some(&issued.token), "u2")
            .unwrap_err();
        assert_eq!(err.error_code(), "CSRF_TOKEN_INVALID");
    }

    #[test]
    fn test_validate_without_cookie_still_checks_store() {
        // Non-browser callers may not echo the cookie; the server-side record
        // is still authoritative.
        let csrf = engine();
        let issued = csrf.issue("u1");

        assert!(csrf.validate(Some(&issued.token), None, "u1").is_ok());
        assert!(csrf.validate(Some("forged"), None, "u1").is_err());
    }

    #[test]
    fn test_refresh_keeps_fresh_token() {
        let csrf = engine();
        let issued = csrf.issue("u1");

        let outcome = csrf.refresh("u1", Some(&issued.token));
        assert!(!outcome.rotated);
        assert!(outcome.token.is_none());
        // Current token remains valid
        assert!(csrf.validate(Some(&issued.token), None, "u1").is_ok());
    }

    #[test]
    fn test_refresh_rotates_aged_token() {
        let csrf = engine();
        let issued = csrf.issue("u1");
        csrf.store()
            .backdate(&issued.token, Duration::from_secs(16 * 60));

        let outcome = csrf.refresh("u1", Some(&issued.token));
        assert!(outcome.rotated);
        let new = outcome.token.unwrap();
        assert_ne!(new.token, issued.token);

        // Old token is gone, new one validates
        assert!(csrf.validate(Some(&issued.token), None, "u1").is_err());
        assert!(csrf.validate(Some(&new.token), None, "u1").is_ok());
    }

    #[test]
    fn test_refresh_without_current_token_rotates() {
        let csrf = engine();
        let outcome = csrf.refresh("u1", None);
        assert!(outcome.rotated);
        assert!(outcome.token.is_some());
    }

    #[test]
    fn test_cleanup_session() {
        let csrf = engine();
        let issued = csrf.issue("u1");
        csrf.cleanup_session("u1");

        assert!(csrf.validate(Some(&issued.token), None, "u1").is_err());
        assert_eq!(csrf.stats().total_tokens, 0);
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq("abc", "abc"));
        assert!(!constant_time_eq("abc", "abd"));
        assert!(!constant_time_eq("abc", "abcd"));
    }
}
