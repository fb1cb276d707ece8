// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! JWT claims structure.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Role;

/// JWT claims for authentication.
///
/// These claims are embedded in bearer tokens and extracted during
/// authentication. The same structure is used for both identity-platform
/// tokens and locally signed tokens; unknown claims are preserved in
/// `extra`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    // =========================================================================
    // Standard JWT Claims (RFC 7519)
    // =========================================================================
    /// Subject - the user ID.
    pub sub: String,

    /// Expiration time (Unix timestamp).
    pub exp: i64,

    /// Issued at time (Unix timestamp).
    pub iat: i64,

    /// Issuer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    /// Audience.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,

    /// JWT ID.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,

    // =========================================================================
    // Custom Claims
    // =========================================================================
    /// The user's role.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,

    /// User's email.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Session ID for CSRF session binding.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    /// Any remaining claims, preserved verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Claims {
    /// Creates new claims for a user.
    pub fn new(user_id: impl Into<String>, role: Option<Role>, expires_in_secs: i64) -> Self {
        let now = Utc::now().timestamp();

        Self {
            sub: user_id.into(),
            exp: now + expires_in_secs,
            iat: now,
            iss: None,
            aud: None,
            jti: Some(Uuid::now_v7().to_string()),
            role,
            email: None,
            session_id: None,
            extra: serde_json::Map::new(),
        }
    }

    /// Returns the user ID.
    pub fn user_id(&self) -> &str {
        &self.sub
    }

    /// Returns the role from the custom claim, falling back to the default.
    pub fn role_or_default(&self) -> Role {
        self.role.unwrap_or_else(Role::default_role)
    }

    /// Returns `true` if the token has expired.
    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() > self.exp
    }

    /// Sets the issuer.
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.iss = Some(issuer.into());
        self
    }

    /// Sets the audience.
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.aud = Some(audience.into());
        self
    }

    /// Sets the email.
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Sets the session ID.
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claims_creation() {
        let claims = Claims::new("user123", Some(Role::Doctor), 3600);

        assert_eq!(claims.user_id(), "user123");
        assert_eq!(claims.role_or_default(), Role::Doctor);
        assert!(!claims.is_expired());
        assert!(claims.jti.is_some());
    }

    #[test]
    fn test_role_defaults_to_patient() {
        let claims = Claims::new("user123", None, 3600);
        assert_eq!(claims.role_or_default(), Role::Patient);
    }

    #[test]
    fn test_expired_claims() {
        let claims = Claims::new("user", Some(Role::Admin), -100);
        assert!(claims.is_expired());
    }

    #[test]
    fn test_extra_claims_preserved() {
        let json = serde_json::json!({
            "sub": "u1",
            "exp": 4_102_444_800i64,
            "iat": 0,
            "role": "nurse",
            "facility": "manila-general"
        });

        let claims: Claims = serde_json::from_value(json).unwrap();
        assert_eq!(claims.role_or_default(), Role::Nurse);
        assert_eq!(
            claims.extra.get("facility").and_then(|v| v.as_str()),
            Some("manila-general")
        );
    }
}
