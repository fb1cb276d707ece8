// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Local signed-token management.

use std::sync::Arc;

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};

use super::{Claims, Role};
use crate::config::LocalTokenConfig;
use crate::error::{ApiError, ApiResult};

/// A JWT secret equal to this placeholder is treated as unset.
pub const PLACEHOLDER_SECRET: &str = "fallback-secret";

/// Minimum acceptable secret length in characters.
pub const MIN_SECRET_LEN: usize = 32;

/// Validates a shared signing secret.
///
/// A missing secret, the well-known placeholder, or anything shorter than 32
/// characters is a fatal misconfiguration, not a per-request condition.
pub fn validate_secret(secret: Option<&str>) -> ApiResult<&str> {
    match secret {
        Some(s) if s != PLACEHOLDER_SECRET && s.len() >= MIN_SECRET_LEN => Ok(s),
        _ => Err(ApiError::server_config(
            "JWT secret is missing, a known placeholder, or shorter than 32 characters",
        )),
    }
}

// =============================================================================
// JwtManager
// =============================================================================

/// Manager for locally signed token operations.
///
/// Signs and verifies HS256 tokens with the platform's fixed issuer and
/// audience. This backs the local signed-token verification strategy and is
/// also what tests use to mint credentials.
#[derive(Clone)]
pub struct JwtManager {
    config: Arc<LocalTokenConfig>,
    encoding_key: Arc<EncodingKey>,
    decoding_key: Arc<DecodingKey>,
    validation: Arc<Validation>,
}

impl JwtManager {
    /// Creates a new manager with the given configuration.
    pub fn new(config: LocalTokenConfig) -> ApiResult<Self> {
        validate_secret(Some(&config.secret))?;

        let encoding_key = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&config.issuer]);
        validation.set_audience(&[&config.audience]);
        validation.leeway = 60;

        Ok(Self {
            config: Arc::new(config),
            encoding_key: Arc::new(encoding_key),
            decoding_key: Arc::new(decoding_key),
            validation: Arc::new(validation),
        })
    }

    /// Signs the given claims.
    pub fn create_token(&self, claims: &Claims) -> ApiResult<String> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| ApiError::internal(format!("Failed to create token: {}", e)))
    }

    /// Creates a new access token for a user.
    pub fn create_access_token(&self, user_id: &str, role: Role) -> ApiResult<String> {
        let claims = Claims::new(user_id, Some(role), self.config.expiration_secs)
            .with_issuer(&self.config.issuer)
            .with_audience(&self.config.audience);

        self.create_token(&claims)
    }

    /// Validates and decodes a token.
    ///
    /// Verification failures never propagate the underlying library detail to
    /// the caller; everything maps to an unauthorized outcome with a short
    /// category message.
    pub fn validate_token(&self, token: &str) -> ApiResult<Claims> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                use jsonwebtoken::errors::ErrorKind;
                match e.kind() {
                    ErrorKind::ExpiredSignature => ApiError::unauthorized("Token has expired"),
                    ErrorKind::InvalidToken => ApiError::unauthorized("Invalid token format"),
                    ErrorKind::InvalidSignature => ApiError::unauthorized("Invalid token signature"),
                    ErrorKind::InvalidIssuer => ApiError::unauthorized("Invalid token issuer"),
                    ErrorKind::InvalidAudience => ApiError::unauthorized("Invalid token audience"),
                    _ => ApiError::unauthorized("Token verification failed"),
                }
            })
    }

    /// Returns the configured token lifetime in seconds.
    pub fn expiration_secs(&self) -> i64 {
        self.config.expiration_secs
    }
}

impl std::fmt::Debug for JwtManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtManager")
            .field("issuer", &self.config.issuer)
            .field("audience", &self.config.audience)
            .field("expiration_secs", &self.config.expiration_secs)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> LocalTokenConfig {
        LocalTokenConfig::new("test-secret-key-that-is-long-enough-for-testing")
    }

    #[test]
    fn test_create_and_validate_token() {
        let manager = JwtManager::new(test_config()).unwrap();

        let token = manager.create_access_token("user123", Role::Admin).unwrap();
        let claims = manager.validate_token(&token).unwrap();

        assert_eq!(claims.sub, "user123");
        assert_eq!(claims.role_or_default(), Role::Admin);
    }

    #[test]
    fn test_expired_token_rejected() {
        let manager = JwtManager::new(test_config()).unwrap();

        // 61 seconds past the 60 second leeway
        let claims = Claims::new("user", Some(Role::Patient), -121)
            .with_issuer("dokq-healthcare")
            .with_audience("dokq-users");
        let token = manager.create_token(&claims).unwrap();

        assert!(manager.validate_token(&token).is_err());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let manager1 =
            JwtManager::new(LocalTokenConfig::new("secret-one-for-testing-purposes!")).unwrap();
        let manager2 =
            JwtManager::new(LocalTokenConfig::new("secret-two-for-testing-purposes!")).unwrap();

        let token = manager1.create_access_token("user", Role::Nurse).unwrap();
        assert!(manager2.validate_token(&token).is_err());
    }

    #[test]
    fn test_garbage_token_rejected() {
        let manager = JwtManager::new(test_config()).unwrap();
        assert!(manager.validate_token("not.a.token").is_err());
    }

    #[test]
    fn test_secret_strength() {
        assert!(validate_secret(None).is_err());
        assert!(validate_secret(Some("fallback-secret")).is_err());
        assert!(validate_secret(Some("short")).is_err());
        assert!(validate_secret(Some("0123456789abcdef0123456789abcdef")).is_ok());
    }

    #[test]
    fn test_weak_secret_is_fatal_config_error() {
        let err = JwtManager::new(LocalTokenConfig::new("short")).unwrap_err();
        assert_eq!(err.error_code(), "SERVER_CONFIGURATION_ERROR");
    }
}
