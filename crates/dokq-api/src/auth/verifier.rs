// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Credential verification strategies.
//!
//! Bearer credentials are resolved by exactly one of three strategies, chosen
//! by configuration priority at startup:
//!
//! 1. [`IdentityPlatformVerifier`]: managed identity-provider tokens
//! 2. [`LocalTokenVerifier`]: locally signed tokens
//! 3. [`SharedSecretVerifier`]: raw shared-secret signatures
//!
//! A strategy's failure is terminal for the request; there is no
//! fall-through between strategies at verification time.

use std::sync::Arc;

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};

use super::{Claims, JwtManager};
use crate::auth::jwt::validate_secret;
use crate::config::{AuthConfig, IdentityPlatformConfig};
use crate::error::{ApiError, ApiResult};

// =============================================================================
// CredentialVerifier
// =============================================================================

/// A strategy for turning a bearer token into verified claims.
pub trait CredentialVerifier: Send + Sync {
    /// Short strategy name, used in logs.
    fn name(&self) -> &'static str;

    /// Verifies the token and returns its claims.
    fn verify(&self, token: &str) -> ApiResult<Claims>;
}

// =============================================================================
// IdentityPlatformVerifier
// =============================================================================

/// Verifies tokens issued by the managed identity platform.
///
/// Checks an RS256 signature against the configured public key, with issuer
/// and audience pinned to the platform project.
pub struct IdentityPlatformVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
    project_id: String,
}

impl IdentityPlatformVerifier {
    /// Creates a verifier from the platform configuration.
    ///
    /// Returns a configuration error if the public key is absent or not valid
    /// PEM.
    pub fn new(config: &IdentityPlatformConfig) -> ApiResult<Self> {
        let pem = config.public_key_pem.as_deref().ok_or_else(|| {
            ApiError::server_config("Identity platform public key is not configured")
        })?;

        let decoding_key = DecodingKey::from_rsa_pem(pem.as_bytes())
            .map_err(|e| ApiError::server_config(format!("Invalid identity platform key: {}", e)))?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[format!(
            "https://securetoken.google.com/{}",
            config.project_id
        )]);
        validation.set_audience(&[&config.project_id]);

        Ok(Self {
            decoding_key,
            validation,
            project_id: config.project_id.clone(),
        })
    }

    /// Returns the project this verifier is bound to.
    pub fn project_id(&self) -> &str {
        &self.project_id
    }
}

impl CredentialVerifier for IdentityPlatformVerifier {
    fn name(&self) -> &'static str {
        "identity_platform"
    }

    fn verify(&self, token: &str) -> ApiResult<Claims> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(error = %e, "Identity platform token rejected");
                ApiError::unauthorized("Invalid or expired token")
            })
    }
}

// =============================================================================
// LocalTokenVerifier
// =============================================================================

/// Verifies locally signed tokens via [`JwtManager`].
pub struct LocalTokenVerifier {
    manager: JwtManager,
}

impl LocalTokenVerifier {
    /// Creates a verifier backed by the given manager.
    pub fn new(manager: JwtManager) -> Self {
        Self { manager }
    }
}

impl CredentialVerifier for LocalTokenVerifier {
    fn name(&self) -> &'static str {
        "local_token"
    }

    fn verify(&self, token: &str) -> ApiResult<Claims> {
        self.manager.validate_token(token)
    }
}

// =============================================================================
// SharedSecretVerifier
// =============================================================================

/// Verifies raw HS256 signatures with a shared secret.
///
/// The secret is checked per request: a missing secret, the well-known
/// placeholder, or one shorter than 32 characters yields a server
/// configuration error rather than an unauthorized response.
pub struct SharedSecretVerifier {
    secret: Option<String>,
}

impl SharedSecretVerifier {
    /// Creates a verifier over the (possibly absent) shared secret.
    pub fn new(secret: Option<String>) -> Self {
        Self { secret }
    }
}

impl CredentialVerifier for SharedSecretVerifier {
    fn name(&self) -> &'static str {
        "shared_secret"
    }

    fn verify(&self, token: &str) -> ApiResult<Claims> {
        let secret = validate_secret(self.secret.as_deref())?;

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_aud = false;

        decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(error = %e, "Shared-secret token rejected");
                ApiError::unauthorized("Invalid or expired token")
            })
    }
}

// =============================================================================
// VerifierChain
// =============================================================================

/// The ordered set of configured verification strategies.
///
/// Construction selects strategies in priority order; verification always
/// uses the highest-priority one. Keeping the rest of the chain around makes
/// the selection inspectable in logs and tests.
pub struct VerifierChain {
    verifiers: Vec<Arc<dyn CredentialVerifier>>,
}

impl VerifierChain {
    /// Builds the chain from configuration.
    pub fn from_config(config: &AuthConfig) -> ApiResult<Self> {
        let mut verifiers: Vec<Arc<dyn CredentialVerifier>> = Vec::new();

        if let Some(idp) = &config.identity_platform {
            if idp.public_key_pem.is_some() {
                verifiers.push(Arc::new(IdentityPlatformVerifier::new(idp)?));
            }
        }

        if let Some(local) = &config.local_token {
            verifiers.push(Arc::new(LocalTokenVerifier::new(JwtManager::new(
                local.clone(),
            )?)));
        }

        if verifiers.is_empty() {
            verifiers.push(Arc::new(SharedSecretVerifier::new(
                config.shared_secret.clone(),
            )));
        }

        Ok(Self { verifiers })
    }

    /// Builds a chain over a single explicit strategy.
    pub fn single(verifier: Arc<dyn CredentialVerifier>) -> Self {
        Self {
            verifiers: vec![verifier],
        }
    }

    /// The name of the strategy that will handle requests.
    pub fn active(&self) -> &'static str {
        self.verifiers[0].name()
    }

    /// Verifies a bearer token with the active strategy.
    pub fn verify(&self, token: &str) -> ApiResult<Claims> {
        self.verifiers[0].verify(token)
    }
}

impl std::fmt::Debug for VerifierChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<_> = self.verifiers.iter().map(|v| v.name()).collect();
        f.debug_struct("VerifierChain").field("order", &names).finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::config::LocalTokenConfig;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const TEST_SECRET: &str = "test-secret-key-that-is-long-enough-for-testing";

    #[test]
    fn test_chain_prefers_local_over_shared_secret() {
        let config = AuthConfig {
            identity_platform: None,
            local_token: Some(LocalTokenConfig::new(TEST_SECRET)),
            shared_secret: Some(TEST_SECRET.to_string()),
        };

        let chain = VerifierChain::from_config(&config).unwrap();
        assert_eq!(chain.active(), "local_token");
    }

    #[test]
    fn test_chain_falls_back_to_shared_secret() {
        let config = AuthConfig {
            identity_platform: None,
            local_token: None,
            shared_secret: Some(TEST_SECRET.to_string()),
        };

        let chain = VerifierChain::from_config(&config).unwrap();
        assert_eq!(chain.active(), "shared_secret");
    }

    #[test]
    fn test_platform_without_key_is_skipped() {
        let config = AuthConfig {
            identity_platform: Some(crate::config::IdentityPlatformConfig {
                project_id: "dokq-ph".to_string(),
                public_key_pem: None,
            }),
            local_token: Some(LocalTokenConfig::new(TEST_SECRET)),
            shared_secret: None,
        };

        let chain = VerifierChain::from_config(&config).unwrap();
        assert_eq!(chain.active(), "local_token");
    }

    #[test]
    fn test_shared_secret_round_trip() {
        let claims = Claims::new("user7", Some(Role::Admin), 3600);
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(TEST_SECRET.as_bytes()),
        )
        .unwrap();

        let verifier = SharedSecretVerifier::new(Some(TEST_SECRET.to_string()));
        let verified = verifier.verify(&token).unwrap();

        assert_eq!(verified.sub, "user7");
        assert_eq!(verified.role_or_default(), Role::Admin);
    }

    #[test]
    fn test_shared_secret_misconfiguration_is_fatal() {
        for secret in [None, Some("fallback-secret".to_string()), Some("tiny".to_string())] {
            let verifier = SharedSecretVerifier::new(secret);
            let err = verifier.verify("whatever").unwrap_err();
            assert_eq!(err.error_code(), "SERVER_CONFIGURATION_ERROR");
        }
    }

    #[test]
    fn test_verification_failure_detail_not_leaked() {
        let verifier = SharedSecretVerifier::new(Some(TEST_SECRET.to_string()));
        let err = verifier.verify("mangled.token.value").unwrap_err();

        assert_eq!(err.error_code(), "UNAUTHORIZED");
        assert_eq!(err.user_message(), "Authentication required");
    }

    #[test]
    fn test_local_verifier_rejects_foreign_issuer() {
        let manager = JwtManager::new(LocalTokenConfig::new(TEST_SECRET)).unwrap();
        let verifier = LocalTokenVerifier::new(manager);

        // Same secret, wrong issuer/audience
        let claims = Claims::new("user", Some(Role::Doctor), 3600)
            .with_issuer("someone-else")
            .with_audience("dokq-users");
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(TEST_SECRET.as_bytes()),
        )
        .unwrap();

        assert!(verifier.verify(&token).is_err());
    }
}
