// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Application state shared across handlers.

use std::sync::Arc;

use crate::auth::VerifierChain;
use crate::config::ApiConfig;
use crate::csrf::CsrfProtection;
use crate::error::ApiResult;
use crate::sanitizer::ErrorSanitizer;

// =============================================================================
// AppState
// =============================================================================

/// Application state shared across all handlers and middleware.
///
/// Every component is an explicitly constructed, injected instance; tests
/// build isolated states instead of touching process-wide singletons.
#[derive(Clone)]
pub struct AppState {
    /// API configuration.
    pub config: Arc<ApiConfig>,
    /// Credential verifier chain.
    pub verifiers: Arc<VerifierChain>,
    /// CSRF protocol engine and token store.
    pub csrf: Arc<CsrfProtection>,
    /// Environment-aware error sanitizer.
    pub sanitizer: Arc<ErrorSanitizer>,
}

impl AppState {
    /// Creates a new app state builder.
    pub fn builder() -> AppStateBuilder {
        AppStateBuilder::new()
    }
}

// =============================================================================
// AppStateBuilder
// =============================================================================

/// Builder for constructing [`AppState`].
///
/// Components not set explicitly are constructed from the configuration.
#[derive(Default)]
pub struct AppStateBuilder {
    config: Option<ApiConfig>,
    verifiers: Option<Arc<VerifierChain>>,
    csrf: Option<Arc<CsrfProtection>>,
    sanitizer: Option<Arc<ErrorSanitizer>>,
}

impl AppStateBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the configuration.
    pub fn config(mut self, config: ApiConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Sets the verifier chain.
    pub fn verifiers(mut self, verifiers: Arc<VerifierChain>) -> Self {
        self.verifiers = Some(verifiers);
        self
    }

    /// Sets the CSRF engine.
    pub fn csrf(mut self, csrf: Arc<CsrfProtection>) -> Self {
        self.csrf = Some(csrf);
        self
    }

    /// Sets the error sanitizer.
    pub fn sanitizer(mut self, sanitizer: Arc<ErrorSanitizer>) -> Self {
        self.sanitizer = Some(sanitizer);
        self
    }

    /// Builds the state, deriving unset components from the configuration.
    pub fn build(self) -> ApiResult<AppState> {
        let config = self.config.unwrap_or_default();

        let verifiers = match self.verifiers {
            Some(verifiers) => verifiers,
            None => Arc::new(VerifierChain::from_config(&config.auth)?),
        };

        let csrf = self
            .csrf
            .unwrap_or_else(|| Arc::new(CsrfProtection::new(config.csrf.clone())));

        let sanitizer = self
            .sanitizer
            .unwrap_or_else(|| Arc::new(ErrorSanitizer::new(config.environment)));

        Ok(AppState {
            config: Arc::new(config),
            verifiers,
            csrf,
            sanitizer,
        })
    }
}

// =============================================================================
// FromRef implementations for extracting parts of state
// =============================================================================

impl axum::extract::FromRef<AppState> for Arc<ApiConfig> {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

impl axum::extract::FromRef<AppState> for Arc<CsrfProtection> {
    fn from_ref(state: &AppState) -> Self {
        state.csrf.clone()
    }
}

impl axum::extract::FromRef<AppState> for Arc<ErrorSanitizer> {
    fn from_ref(state: &AppState) -> Self {
        state.sanitizer.clone()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AuthConfig, LocalTokenConfig};

    fn test_config() -> ApiConfig {
        ApiConfig::default().with_auth(AuthConfig {
            identity_platform: None,
            local_token: Some(LocalTokenConfig::new(
                "test-secret-key-that-is-long-enough-for-testing",
            )),
            shared_secret: None,
        })
    }

    #[test]
    fn test_state_builder_defaults_from_config() {
        let state = AppState::builder().config(test_config()).build().unwrap();

        assert_eq!(state.verifiers.active(), "local_token");
        assert_eq!(state.csrf.stats().total_tokens, 0);
        assert!(!state.sanitizer.environment().is_production());
    }

    #[test]
    fn test_state_builder_accepts_explicit_components() {
        let csrf = Arc::new(CsrfProtection::new(Default::default()));
        csrf.issue("pre-seeded");

        let state = AppState::builder()
            .config(test_config())
            .csrf(csrf)
            .build()
            .unwrap();

        assert_eq!(state.csrf.stats().total_tokens, 1);
    }

    #[test]
    fn test_states_are_isolated() {
        let a = AppState::builder().config(test_config()).build().unwrap();
        let b = AppState::builder().config(test_config()).build().unwrap();

        a.csrf.issue("session-1");
        assert_eq!(a.csrf.stats().total_tokens, 1);
        assert_eq!(b.csrf.stats().total_tokens, 0);
    }
}
