// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! API server configuration.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::csrf::CsrfConfig;

// =============================================================================
// Environment
// =============================================================================

/// Deployment environment.
///
/// Controls the strictness of origin policy, cookie flags, and the verbosity
/// of sanitized error responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Local development: relaxed origins, verbose errors.
    #[default]
    Development,
    /// Production: single configured origin, sanitized errors only.
    Production,
}

impl Environment {
    /// Reads the environment from `DOKQ_ENV` (falling back to `NODE_ENV`).
    ///
    /// Anything other than `production` is treated as development.
    pub fn from_env() -> Self {
        let value = std::env::var("DOKQ_ENV")
            .or_else(|_| std::env::var("NODE_ENV"))
            .unwrap_or_default();
        Self::parse(&value)
    }

    /// Parses an environment name.
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "production" | "prod" => Environment::Production,
            _ => Environment::Development,
        }
    }

    /// Returns `true` in production.
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

// =============================================================================
// ApiConfig
// =============================================================================

/// Configuration for the API server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Server host address.
    pub host: IpAddr,
    /// Server port.
    pub port: u16,
    /// Deployment environment.
    pub environment: Environment,
    /// CORS configuration.
    pub cors: CorsConfig,
    /// Authentication configuration.
    pub auth: AuthConfig,
    /// CSRF protocol configuration.
    pub csrf: CsrfConfig,
    /// Request timeout.
    #[serde(with = "duration_serde")]
    pub request_timeout: Duration,
    /// Graceful shutdown timeout.
    #[serde(with = "duration_serde")]
    pub shutdown_timeout: Duration,
    /// Maximum request body size in bytes.
    pub max_body_size: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            port: 3001,
            environment: Environment::Development,
            cors: CorsConfig::default(),
            auth: AuthConfig::default(),
            csrf: CsrfConfig::default(),
            request_timeout: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(30),
            max_body_size: 10 * 1024 * 1024, // 10 MiB
        }
    }
}

impl ApiConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a configuration from environment variables.
    ///
    /// Reads `DOKQ_ENV`/`NODE_ENV`, `PORT`, `CORS_ORIGIN`, `JWT_SECRET`,
    /// `IDP_PROJECT_ID` and `IDP_PUBLIC_KEY_PEM`.
    pub fn from_env() -> Self {
        let environment = Environment::from_env();

        let port = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3001);

        let cors = CorsConfig::for_environment(environment, std::env::var("CORS_ORIGIN").ok());

        let auth = AuthConfig {
            identity_platform: std::env::var("IDP_PROJECT_ID").ok().map(|project_id| {
                IdentityPlatformConfig {
                    project_id,
                    public_key_pem: std::env::var("IDP_PUBLIC_KEY_PEM").ok(),
                }
            }),
            local_token: None,
            shared_secret: std::env::var("JWT_SECRET").ok(),
        };

        Self {
            port,
            environment,
            cors,
            auth,
            ..Default::default()
        }
    }

    /// Returns the socket address to bind to.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Sets the host address.
    pub fn with_host(mut self, host: IpAddr) -> Self {
        self.host = host;
        self
    }

    /// Sets the port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the environment.
    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    /// Sets the authentication configuration.
    pub fn with_auth(mut self, auth: AuthConfig) -> Self {
        self.auth = auth;
        self
    }

    /// Returns `true` if running in production.
    pub fn is_production(&self) -> bool {
        self.environment.is_production()
    }
}

// =============================================================================
// CorsConfig
// =============================================================================

/// CORS (Cross-Origin Resource Sharing) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Allowed origins. Requests without an `Origin` header always pass.
    pub allowed_origins: Vec<String>,
    /// Allowed methods.
    pub allowed_methods: Vec<String>,
    /// Allowed request headers.
    pub allowed_headers: Vec<String>,
    /// Headers exposed to the browser.
    pub exposed_headers: Vec<String>,
    /// Whether cross-origin credentials (cookies) are permitted.
    pub allow_credentials: bool,
    /// Max age for preflight cache (seconds).
    pub max_age: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: Self::dev_origins(),
            allowed_methods: vec![
                "GET".to_string(),
                "POST".to_string(),
                "PUT".to_string(),
                "DELETE".to_string(),
                "OPTIONS".to_string(),
            ],
            allowed_headers: vec![
                "Content-Type".to_string(),
                "Authorization".to_string(),
                "X-Requested-With".to_string(),
                "Accept".to_string(),
                "Origin".to_string(),
                "x-csrf-token".to_string(),
            ],
            exposed_headers: vec!["X-Total-Count".to_string(), "X-Page-Count".to_string()],
            allow_credentials: true,
            max_age: 86_400, // 24h preflight cache
        }
    }
}

impl CorsConfig {
    /// The fixed set of local development origins.
    pub fn dev_origins() -> Vec<String> {
        vec![
            "http://localhost:5173".to_string(),
            "http://localhost:3000".to_string(),
            "http://localhost:3001".to_string(),
            "http://localhost:8080".to_string(),
            "http://127.0.0.1:5173".to_string(),
            "http://127.0.0.1:3000".to_string(),
        ]
    }

    /// Builds the origin policy for the given environment.
    ///
    /// Production allows exactly one configured origin; development allows the
    /// fixed local set.
    pub fn for_environment(environment: Environment, configured_origin: Option<String>) -> Self {
        let allowed_origins = if environment.is_production() {
            vec![configured_origin.unwrap_or_else(|| "http://localhost:5173".to_string())]
        } else {
            Self::dev_origins()
        };

        Self {
            allowed_origins,
            ..Default::default()
        }
    }

    /// Returns `true` if the given origin value is allowed.
    pub fn is_origin_allowed(&self, origin: &str) -> bool {
        self.allowed_origins.iter().any(|o| o == origin)
    }
}

// =============================================================================
// AuthConfig
// =============================================================================

/// Authentication configuration.
///
/// Which credential verifier handles requests is decided by priority at
/// startup: the identity platform if configured, else the local signed-token
/// helper, else the raw shared-secret scheme.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AuthConfig {
    /// Managed identity-platform verification (highest priority).
    pub identity_platform: Option<IdentityPlatformConfig>,
    /// Local signed-token helper.
    pub local_token: Option<LocalTokenConfig>,
    /// Raw shared-secret signature scheme (last resort).
    #[serde(skip_serializing)]
    pub shared_secret: Option<String>,
}

/// Configuration for the managed identity-platform verifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityPlatformConfig {
    /// Identity platform project identifier (token audience).
    pub project_id: String,
    /// PEM-encoded RSA public key used to check token signatures.
    pub public_key_pem: Option<String>,
}

/// Configuration for the local signed-token helper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalTokenConfig {
    /// Signing secret.
    #[serde(skip_serializing)]
    pub secret: String,
    /// Token issuer.
    pub issuer: String,
    /// Token audience.
    pub audience: String,
    /// Token lifetime in seconds.
    pub expiration_secs: i64,
}

impl LocalTokenConfig {
    /// Creates a configuration with the platform's fixed issuer and audience.
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            issuer: "dokq-healthcare".to_string(),
            audience: "dokq-users".to_string(),
            expiration_secs: 86_400, // 24h
        }
    }
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

    #[test]
    fn test_default_config() {
        let config = ApiConfig::default();
        assert_eq!(config.port, 3001);
        assert_eq!(config.max_body_size, 10 * 1024 * 1024);
        assert!(!config.is_production());
    }

    #[test]
    fn test_socket_addr() {
        let config = ApiConfig::default().with_port(9000);
        assert_eq!(config.socket_addr().port(), 9000);
    }

    #[test]
    fn test_environment_parse() {
        assert_eq!(Environment::parse("production"), Environment::Production);
        assert_eq!(Environment::parse("PROD"), Environment::Production);
        assert_eq!(Environment::parse("development"), Environment::Development);
        assert_eq!(Environment::parse(""), Environment::Development);
    }

    #[test]
    fn test_cors_production_single_origin() {
        let cors = CorsConfig::for_environment(
            Environment::Production,
            Some("https://app.dokq.ph".to_string()),
        );
        assert_eq!(cors.allowed_origins, vec!["https://app.dokq.ph"]);
        assert!(cors.is_origin_allowed("https://app.dokq.ph"));
        assert!(!cors.is_origin_allowed("http://localhost:5173"));
    }

    #[test]
    fn test_cors_development_origins() {
        let cors = CorsConfig::for_environment(Environment::Development, None);
        assert!(cors.is_origin_allowed("http://localhost:5173"));
        assert!(cors.is_origin_allowed("http://127.0.0.1:3000"));
        assert!(!cors.is_origin_allowed("https://evil.example"));
    }
}
