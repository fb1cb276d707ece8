// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # dokq-api
//!
//! REST API server and request-security core for the DokQ healthcare
//! platform.
//!
//! The crate is organized around an ordered middleware pipeline: request
//! sanitization, origin policy, bearer authentication, CSRF double-submit
//! validation, and role authorization wrap a set of clinical CRUD endpoints,
//! with an environment-aware error sanitizer as the terminal failure handler.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod auth;
pub mod config;
pub mod csrf;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod response;
pub mod sanitizer;
pub mod server;
pub mod state;

pub use auth::{Claims, JwtManager, ResolvedIdentity, Role, VerifierChain};
pub use config::{ApiConfig, AuthConfig, CorsConfig, Environment, LocalTokenConfig};
pub use csrf::{CsrfConfig, CsrfLayer, CsrfProtection, CsrfTokenStore};
pub use error::{ApiError, ApiResult, ValidationErrors};
pub use sanitizer::ErrorSanitizer;
pub use server::ApiServer;
pub use state::AppState;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
