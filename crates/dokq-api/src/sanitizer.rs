// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Environment-aware error sanitization.
//!
//! Every failure response passes through here before leaving the server. The
//! sanitizer always logs the full original error, then renders an external
//! body appropriate for the environment: development reflects the real
//! message to aid debugging, production maps known codes through a fixed
//! safe-message table and classifies everything else by keyword, so raw
//! internal error text never reaches a client.
//!
//! [`SanitizeErrorLayer`] is installed as the outermost body-producing layer,
//! which makes it the final handler for errors raised anywhere in the
//! pipeline, including the route handlers.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::{
    body::Body,
    http::{header, HeaderValue, Request, StatusCode},
    response::Response,
};
use chrono::Utc;
use tower::{Layer, Service};

use crate::config::Environment;
use crate::error::ErrorSource;

// =============================================================================
// Safe Message Table
// =============================================================================

/// Fixed production messages for known error codes.
///
/// Covers both upstream identity/datastore codes and this service's own
/// stable codes.
fn safe_message(code: &str) -> Option<&'static str> {
    let message = match code {
        // Upstream identity-provider codes
        "auth/user-not-found" | "auth/wrong-password" => "Invalid login credentials",
        "auth/invalid-email" => "Please enter a valid email address",
        "auth/user-disabled" => "Account access has been restricted",
        "auth/too-many-requests" => "Too many attempts. Please try again later",
        "auth/network-request-failed" => "Network error. Please check your connection",
        "auth/email-already-in-use" => "Email address is already registered",
        "auth/weak-password" => "Password does not meet security requirements",
        "auth/operation-not-allowed" => "This operation is not available",
        // Upstream datastore codes
        "permission-denied" => "Access denied",
        "not-found" => "Requested resource not found",
        "already-exists" => "Resource already exists",
        "failed-precondition" => "Operation cannot be completed",
        "out-of-range" => "Invalid request parameters",
        "invalid-argument" => "Invalid request data",
        "deadline-exceeded" => "Request timeout",
        "unavailable" => "Service temporarily unavailable",
        // This service's codes
        "UNAUTHORIZED" => "Authentication required",
        "FORBIDDEN" => "Access denied",
        "NOT_FOUND" => "Requested resource not found",
        "CONFLICT" => "Resource already exists",
        "VALIDATION_ERROR" => "Invalid input data",
        "BAD_REQUEST" => "Invalid request data",
        "PAYLOAD_TOO_LARGE" => "Request size exceeds maximum allowed limit",
        "UNSUPPORTED_MEDIA_TYPE" => "Content type not supported",
        "RATE_LIMIT_EXCEEDED" => "Too many requests. Please try again later",
        "SERVER_CONFIGURATION_ERROR" => "Authentication service unavailable",
        "CSRF_TOKEN_MISSING" => "CSRF token missing",
        "CSRF_TOKEN_MISMATCH" => "CSRF token mismatch",
        "CSRF_TOKEN_INVALID" => "Invalid or expired CSRF token",
        "CSRF_SESSION_REQUIRED" => "Session required for CSRF protection",
        _ => return None,
    };
    Some(message)
}

/// Classifies an arbitrary internal message into a safe external one.
fn classify_message(message: &str) -> &'static str {
    let lower = message.to_lowercase();
    if lower.contains("password") {
        "Authentication failed"
    } else if lower.contains("email") {
        "Invalid email address"
    } else if lower.contains("permission") || lower.contains("unauthorized") || lower.contains("forbidden") {
        "Access denied"
    } else if lower.contains("network") || lower.contains("connection") {
        "Network error occurred"
    } else if lower.contains("timeout") {
        "Request timeout"
    } else if lower.contains("too many") {
        "Too many requests. Please try again later"
    } else {
        "An error occurred. Please try again"
    }
}

/// Maps a known error code to an HTTP status, for errors raised by upstream
/// collaborators that carry no status of their own.
pub fn status_for_code(code: &str) -> Option<StatusCode> {
    if code.starts_with("auth/") {
        return Some(StatusCode::UNAUTHORIZED);
    }
    match code {
        "permission-denied" => Some(StatusCode::FORBIDDEN),
        "not-found" => Some(StatusCode::NOT_FOUND),
        "already-exists" => Some(StatusCode::CONFLICT),
        _ => None,
    }
}

// =============================================================================
// ErrorSanitizer
// =============================================================================

/// Renders error responses for a given environment.
///
/// Constructed explicitly and injected; tests create isolated instances for
/// each environment instead of toggling process state.
#[derive(Debug, Clone)]
pub struct ErrorSanitizer {
    environment: Environment,
}

impl ErrorSanitizer {
    /// Creates a sanitizer for the given environment.
    pub fn new(environment: Environment) -> Self {
        Self { environment }
    }

    /// Returns the environment this sanitizer renders for.
    pub fn environment(&self) -> Environment {
        self.environment
    }

    /// Builds the external envelope for an error.
    pub fn envelope(&self, source: &ErrorSource) -> serde_json::Value {
        let timestamp = Utc::now().to_rfc3339();

        // Validation failures have their own shape.
        if let Some(errors) = &source.fields {
            if self.environment.is_production() {
                return serde_json::json!({
                    "error": "Invalid input data",
                    "message": "Please check your input and try again",
                    "timestamp": timestamp,
                });
            }
            let details: Vec<_> = errors
                .fields
                .iter()
                .map(|f| serde_json::json!({ "field": f.field, "message": f.message }))
                .collect();
            return serde_json::json!({
                "error": "Validation Error",
                "message": "Please correct the following issues",
                "details": details,
                "timestamp": timestamp,
            });
        }

        let external = if self.environment.is_production() {
            safe_message(source.code)
                .map(str::to_string)
                .unwrap_or_else(|| classify_message(&source.message).to_string())
        } else {
            source.message.clone()
        };

        // CSRF failures keep their machine-readable code in every
        // environment; clients key their refresh logic off it.
        if source.code.starts_with("CSRF_") {
            return serde_json::json!({
                "error": "CSRF protection error",
                "message": external,
                "code": source.code,
                "timestamp": timestamp,
            });
        }

        let mut envelope = serde_json::json!({
            "error": external,
            "timestamp": timestamp,
        });
        if !self.environment.is_production() {
            envelope["code"] = serde_json::Value::String(source.code.to_string());
            if source.message != external {
                envelope["originalMessage"] = serde_json::Value::String(source.message.clone());
            }
        }
        envelope
    }

    /// Envelope for error responses that carry no [`ErrorSource`] (rejections
    /// produced outside the pipeline, e.g. method-not-allowed).
    pub fn fallback_envelope(&self, status: StatusCode) -> serde_json::Value {
        let message = status
            .canonical_reason()
            .unwrap_or("An error occurred. Please try again");
        serde_json::json!({
            "error": message,
            "timestamp": Utc::now().to_rfc3339(),
        })
    }

    /// Logs the full original error. Runs for every failure, regardless of
    /// environment.
    fn log(&self, source: &ErrorSource) {
        if source.status.is_server_error() {
            tracing::error!(
                code = source.code,
                status = %source.status,
                message = %source.message,
                "Request failed"
            );
        } else {
            tracing::debug!(
                code = source.code,
                status = %source.status,
                message = %source.message,
                "Request rejected"
            );
        }
    }

    /// Rewrites an error response with the sanitized body, preserving status
    /// and headers set by inner layers.
    pub fn apply(&self, response: Response) -> Response {
        let envelope = if let Some(source) = response.extensions().get::<Arc<ErrorSource>>() {
            let source = source.clone();
            self.log(&source);
            self.envelope(&source)
        } else if response.status().is_client_error() || response.status().is_server_error() {
            self.fallback_envelope(response.status())
        } else {
            return response;
        };

        let (mut parts, _) = response.into_parts();
        let body = serde_json::to_vec(&envelope).unwrap_or_default();
        parts.headers.remove(header::CONTENT_LENGTH);
        parts
            .headers
            .insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Response::from_parts(parts, Body::from(body))
    }
}

// =============================================================================
// SanitizeErrorLayer
// =============================================================================

/// Layer installing the sanitizer as the final error handler.
#[derive(Clone)]
pub struct SanitizeErrorLayer {
    sanitizer: Arc<ErrorSanitizer>,
}

impl SanitizeErrorLayer {
    /// Creates the layer over a shared sanitizer.
    pub fn new(sanitizer: Arc<ErrorSanitizer>) -> Self {
        Self { sanitizer }
    }
}

impl<S> Layer<S> for SanitizeErrorLayer {
    type Service = SanitizeErrorMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        SanitizeErrorMiddleware {
            inner,
            sanitizer: self.sanitizer.clone(),
        }
    }
}

/// Middleware rewriting error responses on the way out.
#[derive(Clone)]
pub struct SanitizeErrorMiddleware<S> {
    inner: S,
    sanitizer: Arc<ErrorSanitizer>,
}

impl<S> Service<Request<Body>> for SanitizeErrorMiddleware<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let sanitizer = self.sanitizer.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let response = inner.call(req).await?;
            Ok(sanitizer.apply(response))
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
