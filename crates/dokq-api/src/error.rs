// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! API error types and handling.
//!
//! This module provides a comprehensive error type that maps to HTTP status codes
//! and stable machine-readable error codes. The environment-aware rendering of
//! these errors into response bodies lives in [`crate::sanitizer::ErrorSanitizer`];
//! the `IntoResponse` impl here only attaches the error to the response so the
//! outermost sanitization layer can rewrite it.

use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for API operations.
pub type ApiResult<T> = Result<T, ApiError>;

// =============================================================================
// ApiError
// =============================================================================

/// API error type with HTTP status code mapping.
///
/// This error type is designed to be returned from handlers and middleware and
/// automatically converted to appropriate HTTP responses.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404).
    #[error("Resource not found: {resource}")]
    NotFound {
        /// The resource that was not found.
        resource: String,
    },

    /// Bad request (400).
    #[error("Bad request: {message}")]
    BadRequest {
        /// Error message.
        message: String,
    },

    /// Unauthorized (401).
    #[error("Unauthorized: {message}")]
    Unauthorized {
        /// Error message.
        message: String,
    },

    /// Forbidden (403).
    #[error("Forbidden: {message}")]
    Forbidden {
        /// Error message.
        message: String,
    },

    /// Declared request body exceeds the allowed ceiling (413).
    #[error("Request size exceeds maximum allowed limit")]
    PayloadTooLarge,

    /// Mutating request with a content type outside the allow-list (415).
    #[error("Content type not supported")]
    UnsupportedMediaType,

    /// Validation error (400).
    #[error("Validation error: {message}")]
    Validation {
        /// Error message.
        message: String,
        /// Field-specific errors.
        #[source]
        errors: Option<ValidationErrors>,
    },

    /// Conflict (409).
    #[error("Conflict: {message}")]
    Conflict {
        /// Error message.
        message: String,
    },

    /// CSRF token absent from header and body (403).
    #[error("CSRF token missing")]
    CsrfTokenMissing,

    /// Submitted CSRF token disagrees with the cookie copy (403).
    #[error("CSRF token mismatch")]
    CsrfTokenMismatch,

    /// CSRF token unknown, expired, or bound to another session (403).
    #[error("Invalid or expired CSRF token")]
    CsrfTokenInvalid,

    /// No session identifier could be derived for CSRF validation (401).
    #[error("Session required for CSRF protection")]
    CsrfSessionRequired,

    /// Fatal server misconfiguration, e.g. a missing or weak signing secret (500).
    #[error("Server configuration error: {message}")]
    ServerConfig {
        /// Error message (for logging, never user-facing).
        message: String,
    },

    /// Internal server error (500).
    #[error("Internal error: {message}")]
    Internal {
        /// Error message (for logging, not user-facing).
        message: String,
    },
}

impl ApiError {
    // =========================================================================
    // Constructors
    // =========================================================================

    /// Creates a not found error.
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Creates a bad request error.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    /// Creates an unauthorized error.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    /// Creates a forbidden error.
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden {
            message: message.into(),
        }
    }

    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            errors: None,
        }
    }

    /// Creates a validation error with field errors.
    pub fn validation_with_errors(message: impl Into<String>, errors: ValidationErrors) -> Self {
        Self::Validation {
            message: message.into(),
            errors: Some(errors),
        }
    }

    /// Creates a conflict error.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Creates a server configuration error.
    pub fn server_config(message: impl Into<String>) -> Self {
        Self::ServerConfig {
            message: message.into(),
        }
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    // =========================================================================
    // Properties
    // =========================================================================

    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden { .. } => StatusCode::FORBIDDEN,
            ApiError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::Validation { .. } => StatusCode::BAD_REQUEST,
            ApiError::Conflict { .. } => StatusCode::CONFLICT,
            ApiError::CsrfTokenMissing
            | ApiError::CsrfTokenMismatch
            | ApiError::CsrfTokenInvalid => StatusCode::FORBIDDEN,
            ApiError::CsrfSessionRequired => StatusCode::UNAUTHORIZED,
            ApiError::ServerConfig { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the stable machine-readable error code.
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::NotFound { .. } => "NOT_FOUND",
            ApiError::BadRequest { .. } => "BAD_REQUEST",
            ApiError::Unauthorized { .. } => "UNAUTHORIZED",
            ApiError::Forbidden { .. } => "FORBIDDEN",
            ApiError::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            ApiError::UnsupportedMediaType => "UNSUPPORTED_MEDIA_TYPE",
            ApiError::Validation { .. } => "VALIDATION_ERROR",
            ApiError::Conflict { .. } => "CONFLICT",
            ApiError::CsrfTokenMissing => "CSRF_TOKEN_MISSING",
            ApiError::CsrfTokenMismatch => "CSRF_TOKEN_MISMATCH",
            ApiError::CsrfTokenInvalid => "CSRF_TOKEN_INVALID",
            ApiError::CsrfSessionRequired => "CSRF_SESSION_REQUIRED",
            ApiError::ServerConfig { .. } => "SERVER_CONFIGURATION_ERROR",
            ApiError::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    /// Returns a user-friendly error message.
    ///
    /// This message is safe to show to end users in any environment and never
    /// exposes internal implementation details.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::NotFound { resource } => format!("{} not found", resource),
            ApiError::BadRequest { message } => message.clone(),
            ApiError::Unauthorized { .. } => "Authentication required".to_string(),
            ApiError::Forbidden { message } => message.clone(),
            ApiError::PayloadTooLarge => "Request size exceeds maximum allowed limit".to_string(),
            ApiError::UnsupportedMediaType => "Content type not supported".to_string(),
            ApiError::Validation { .. } => "Invalid input data".to_string(),
            ApiError::Conflict { message } => message.clone(),
            ApiError::CsrfTokenMissing => "CSRF token missing".to_string(),
            ApiError::CsrfTokenMismatch => "CSRF token mismatch".to_string(),
            ApiError::CsrfTokenInvalid => "Invalid or expired CSRF token".to_string(),
            ApiError::CsrfSessionRequired => "Session required for CSRF protection".to_string(),
            ApiError::ServerConfig { .. } => "Authentication service unavailable".to_string(),
            ApiError::Internal { .. } => "An unexpected error occurred".to_string(),
        }
    }

    /// Returns `true` if this error should be logged at error level.
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            ApiError::Internal { .. } | ApiError::ServerConfig { .. }
        )
    }

    /// Returns `true` if this is one of the CSRF protocol failures.
    pub fn is_csrf_error(&self) -> bool {
        matches!(
            self,
            ApiError::CsrfTokenMissing
                | ApiError::CsrfTokenMismatch
                | ApiError::CsrfTokenInvalid
                | ApiError::CsrfSessionRequired
        )
    }
}

// =============================================================================
// ErrorSource
// =============================================================================

/// Snapshot of an [`ApiError`] carried in response extensions.
///
/// Every error response produced inside the middleware stack carries one of
/// these so the outermost sanitization layer can render the environment-aware
/// body without re-deriving anything from the serialized response.
#[derive(Debug, Clone)]
pub struct ErrorSource {
    /// Stable machine-readable code.
    pub code: &'static str,
    /// HTTP status.
    pub status: StatusCode,
    /// Full internal error message (never sent to production clients).
    pub message: String,
    /// Safe per-variant message, usable in any environment.
    pub user_message: String,
    /// Field-level validation failures, if any.
    pub fields: Option<ValidationErrors>,
}

impl From<&ApiError> for ErrorSource {
    fn from(err: &ApiError) -> Self {
        let fields = match err {
            ApiError::Validation {
                errors: Some(errors),
                ..
            } => Some(errors.clone()),
            _ => None,
        };

        Self {
            code: err.error_code(),
            status: err.status_code(),
            message: err.to_string(),
            user_message: err.user_message(),
            fields,
        }
    }
}

// =============================================================================
// IntoResponse Implementation
// =============================================================================

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let source = ErrorSource::from(&self);
        let status = source.status;

        // Fallback body for contexts where the sanitization layer is not
        // installed (unit tests, bare routers). The layer rewrites this.
        let body = Json(serde_json::json!({
            "error": source.user_message,
            "code": source.code,
        }));

        let mut response = (status, body).into_response();
        response.extensions_mut().insert(Arc::new(source));
        response
    }
}

// =============================================================================
// Validation Errors
// =============================================================================

/// Collection of field validation errors.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ValidationErrors {
    /// Field-specific errors.
    pub fields: Vec<FieldError>,
}

impl ValidationErrors {
    /// Creates a new validation errors collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a field error.
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.fields.push(FieldError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Returns `true` if there are no errors.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Converts to an `ApiError` if there are errors.
    pub fn into_result(self) -> ApiResult<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(ApiError::validation_with_errors("Validation failed", self))
        }
    }
}

impl std::error::Error for ValidationErrors {}

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} validation errors", self.fields.len())
    }
}

/// A single field validation error.
///
/// Only the field name and a message are ever carried; the rejected value
/// itself is never captured.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldError {
    /// Field name.
    pub field: String,
    /// Error message.
    pub message: String,
}

// =============================================================================
// From Implementations
// =============================================================================

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::bad_request(format!("Invalid JSON: {}", err))
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        ApiError::internal(format!("IO error: {}", err))
    }
}

// =============================================================================
// Tests
// =============================================================================
