// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! API response types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Health
// =============================================================================

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Overall status.
    pub status: String,
    /// Human-readable service banner.
    pub message: String,
    /// Response time.
    pub timestamp: DateTime<Utc>,
    /// Version string.
    pub version: String,
}

impl HealthResponse {
    /// Creates a healthy response.
    pub fn healthy() -> Self {
        Self {
            status: "OK".to_string(),
            message: "DokQ PH API is running".to_string(),
            timestamp: Utc::now(),
            version: crate::VERSION.to_string(),
        }
    }
}

// =============================================================================
// CSRF Token Responses
// =============================================================================

/// Response body for token issuance.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CsrfTokenResponse {
    /// Whether issuance succeeded.
    pub success: bool,
    /// The issued token.
    pub csrf_token: String,
    /// Token expiry, epoch milliseconds.
    pub expiry: i64,
    /// Header the client must echo the token in.
    pub header_name: String,
    /// Cookie carrying the double-submit copy.
    pub cookie_name: String,
    /// Human-readable status message.
    pub message: String,
}

/// Response body for token refresh.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CsrfRefreshResponse {
    /// Whether the refresh call succeeded.
    pub success: bool,
    /// Whether a new token was issued.
    pub rotated: bool,
    /// The new token, present only when rotation occurred.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub csrf_token: Option<String>,
    /// New expiry, epoch milliseconds, present only when rotation occurred.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry: Option<i64>,
    /// Human-readable status message.
    pub message: String,
}

// =============================================================================
// Mutation Acknowledgement
// =============================================================================

/// Acknowledgement for successful mutations.
#[derive(Debug, Serialize, Deserialize)]
pub struct MutationResponse {
    /// Whether the operation succeeded.
    pub success: bool,
    /// Human-readable message.
    pub message: String,
    /// Response time.
    pub timestamp: DateTime<Utc>,
}

impl MutationResponse {
    /// Creates a success acknowledgement.
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
