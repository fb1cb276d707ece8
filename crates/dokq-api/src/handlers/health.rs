// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Health check and fallback handlers.

use axum::{response::IntoResponse, Json};

use crate::error::ApiError;
use crate::response::HealthResponse;

/// GET /api/health
///
/// Liveness check. Public: the only route exempt from authentication.
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse::healthy())
}

/// Fallback for unknown routes.
pub async fn not_found() -> ApiError {
    ApiError::not_found("API endpoint")
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[tokio::test]
    async fn test_health_endpoint() {
        let response = health().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_not_found_envelope() {
        let response = not_found().await.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
