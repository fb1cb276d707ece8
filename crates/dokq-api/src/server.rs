// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! API server implementation.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::{HeaderName, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::info;

use crate::auth::Role;
use crate::config::ApiConfig;
use crate::csrf::CsrfLayer;
use crate::error::ApiResult;
use crate::handlers;
use crate::middleware::{AuthLayer, RequestGuardLayer, RequireRole, SecurityHeadersLayer};
use crate::sanitizer::SanitizeErrorLayer;
use crate::state::AppState;

// =============================================================================
// ApiServer
// =============================================================================

/// The API server.
///
/// Assembles the security pipeline around the route handlers. Stage order per
/// request: sanitization gate (with origin policy) → CORS → authentication →
/// CSRF validation → role authorization → handler, with the error sanitizer
/// wrapped around everything as the terminal failure handler.
pub struct ApiServer {
    state: AppState,
    config: Arc<ApiConfig>,
}

impl ApiServer {
    /// Creates a new API server with the given state.
    pub fn new(state: AppState) -> Self {
        let config = state.config.clone();
        Self { state, config }
    }

    /// Creates the router with all routes and middleware.
    pub fn router(&self) -> Router {
        let auth = AuthLayer::new(self.state.verifiers.clone());
        let csrf = CsrfLayer::new(self.state.csrf.clone(), self.config.max_body_size)
            .with_default_skip_paths();

        // Authenticated routes. Role lists are the per-route protection
        // descriptors; an absent layer means any authenticated identity.
        let protected = Router::new()
            .route("/api/auth/csrf-token", get(handlers::issue_csrf_token))
            .route(
                "/api/auth/csrf-token/refresh",
                post(handlers::refresh_csrf_token),
            )
            .route(
                "/api/dashboard/stats",
                get(handlers::dashboard_stats)
                    .layer(RequireRole::any(&[Role::Admin, Role::Doctor, Role::Nurse])),
            )
            .route(
                "/api/surgery/queue",
                get(handlers::surgery_queue)
                    .layer(RequireRole::any(&[Role::Admin, Role::Doctor])),
            )
            .route(
                "/api/or/status",
                get(handlers::or_status).layer(RequireRole::any(&[
                    Role::Admin,
                    Role::Doctor,
                    Role::Nurse,
                    Role::ClinicStaff,
                ])),
            )
            .route(
                "/api/or/optimize",
                post(handlers::optimize_or)
                    .layer(RequireRole::any(&[Role::Admin, Role::ClinicStaff])),
            )
            .route(
                "/api/ai/consultation",
                post(handlers::ai_consultation).layer(RequireRole::any(&[
                    Role::Admin,
                    Role::Doctor,
                    Role::Nurse,
                    Role::Patient,
                ])),
            )
            .route(
                "/api/patient/{id}",
                get(handlers::get_patient).layer(RequireRole::any(&[
                    Role::Admin,
                    Role::Doctor,
                    Role::Nurse,
                    Role::Patient,
                ])),
            )
            .route(
                "/api/analytics/wait-times",
                get(handlers::wait_time_analytics).layer(RequireRole::any(&[
                    Role::Admin,
                    Role::Doctor,
                    Role::OrganizationAdmin,
                ])),
            )
            .route(
                "/api/patient",
                post(handlers::create_patient)
                    .layer(RequireRole::any(&[Role::Admin, Role::Doctor, Role::Nurse])),
            )
            .layer(csrf)
            .layer(auth);

        // Outermost first. The sanitizer sits outside every stage that can
        // fail, so all rejections pass through it; hardening headers go on
        // after sanitization; the guard runs before CORS decoration and
        // before body parsing.
        let middleware_stack = ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CompressionLayer::new())
            .layer(SecurityHeadersLayer::new())
            .layer(SanitizeErrorLayer::new(self.state.sanitizer.clone()))
            .layer(TimeoutLayer::new(self.config.request_timeout))
            .layer(RequestGuardLayer::new(self.config.clone()))
            .layer(create_cors_layer(&self.config));

        Router::new()
            .route("/api/health", get(handlers::health))
            .merge(protected)
            .fallback(handlers::not_found)
            .layer(middleware_stack)
            .with_state(self.state.clone())
    }

    /// Runs the server.
    pub async fn run(self) -> ApiResult<()> {
        let addr = self.config.socket_addr();
        let router = self.router();
        let _sweeper = self.state.csrf.start_sweeper();

        info!(environment = ?self.config.environment, "Starting API server on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| crate::error::ApiError::internal(format!("Failed to bind: {}", e)))?;

        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .map_err(|e| crate::error::ApiError::internal(format!("Server error: {}", e)))?;

        Ok(())
    }

    /// Runs the server with graceful shutdown.
    ///
    /// The CSRF expiry sweeper is owned by this call and stops with it.
    pub async fn run_with_shutdown(
        self,
        shutdown_signal: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> ApiResult<()> {
        let addr = self.config.socket_addr();
        let router = self.router();
        let _sweeper = self.state.csrf.start_sweeper();

        info!(environment = ?self.config.environment, "Starting API server on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| crate::error::ApiError::internal(format!("Failed to bind: {}", e)))?;

        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal)
        .await
        .map_err(|e| crate::error::ApiError::internal(format!("Server error: {}", e)))?;

        info!("API server shutdown complete");

        Ok(())
    }

    /// Returns the server address.
    pub fn addr(&self) -> SocketAddr {
        self.config.socket_addr()
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Creates the CORS layer from configuration.
///
/// Only decorates responses for allowed origins; enforcement of the
/// allow-list itself happens earlier, in the sanitization gate.
fn create_cors_layer(config: &ApiConfig) -> CorsLayer {
    let cors = &config.cors;

    let origins: Vec<HeaderValue> = cors
        .allowed_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    let methods: Vec<Method> = cors
        .allowed_methods
        .iter()
        .filter_map(|m| m.parse().ok())
        .collect();

    let headers: Vec<HeaderName> = cors
        .allowed_headers
        .iter()
        .filter_map(|h| h.parse().ok())
        .collect();

    let exposed: Vec<HeaderName> = cors
        .exposed_headers
        .iter()
        .filter_map(|h| h.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(methods)
        .allow_headers(headers)
        .expose_headers(exposed)
        .allow_credentials(cors.allow_credentials)
        .max_age(Duration::from_secs(cors.max_age))
}

// =============================================================================
// Tests
// =============================================================================
