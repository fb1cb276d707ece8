// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Bearer authentication middleware.

use std::collections::HashSet;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, Request},
    response::{IntoResponse, Response},
};
use tower::{Layer, Service};
use uuid::Uuid;

use crate::auth::{ResolvedIdentity, VerifierChain};
use crate::error::ApiError;

// =============================================================================
// AuthLayer
// =============================================================================

/// Layer for bearer authentication.
///
/// Extracts the token from the Authorization header and resolves it through
/// the configured verifier chain. On success a [`ResolvedIdentity`] is
/// attached to the request; public paths pass through without one.
#[derive(Clone)]
pub struct AuthLayer {
    chain: Arc<VerifierChain>,
    public_paths: Arc<HashSet<String>>,
}

impl AuthLayer {
    /// Creates a new auth layer over the verifier chain.
    pub fn new(chain: Arc<VerifierChain>) -> Self {
        Self {
            chain,
            public_paths: Arc::new(HashSet::new()),
        }
    }

    /// Adds public paths that don't require authentication. A trailing `*`
    /// makes an entry a prefix match.
    pub fn with_public_paths(mut self, paths: Vec<String>) -> Self {
        self.public_paths = Arc::new(paths.into_iter().collect());
        self
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthMiddleware {
            inner,
            chain: self.chain.clone(),
            public_paths: self.public_paths.clone(),
        }
    }
}

// =============================================================================
// AuthMiddleware
// =============================================================================

/// Middleware for bearer authentication.
#[derive(Clone)]
pub struct AuthMiddleware<S> {
    inner: S,
    chain: Arc<VerifierChain>,
    public_paths: Arc<HashSet<String>>,
}

impl<S> AuthMiddleware<S> {
    /// Checks if a path is public.
    fn is_public_path(&self, path: &str) -> bool {
        if self.public_paths.contains(path) {
            return true;
        }

        for public_path in self.public_paths.iter() {
            if let Some(prefix) = public_path.strip_suffix('*') {
                if path.starts_with(prefix) {
                    return true;
                }
            }
        }

        false
    }
}

impl<S> Service<Request<Body>> for AuthMiddleware<S>
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

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let chain = self.chain.clone();
        let is_public = self.is_public_path(req.uri().path());
        let mut inner = self.inner.clone();

        Box::pin(async move {
            if is_public {
                return inner.call(req).await;
            }

            let request_id = Uuid::now_v7();
            let client_ip = req
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ci| ci.0.ip());

            let Some(token) = extract_bearer_token(&req) else {
                tracing::debug!("No valid authorization token provided");
                return Ok(ApiError::unauthorized("No valid authorization token provided")
                    .into_response());
            };

            let claims = match chain.verify(&token) {
                Ok(claims) => claims,
                Err(err) => {
                    tracing::debug!(
                        strategy = chain.active(),
                        code = err.error_code(),
                        "Credential verification failed"
                    );
                    return Ok(err.into_response());
                }
            };

            let mut identity = ResolvedIdentity::from_claims(claims).with_request_id(request_id);
            if let Some(ip) = client_ip {
                identity = identity.with_client_ip(ip);
            }

            req.extensions_mut().insert(identity);
            inner.call(req).await
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Extracts the bearer token from the Authorization header.
fn extract_bearer_token<B>(req: &Request<B>) -> Option<String> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer ").map(|s| s.to_string()))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{JwtManager, Role};
    use crate::config::{AuthConfig, LocalTokenConfig};
    use axum::http::StatusCode;
    use tower::ServiceExt;

    const TEST_SECRET: &str = "test-secret-key-that-is-long-enough-for-testing";

    fn test_chain() -> Arc<VerifierChain> {
        let config = AuthConfig {
            identity_platform: None,
            local_token: Some(LocalTokenConfig::new(TEST_SECRET)),
            shared_secret: None,
        };
        Arc::new(VerifierChain::from_config(&config).unwrap())
    }

    fn mock_ok() -> impl Service<
        Request<Body>,
        Response = Response,
        Error = std::convert::Infallible,
        Future = impl Future<Output = Result<Response, std::convert::Infallible>> + Send,
    > + Clone
           + Send {
        tower::service_fn(|req: Request<Body>| async move {
            // Echo whether an identity was attached
            let status = if req.extensions().get::<ResolvedIdentity>().is_some() {
                StatusCode::OK
            } else {
                StatusCode::NO_CONTENT
            };
            let mut response = Response::new(Body::empty());
            *response.status_mut() = status;
            Ok::<_, std::convert::Infallible>(response)
        })
    }

    #[test]
    fn test_extract_bearer_token() {
        use axum::http::HeaderValue;

        let mut req = Request::builder().uri("/test").body(Body::empty()).unwrap();

        assert!(extract_bearer_token(&req).is_none());

        req.headers_mut()
            .insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(extract_bearer_token(&req).is_none());

        req.headers_mut().insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer mytoken123"),
        );
        assert_eq!(extract_bearer_token(&req), Some("mytoken123".to_string()));
    }

    #[tokio::test]
    async fn test_missing_header_unauthorized() {
        let mut service = AuthLayer::new(test_chain()).layer(mock_ok());

        let req = Request::builder()
            .uri("/api/dashboard/stats")
            .body(Body::empty())
            .unwrap();

        let response = service.ready().await.unwrap().call(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_invalid_token_unauthorized() {
        let mut service = AuthLayer::new(test_chain()).layer(mock_ok());

        let req = Request::builder()
            .uri("/api/dashboard/stats")
            .header(header::AUTHORIZATION, "Bearer not.a.real.token")
            .body(Body::empty())
            .unwrap();

        let response = service.ready().await.unwrap().call(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_valid_token_attaches_identity() {
        let manager = JwtManager::new(LocalTokenConfig::new(TEST_SECRET)).unwrap();
        let token = manager.create_access_token("user-1", Role::Doctor).unwrap();

        let mut service = AuthLayer::new(test_chain()).layer(mock_ok());

        let req = Request::builder()
            .uri("/api/dashboard/stats")
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap();

        let response = service.ready().await.unwrap().call(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_public_path_skips_auth() {
        let layer = AuthLayer::new(test_chain())
            .with_public_paths(vec!["/api/health".to_string(), "/docs/*".to_string()]);
        let mut service = layer.layer(mock_ok());

        let req = Request::builder()
            .uri("/api/health")
            .body(Body::empty())
            .unwrap();
        let response = service.ready().await.unwrap().call(req).await.unwrap();
        // Passed through with no identity attached
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let req = Request::builder()
            .uri("/docs/openapi.json")
            .body(Body::empty())
            .unwrap();
        let response = service.ready().await.unwrap().call(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_misconfigured_secret_is_server_error() {
        let chain = Arc::new(VerifierChain::from_config(&AuthConfig::default()).unwrap());
        let mut service = AuthLayer::new(chain).layer(mock_ok());

        let req = Request::builder()
            .uri("/api/dashboard/stats")
            .header(header::AUTHORIZATION, "Bearer some.token.value")
            .body(Body::empty())
            .unwrap();

        let response = service.ready().await.unwrap().call(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
