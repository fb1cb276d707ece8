// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! CSRF validation middleware.

use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, Method, Request},
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use tower::{Layer, Service};

use super::{CsrfProtection, CSRF_BODY_FIELD, CSRF_COOKIE_NAME, CSRF_HEADER_NAME};
use crate::auth::ResolvedIdentity;
use crate::error::ApiError;

// =============================================================================
// Request Context Types
// =============================================================================

/// Transport-level session identifier, inserted by the deployment when a
/// session mechanism exists below the identity layer.
#[derive(Debug, Clone)]
pub struct TransportSession(pub String);

/// Validation metadata attached to the request after a successful check.
#[derive(Debug, Clone)]
pub struct CsrfValidated {
    /// The accepted token value.
    pub token: String,
    /// The session the token was validated under.
    pub session_id: String,
}

/// Derives the CSRF session identifier for a request.
///
/// Priority order: resolved identity subject, transport session id, then an
/// anonymous identifier from the caller's network address.
pub fn derive_session_id(
    identity: Option<&ResolvedIdentity>,
    transport: Option<&TransportSession>,
    client_ip: Option<IpAddr>,
) -> Option<String> {
    if let Some(identity) = identity {
        return Some(identity.subject.clone());
    }
    if let Some(TransportSession(session_id)) = transport {
        return Some(session_id.clone());
    }
    client_ip.map(|ip| format!("anonymous_{}", ip))
}

// =============================================================================
// CsrfLayer
// =============================================================================

/// Layer applying CSRF validation to mutating requests.
///
/// GET/HEAD/OPTIONS requests and an explicit path allow-list bypass
/// validation; everything else must present a token bound to the caller's
/// session.
#[derive(Clone)]
pub struct CsrfLayer {
    protection: Arc<CsrfProtection>,
    skip_paths: Arc<Vec<String>>,
    max_body_size: usize,
}

impl CsrfLayer {
    /// Creates a new layer over the given engine.
    pub fn new(protection: Arc<CsrfProtection>, max_body_size: usize) -> Self {
        Self {
            protection,
            skip_paths: Arc::new(Vec::new()),
            max_body_size,
        }
    }

    /// Sets the exempt path list. Matching is by substring, so a trailing
    /// slash (`/api/patient/`) exempts a whole subtree.
    pub fn with_skip_paths(mut self, paths: Vec<String>) -> Self {
        self.skip_paths = Arc::new(paths);
        self
    }

    /// Applies the platform's default exemptions: the token endpoints, the
    /// health check, and the read-only dashboard/status endpoints.
    pub fn with_default_skip_paths(self) -> Self {
        self.with_skip_paths(vec![
            "/api/auth/csrf-token".to_string(),
            "/api/health".to_string(),
            "/api/dashboard/stats".to_string(),
            "/api/surgery/queue".to_string(),
            "/api/or/status".to_string(),
            "/api/rural/patients".to_string(),
            "/api/analytics/wait-times".to_string(),
            "/api/patient/".to_string(),
        ])
    }
}

impl<S> Layer<S> for CsrfLayer {
    type Service = CsrfMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CsrfMiddleware {
            inner,
            protection: self.protection.clone(),
            skip_paths: self.skip_paths.clone(),
            max_body_size: self.max_body_size,
        }
    }
}

// =============================================================================
// CsrfMiddleware
// =============================================================================

/// Middleware enforcing the double-submit CSRF protocol.
#[derive(Clone)]
pub struct CsrfMiddleware<S> {
    inner: S,
    protection: Arc<CsrfProtection>,
    skip_paths: Arc<Vec<String>>,
    max_body_size: usize,
}

impl<S> CsrfMiddleware<S> {
    fn is_exempt(&self, method: &Method, path: &str) -> bool {
        if matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS) {
            return true;
        }
        self.skip_paths.iter().any(|p| path.contains(p.as_str()))
    }
}

impl<S> Service<Request<Body>> for CsrfMiddleware<S>
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
        let exempt = self.is_exempt(req.method(), req.uri().path());
        let protection = self.protection.clone();
        let max_body_size = self.max_body_size;
        let mut inner = self.inner.clone();

        Box::pin(async move {
            if exempt {
                return inner.call(req).await;
            }

            let method = req.method().clone();
            let path = req.uri().path().to_string();

            let identity = req.extensions().get::<ResolvedIdentity>().cloned();
            let transport = req.extensions().get::<TransportSession>().cloned();
            let client_ip = req
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ci| ci.0.ip());

            let Some(session_id) =
                derive_session_id(identity.as_ref(), transport.as_ref(), client_ip)
            else {
                tracing::warn!(%method, %path, "CSRF check without derivable session");
                return Ok(ApiError::CsrfSessionRequired.into_response());
            };

            let header_token = req
                .headers()
                .get(CSRF_HEADER_NAME)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let cookie_token = CookieJar::from_headers(req.headers())
                .get(CSRF_COOKIE_NAME)
                .map(|c| c.value().to_string());

            // Fall back to the `_csrf` body field only when the header is
            // absent; this is the one place the core buffers a request body.
            let (candidate, req) = if header_token.is_some() {
                (header_token, req)
            } else {
                match extract_body_token(req, max_body_size).await {
                    Ok(pair) => pair,
                    Err(err) => return Ok(err.into_response()),
                }
            };

            match protection.validate(candidate.as_deref(), cookie_token.as_deref(), &session_id) {
                Ok(token) => {
                    let mut req = req;
                    req.extensions_mut().insert(CsrfValidated { token, session_id });
                    inner.call(req).await
                }
                Err(err) => {
                    tracing::warn!(
                        %method,
                        %path,
                        code = err.error_code(),
                        "CSRF validation failed"
                    );
                    Ok(err.into_response())
                }
            }
        })
    }
}

/// Buffers the request body and extracts the `_csrf` field from JSON or
/// form-encoded payloads, returning the reassembled request.
async fn extract_body_token(
    req: Request<Body>,
    limit: usize,
) -> Result<(Option<String>, Request<Body>), ApiError> {
    let content_type = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();

    let (parts, body) = req.into_parts();
    let bytes = axum::body::to_bytes(body, limit)
        .await
        .map_err(|_| ApiError::PayloadTooLarge)?;

    let token = if content_type.contains("application/json") {
        serde_json::from_slice::<serde_json::Value>(&bytes)
            .ok()
            .and_then(|value| {
                value
                    .get(CSRF_BODY_FIELD)
                    .and_then(|t| t.as_str())
                    .map(str::to_string)
            })
    } else if content_type.contains("application/x-www-form-urlencoded") {
        serde_urlencoded::from_bytes::<Vec<(String, String)>>(&bytes)
            .ok()
            .and_then(|pairs| {
                pairs
                    .into_iter()
                    .find(|(key, _)| key == CSRF_BODY_FIELD)
                    .map(|(_, value)| value)
            })
    } else {
        None
    };

    Ok((token, Request::from_parts(parts, Body::from(bytes))))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Claims, Role};
    use crate::csrf::CsrfConfig;
    use axum::http::StatusCode;
    use tower::ServiceExt;

    fn mock_ok() -> impl Service<
        Request<Body>,
        Response = Response,
        Error = std::convert::Infallible,
        Future = impl Future<Output = Result<Response, std::convert::Infallible>> + Send,
    > + Clone
           + Send {
        tower::service_fn(|_req: Request<Body>| async {
            Ok::<_, std::convert::Infallible>(Response::new(Body::empty()))
        })
    }

    fn identity(subject: &str) -> ResolvedIdentity {
        ResolvedIdentity::from_claims(Claims::new(subject, Some(Role::Doctor), 3600))
    }

    fn layer(protection: Arc<CsrfProtection>) -> CsrfLayer {
        CsrfLayer::new(protection, 10 * 1024 * 1024).with_default_skip_paths()
    }

    #[test]
    fn test_derive_session_id_priority() {
        let id = identity("user-1");
        let transport = TransportSession("sess-9".to_string());
        let ip: IpAddr = "198.51.100.4".parse().unwrap();

        assert_eq!(
            derive_session_id(Some(&id), Some(&transport), Some(ip)),
            Some("user-1".to_string())
        );
        assert_eq!(
            derive_session_id(None, Some(&transport), Some(ip)),
            Some("sess-9".to_string())
        );
        assert_eq!(
            derive_session_id(None, None, Some(ip)),
            Some("anonymous_198.51.100.4".to_string())
        );
        assert_eq!(derive_session_id(None, None, None), None);
    }

    #[tokio::test]
    async fn test_get_requests_bypass() {
        let protection = Arc::new(CsrfProtection::new(CsrfConfig::default()));
        let mut service = layer(protection).layer(mock_ok());

        let req = Request::builder()
            .method(Method::GET)
            .uri("/api/or/optimize")
            .body(Body::empty())
            .unwrap();

        let response = service.ready().await.unwrap().call(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_exempt_path_bypasses() {
        let protection = Arc::new(CsrfProtection::new(CsrfConfig::default()));
        let mut service = layer(protection).layer(mock_ok());

        let req = Request::builder()
            .method(Method::POST)
            .uri("/api/auth/csrf-token/refresh")
            .body(Body::empty())
            .unwrap();

        let response = service.ready().await.unwrap().call(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_missing_token_forbidden() {
        let protection = Arc::new(CsrfProtection::new(CsrfConfig::default()));
        let mut service = layer(protection).layer(mock_ok());

        let mut req = Request::builder()
            .method(Method::POST)
            .uri("/api/or/optimize")
            .body(Body::empty())
            .unwrap();
        req.extensions_mut().insert(identity("user-1"));

        let response = service.ready().await.unwrap().call(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_no_session_unauthorized() {
        let protection = Arc::new(CsrfProtection::new(CsrfConfig::default()));
        let mut service = layer(protection).layer(mock_ok());

        let req = Request::builder()
            .method(Method::POST)
            .uri("/api/or/optimize")
            .body(Body::empty())
            .unwrap();

        let response = service.ready().await.unwrap().call(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_header_token_accepted() {
        let protection = Arc::new(CsrfProtection::new(CsrfConfig::default()));
        let issued = protection.issue("user-1");
        let mut service = layer(protection).layer(mock_ok());

        let mut req = Request::builder()
            .method(Method::POST)
            .uri("/api/or/optimize")
            .header(CSRF_HEADER_NAME, &issued.token)
            .body(Body::empty())
            .unwrap();
        req.extensions_mut().insert(identity("user-1"));

        let response = service.ready().await.unwrap().call(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_body_field_accepted() {
        let protection = Arc::new(CsrfProtection::new(CsrfConfig::default()));
        let issued = protection.issue("user-1");
        let mut service = layer(protection).layer(mock_ok());

        let body = serde_json::json!({ "_csrf": issued.token, "note": "x" }).to_string();
        let mut req = Request::builder()
            .method(Method::POST)
            .uri("/api/or/optimize")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .unwrap();
        req.extensions_mut().insert(identity("user-1"));

        let response = service.ready().await.unwrap().call(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_cookie_mismatch_rejected() {
        let protection = Arc::new(CsrfProtection::new(CsrfConfig::default()));
        let issued = protection.issue("user-1");
        let mut service = layer(protection).layer(mock_ok());

        let mut req = Request::builder()
            .method(Method::POST)
            .uri("/api/or/optimize")
            .header(CSRF_HEADER_NAME, &issued.token)
            .header(header::COOKIE, format!("{}=different-value", CSRF_COOKIE_NAME))
            .body(Body::empty())
            .unwrap();
        req.extensions_mut().insert(identity("user-1"));

        let response = service.ready().await.unwrap().call(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_foreign_session_token_rejected() {
        let protection = Arc::new(CsrfProtection::new(CsrfConfig::default()));
        let issued = protection.issue("someone-else");
        let mut service = layer(protection).layer(mock_ok());

        let mut req = Request::builder()
            .method(Method::POST)
            .uri("/api/or/optimize")
            .header(CSRF_HEADER_NAME, &issued.token)
            .body(Body::empty())
            .unwrap();
        req.extensions_mut().insert(identity("user-1"));

        let response = service.ready().await.unwrap().call(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
