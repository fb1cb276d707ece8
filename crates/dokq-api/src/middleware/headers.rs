// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Security response headers.
//!
//! Applies the platform's fixed hardening headers to every response, plus
//! cache-defeating headers on API paths so clinical data is never cached by
//! intermediaries.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::{
    body::Body,
    http::{header, HeaderValue, Request},
    response::Response,
};
use tower::{Layer, Service};

/// Fixed content security policy.
const CONTENT_SECURITY_POLICY: &str = "default-src 'self'; \
    style-src 'self' https://fonts.googleapis.com https://cdnjs.cloudflare.com; \
    font-src 'self' https://fonts.gstatic.com https://cdnjs.cloudflare.com; \
    script-src 'self' https://cdn.jsdelivr.net https://apis.google.com https://www.gstatic.com; \
    img-src 'self' data: https:; \
    object-src 'none'; \
    frame-ancestors 'none'; \
    base-uri 'self'; \
    form-action 'self'";

// =============================================================================
// SecurityHeadersLayer
// =============================================================================

/// Layer applying the hardening headers.
#[derive(Clone, Default)]
pub struct SecurityHeadersLayer;

impl SecurityHeadersLayer {
    /// Creates the layer.
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for SecurityHeadersLayer {
    type Service = SecurityHeaders<S>;

    fn layer(&self, inner: S) -> Self::Service {
        SecurityHeaders { inner }
    }
}

/// Middleware applying the hardening headers.
#[derive(Clone)]
pub struct SecurityHeaders<S> {
    inner: S,
}

impl<S> Service<Request<Body>> for SecurityHeaders<S>
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
        let is_api_path = req.uri().path().contains("/api/");
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let mut response = inner.call(req).await?;
            let headers = response.headers_mut();

            headers.insert(
                header::X_CONTENT_TYPE_OPTIONS,
                HeaderValue::from_static("nosniff"),
            );
            headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
            headers.insert(
                header::STRICT_TRANSPORT_SECURITY,
                HeaderValue::from_static("max-age=31536000; includeSubDomains; preload"),
            );
            headers.insert(
                header::REFERRER_POLICY,
                HeaderValue::from_static("strict-origin-when-cross-origin"),
            );
            headers.insert(
                header::CONTENT_SECURITY_POLICY,
                HeaderValue::from_static(CONTENT_SECURITY_POLICY),
            );
            headers.insert(
                "x-download-options",
                HeaderValue::from_static("noopen"),
            );
            headers.insert(
                "x-permitted-cross-domain-policies",
                HeaderValue::from_static("none"),
            );
            headers.insert(
                "permissions-policy",
                HeaderValue::from_static(
                    "geolocation=(), microphone=(), camera=(), payment=(), usb=()",
                ),
            );

            if is_api_path {
                headers.insert(
                    header::CACHE_CONTROL,
                    HeaderValue::from_static("no-store, no-cache, must-revalidate, proxy-revalidate"),
                );
                headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
                headers.insert(header::EXPIRES, HeaderValue::from_static("0"));
                headers.insert("surrogate-control", HeaderValue::from_static("no-store"));
            }

            Ok(response)
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
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

    #[tokio::test]
    async fn test_hardening_headers_present() {
        let mut service = SecurityHeadersLayer::new().layer(mock_ok());

        let req = Request::builder().uri("/").body(Body::empty()).unwrap();
        let response = service.ready().await.unwrap().call(req).await.unwrap();

        let headers = response.headers();
        assert_eq!(headers.get(header::X_CONTENT_TYPE_OPTIONS).unwrap(), "nosniff");
        assert_eq!(headers.get(header::X_FRAME_OPTIONS).unwrap(), "DENY");
        assert!(headers.contains_key(header::STRICT_TRANSPORT_SECURITY));
        assert!(headers.contains_key(header::CONTENT_SECURITY_POLICY));
        assert!(headers.contains_key("permissions-policy"));
        // Not an API path: no cache-defeating headers
        assert!(!headers.contains_key(header::CACHE_CONTROL));
    }

    #[tokio::test]
    async fn test_api_paths_never_cached() {
        let mut service = SecurityHeadersLayer::new().layer(mock_ok());

        let req = Request::builder()
            .uri("/api/patient/p1")
            .body(Body::empty())
            .unwrap();
        let response = service.ready().await.unwrap().call(req).await.unwrap();

        let headers = response.headers();
        assert_eq!(
            headers.get(header::CACHE_CONTROL).unwrap(),
            "no-store, no-cache, must-revalidate, proxy-revalidate"
        );
        assert_eq!(headers.get(header::PRAGMA).unwrap(), "no-cache");
        assert_eq!(headers.get("surrogate-control").unwrap(), "no-store");
    }
}
