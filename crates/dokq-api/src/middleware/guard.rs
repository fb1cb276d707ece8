// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Request sanitization gate.
//!
//! The first pipeline stage: rejects malformed or probe-like requests before
//! any expensive work runs. Checks, in order:
//!
//! 1. Declared content length against the body ceiling
//! 2. Content type of mutating requests against a fixed allow-list
//! 3. User-Agent against known scanner signatures
//! 4. Spoofable trust headers against the canonical host
//! 5. The Origin header against the configured allow-list
//!
//! It also runs the injection-signature scan over query values, header
//! values, and the string leaves of mutating JSON/form bodies. Detection is
//! telemetry only: matches are logged and tagged on the request, which then
//! proceeds.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::task::{Context, Poll};

use axum::{
    body::Body,
    http::{header, Method, Request},
    response::{IntoResponse, Response},
};
use regex::Regex;
use tower::{Layer, Service};

use crate::config::ApiConfig;
use crate::error::ApiError;

// =============================================================================
// Pattern Sets
// =============================================================================

/// Content types accepted on mutating requests.
const ALLOWED_CONTENT_TYPES: [&str; 3] = [
    "application/json",
    "application/x-www-form-urlencoded",
    "multipart/form-data",
];

/// Trust headers a client can spoof to confuse upstream proxies.
const SPOOFABLE_HEADERS: [&str; 2] = ["x-forwarded-host", "x-real-ip"];

fn scanner_agent_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)(sqlmap|nikto|nessus|masscan|nmap|scanner|burp|zap)").unwrap()
    })
}

/// Injection signature classes scanned for across query, headers, and body.
fn injection_patterns() -> &'static [(&'static str, Regex)] {
    static PATTERNS: OnceLock<Vec<(&'static str, Regex)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        vec![
            (
                "sql",
                Regex::new(r"(?i)(union|select|insert|delete|drop|update|exec|script)").unwrap(),
            ),
            (
                "markup",
                Regex::new(r"(?i)(<script|javascript:|on\w+\s*=|vbscript:)").unwrap(),
            ),
            ("path-traversal", Regex::new(r"(\.\./|\.\.\\)").unwrap()),
            ("shell", Regex::new(r"(;|&&|\|\|)").unwrap()),
            ("template", Regex::new(r"(\$\{|\{\{|\[\[)").unwrap()),
        ]
    })
}

/// Returns the signature class matching the value, if any.
fn match_injection(value: &str) -> Option<&'static str> {
    injection_patterns()
        .iter()
        .find(|(_, pattern)| pattern.is_match(value))
        .map(|(class, _)| *class)
}

/// Marker attached to requests whose content matched an injection signature.
#[derive(Debug, Clone, Default)]
pub struct InjectionFlags {
    /// `(source, signature class)` pairs, e.g. `("query", "sql")`.
    pub matches: Vec<(String, &'static str)>,
}

// =============================================================================
// RequestGuardLayer
// =============================================================================

/// Layer installing the sanitization gate.
#[derive(Clone)]
pub struct RequestGuardLayer {
    config: Arc<ApiConfig>,
}

impl RequestGuardLayer {
    /// Creates the gate over the server configuration.
    pub fn new(config: Arc<ApiConfig>) -> Self {
        Self { config }
    }
}

impl<S> Layer<S> for RequestGuardLayer {
    type Service = RequestGuard<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestGuard {
            inner,
            config: self.config.clone(),
        }
    }
}

// =============================================================================
// RequestGuard
// =============================================================================

/// Middleware performing the gate checks.
#[derive(Clone)]
pub struct RequestGuard<S> {
    inner: S,
    config: Arc<ApiConfig>,
}

impl<S> RequestGuard<S> {
    /// Runs the rejecting checks against the request head.
    ///
    /// Any rejection is terminal for the request.
    fn check<B>(&self, req: &Request<B>) -> Result<(), ApiError> {
        // 1. Declared size ceiling
        if let Some(length) = req
            .headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok())
        {
            if length > self.config.max_body_size {
                return Err(ApiError::PayloadTooLarge);
            }
        }

        // 2. Content type allow-list on mutating methods
        if matches!(*req.method(), Method::POST | Method::PUT | Method::PATCH) {
            if let Some(content_type) = req
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
            {
                let lower = content_type.to_ascii_lowercase();
                if !ALLOWED_CONTENT_TYPES.iter().any(|ct| lower.contains(ct)) {
                    return Err(ApiError::UnsupportedMediaType);
                }
            }
        }

        // 3. Scanner user agents
        if let Some(agent) = req
            .headers()
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
        {
            if scanner_agent_pattern().is_match(agent) {
                tracing::warn!(user_agent = agent, "Blocked scanner user agent");
                return Err(ApiError::forbidden("Request blocked"));
            }
        }

        // 4. Spoofable trust headers must agree with the canonical host
        let host = req.headers().get(header::HOST).and_then(|v| v.to_str().ok());
        for name in SPOOFABLE_HEADERS {
            if let Some(value) = req.headers().get(name).and_then(|v| v.to_str().ok()) {
                if Some(value) != host {
                    tracing::warn!(header = name, "Trust header disagrees with host");
                    return Err(ApiError::forbidden("Invalid request headers"));
                }
            }
        }

        // 5. Origin allow-list. Requests without an Origin header (same
        // origin, non-browser) pass. The rejection is deliberately opaque:
        // it surfaces as a generic server error, not a structured CORS deny.
        if let Some(origin) = req
            .headers()
            .get(header::ORIGIN)
            .and_then(|v| v.to_str().ok())
        {
            if !self.config.cors.is_origin_allowed(origin) {
                tracing::warn!(origin, "Origin not allowed");
                return Err(ApiError::internal("Not allowed by CORS"));
            }
        }

        Ok(())
    }

    /// Scans query and header values for injection signatures.
    fn scan_head<B>(&self, req: &Request<B>, flags: &mut InjectionFlags) {
        if let Some(query) = req.uri().query() {
            if let Ok(pairs) = serde_urlencoded::from_str::<Vec<(String, String)>>(query) {
                for (key, value) in &pairs {
                    if let Some(class) = match_injection(value) {
                        flags.matches.push((format!("query.{}", key), class));
                    }
                }
            }
        }

        for (name, value) in req.headers() {
            if let Ok(value) = value.to_str() {
                if let Some(class) = match_injection(value) {
                    flags.matches.push((format!("header.{}", name), class));
                }
            }
        }
    }
}

impl<S> Service<Request<Body>> for RequestGuard<S>
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
        let checked = self.check(&req);

        let mut flags = InjectionFlags::default();
        self.scan_head(&req, &mut flags);

        let max_body_size = self.config.max_body_size;
        let mut inner = self.inner.clone();

        Box::pin(async move {
            if let Err(err) = checked {
                return Ok(err.into_response());
            }

            let mut req = req;

            // Body scan for mutating structured payloads. The body is
            // buffered (bounded by the size ceiling) and reattached intact.
            if matches!(*req.method(), Method::POST | Method::PUT | Method::PATCH) {
                let content_type = req
                    .headers()
                    .get(header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_ascii_lowercase();

                if content_type.contains("application/json")
                    || content_type.contains("application/x-www-form-urlencoded")
                {
                    let (parts, body) = req.into_parts();
                    let bytes = match axum::body::to_bytes(body, max_body_size).await {
                        Ok(bytes) => bytes,
                        Err(_) => return Ok(ApiError::PayloadTooLarge.into_response()),
                    };

                    scan_body(&bytes, &content_type, &mut flags);
                    req = Request::from_parts(parts, Body::from(bytes));
                }
            }

            if !flags.matches.is_empty() {
                tracing::warn!(
                    matches = ?flags.matches,
                    method = %req.method(),
                    path = req.uri().path(),
                    "Injection signature detected"
                );
                req.extensions_mut().insert(flags);
            }

            inner.call(req).await
        })
    }
}

/// Scans the string leaves of a buffered body.
fn scan_body(bytes: &[u8], content_type: &str, flags: &mut InjectionFlags) {
    if content_type.contains("application/json") {
        if let Ok(value) = serde_json::from_slice::<serde_json::Value>(bytes) {
            scan_json_value(&value, "body", flags);
        }
    } else if let Ok(pairs) = serde_urlencoded::from_bytes::<Vec<(String, String)>>(bytes) {
        for (key, value) in &pairs {
            if let Some(class) = match_injection(value) {
                flags.matches.push((format!("body.{}", key), class));
            }
        }
    }
}

/// Recursively walks a JSON value, scanning every string leaf.
fn scan_json_value(value: &serde_json::Value, path: &str, flags: &mut InjectionFlags) {
    match value {
        serde_json::Value::String(s) => {
            if let Some(class) = match_injection(s) {
                flags.matches.push((path.to_string(), class));
            }
        }
        serde_json::Value::Object(map) => {
            for (key, nested) in map {
                scan_json_value(nested, &format!("{}.{}", path, key), flags);
            }
        }
        serde_json::Value::Array(items) => {
            for (index, nested) in items.iter().enumerate() {
                scan_json_value(nested, &format!("{}[{}]", path, index), flags);
            }
        }
        _ => {}
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CorsConfig, Environment};
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

    fn guard() -> RequestGuardLayer {
        RequestGuardLayer::new(Arc::new(ApiConfig::default()))
    }

    async fn run(req: Request<Body>) -> Response {
        let mut service = guard().layer(mock_ok());
        service.ready().await.unwrap().call(req).await.unwrap()
    }

    #[tokio::test]
    async fn test_oversized_declared_length_rejected() {
        let req = Request::builder()
            .method(Method::POST)
            .uri("/api/patient")
            .header(header::CONTENT_LENGTH, "11000000")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::empty())
            .unwrap();

        let response = run(req).await;
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_disallowed_content_type_rejected() {
        let req = Request::builder()
            .method(Method::POST)
            .uri("/api/patient")
            .header(header::CONTENT_TYPE, "text/xml")
            .body(Body::empty())
            .unwrap();

        let response = run(req).await;
        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[tokio::test]
    async fn test_get_requests_skip_content_type_check() {
        let req = Request::builder()
            .method(Method::GET)
            .uri("/api/health")
            .header(header::CONTENT_TYPE, "text/xml")
            .body(Body::empty())
            .unwrap();

        let response = run(req).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_scanner_user_agent_rejected() {
        let req = Request::builder()
            .method(Method::GET)
            .uri("/api/health")
            .header(header::USER_AGENT, "sqlmap/1.5")
            .body(Body::empty())
            .unwrap();

        let response = run(req).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_ordinary_user_agent_passes() {
        let req = Request::builder()
            .method(Method::GET)
            .uri("/api/health")
            .header(header::USER_AGENT, "Mozilla/5.0 (X11; Linux x86_64)")
            .body(Body::empty())
            .unwrap();

        let response = run(req).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_spoofed_forwarded_host_rejected() {
        let req = Request::builder()
            .method(Method::GET)
            .uri("/api/health")
            .header(header::HOST, "api.dokq.ph")
            .header("x-forwarded-host", "evil.example")
            .body(Body::empty())
            .unwrap();

        let response = run(req).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_agreeing_forwarded_host_passes() {
        let req = Request::builder()
            .method(Method::GET)
            .uri("/api/health")
            .header(header::HOST, "api.dokq.ph")
            .header("x-forwarded-host", "api.dokq.ph")
            .body(Body::empty())
            .unwrap();

        let response = run(req).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_disallowed_origin_opaque_rejection() {
        let mut config = ApiConfig::default().with_environment(Environment::Production);
        config.cors = CorsConfig::for_environment(
            Environment::Production,
            Some("https://app.dokq.ph".to_string()),
        );
        let mut service = RequestGuardLayer::new(Arc::new(config)).layer(mock_ok());

        let req = Request::builder()
            .method(Method::GET)
            .uri("/api/health")
            .header(header::ORIGIN, "https://evil.example")
            .body(Body::empty())
            .unwrap();

        let response = service.ready().await.unwrap().call(req).await.unwrap();
        // Opaque: a generic server error, not a structured CORS denial
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_no_origin_header_passes() {
        let req = Request::builder()
            .method(Method::GET)
            .uri("/api/health")
            .body(Body::empty())
            .unwrap();

        let response = run(req).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_injection_detected_but_not_blocked() {
        let req = Request::builder()
            .method(Method::GET)
            .uri("/api/surgery/queue?specialty=1%27%20UNION%20SELECT%20*")
            .body(Body::empty())
            .unwrap();

        // Detection is telemetry only; the request proceeds.
        let response = run(req).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_suspicious_json_body_not_blocked_and_reattached() {
        let echo = tower::service_fn(|req: Request<Body>| async move {
            let bytes = axum::body::to_bytes(req.into_body(), usize::MAX)
                .await
                .unwrap();
            Ok::<_, std::convert::Infallible>(Response::new(Body::from(bytes)))
        });
        let mut service = guard().layer(echo);

        let payload = serde_json::json!({
            "symptoms": "persistent <script>alert(1)</script> headache"
        })
        .to_string();
        let req = Request::builder()
            .method(Method::POST)
            .uri("/api/ai/consultation")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(payload.clone()))
            .unwrap();

        let response = service.ready().await.unwrap().call(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // The inner service still sees the full body.
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(bytes, payload.as_bytes());
    }

    #[test]
    fn test_injection_pattern_classes() {
        assert_eq!(match_injection("1 UNION SELECT password"), Some("sql"));
        assert_eq!(match_injection("<script>alert(1)</script>"), Some("markup"));
        assert_eq!(match_injection("../../etc/passwd"), Some("path-traversal"));
        assert_eq!(match_injection("x; rm -rf /"), Some("shell"));
        assert_eq!(match_injection("{{constructor}}"), Some("template"));
        assert_eq!(match_injection("a mild headache"), None);
    }
}
