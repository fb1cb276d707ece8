// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Custom extractors for API handlers.

use axum::{
    extract::{FromRequestParts, Path},
    http::request::Parts,
    Json,
};
use serde::de::DeserializeOwned;

use crate::auth::ResolvedIdentity;
use crate::error::ApiError;

// =============================================================================
// Auth Extractor
// =============================================================================

/// Extractor for authenticated requests.
///
/// Extracts the [`ResolvedIdentity`] from the request extensions. Returns 401
/// if no identity was attached by the authentication middleware.
///
/// # Example
///
/// ```rust,ignore
/// async fn handler(Auth(identity): Auth) -> impl IntoResponse {
///     format!("Hello, {}", identity.subject)
/// }
/// ```
pub struct Auth(pub ResolvedIdentity);

impl<S> FromRequestParts<S> for Auth
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<ResolvedIdentity>()
            .cloned()
            .map(Auth)
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}

// =============================================================================
// Optional Auth Extractor
// =============================================================================

/// Extractor for optionally authenticated requests.
pub struct OptionalAuth(pub Option<ResolvedIdentity>);

impl<S> FromRequestParts<S> for OptionalAuth
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(OptionalAuth(parts.extensions.get::<ResolvedIdentity>().cloned()))
    }
}

// =============================================================================
// Client IP Extractor
// =============================================================================

/// Extractor for the client IP address, from the connection info.
pub struct ClientIp(pub Option<std::net::IpAddr>);

impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let from_conn = parts
            .extensions
            .get::<axum::extract::ConnectInfo<std::net::SocketAddr>>()
            .map(|ci| ci.0.ip());

        let from_identity = parts
            .extensions
            .get::<ResolvedIdentity>()
            .and_then(|identity| identity.client_ip);

        Ok(ClientIp(from_conn.or(from_identity)))
    }
}

// =============================================================================
// Validated JSON Extractor
// =============================================================================

/// Extractor for validated JSON payloads.
///
/// Deserializes the body and then runs the payload's own validation,
/// rejecting with field-level errors before the handler body runs.
pub struct ValidatedJson<T>(pub T);

/// Payloads that can validate themselves after deserialization.
pub trait Validate {
    /// Checks the payload, returning field-level failures.
    fn validate(&self) -> Result<(), ApiError>;
}

impl<S, T> axum::extract::FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(
        req: axum::http::Request<axum::body::Body>,
        state: &S,
    ) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e| ApiError::bad_request(format!("Invalid JSON: {}", e)))?;

        value.validate()?;
        Ok(ValidatedJson(value))
    }
}

// =============================================================================
// Patient ID Extractor
// =============================================================================

/// Extractor for a patient ID path parameter.
///
/// IDs are limited to 50 characters of `[a-zA-Z0-9_-]`.
pub struct PatientIdPath(pub String);

impl<S> FromRequestParts<S> for PatientIdPath
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(id) = Path::<String>::from_request_parts(parts, state)
            .await
            .map_err(|e| ApiError::bad_request(format!("Invalid patient ID: {}", e)))?;

        if id.is_empty()
            || id.len() > 50
            || !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(ApiError::bad_request("Invalid patient ID format"));
        }

        Ok(PatientIdPath(id))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Claims, Role};
    use axum::http::Request;

    fn parts_with_identity() -> Parts {
        let mut req = Request::builder().uri("/test").body(()).unwrap();
        req.extensions_mut().insert(ResolvedIdentity::from_claims(
            Claims::new("user-1", Some(Role::Nurse), 3600),
        ));
        req.into_parts().0
    }

    fn bare_parts() -> Parts {
        Request::builder()
            .uri("/test")
            .body(())
            .unwrap()
            .into_parts()
            .0
    }

    #[tokio::test]
    async fn test_auth_extractor_requires_identity() {
        let mut parts = bare_parts();
        let result = Auth::from_request_parts(&mut parts, &()).await;
        assert!(result.is_err());

        let mut parts = parts_with_identity();
        let Auth(identity) = Auth::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(identity.subject, "user-1");
    }

    #[tokio::test]
    async fn test_optional_auth_extractor() {
        let mut parts = bare_parts();
        let OptionalAuth(identity) = OptionalAuth::from_request_parts(&mut parts, &())
            .await
            .unwrap();
        assert!(identity.is_none());

        let mut parts = parts_with_identity();
        let OptionalAuth(identity) = OptionalAuth::from_request_parts(&mut parts, &())
            .await
            .unwrap();
        assert!(identity.is_some());
    }
}
