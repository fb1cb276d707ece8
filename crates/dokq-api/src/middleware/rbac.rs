// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Role-based authorization gate.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::{
    body::Body,
    http::Request,
    response::{IntoResponse, Response},
};
use tower::{Layer, Service};

use crate::auth::{ResolvedIdentity, Role};
use crate::error::ApiError;

// =============================================================================
// Authorization Decision
// =============================================================================

/// The authorization decision procedure.
///
/// Pure function: no identity present is unauthorized; a role outside the
/// required list is forbidden; an empty required list admits any
/// authenticated identity.
pub fn authorize(identity: Option<&ResolvedIdentity>, required: &[Role]) -> Result<(), ApiError> {
    let Some(identity) = identity else {
        return Err(ApiError::unauthorized("Authentication required"));
    };

    if required.is_empty() || required.contains(&identity.role) {
        Ok(())
    } else {
        Err(ApiError::forbidden("Insufficient permissions"))
    }
}

// =============================================================================
// RequireRole
// =============================================================================

/// Layer enforcing a route's required-role list.
#[derive(Clone)]
pub struct RequireRole {
    required: Arc<Vec<Role>>,
}

impl RequireRole {
    /// Requires any of the given roles.
    pub fn any(roles: &[Role]) -> Self {
        Self {
            required: Arc::new(roles.to_vec()),
        }
    }

    /// Requires only that the caller is authenticated.
    pub fn authenticated() -> Self {
        Self {
            required: Arc::new(Vec::new()),
        }
    }
}

impl<S> Layer<S> for RequireRole {
    type Service = RequireRoleMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequireRoleMiddleware {
            inner,
            required: self.required.clone(),
        }
    }
}

/// Middleware applying the authorization decision.
#[derive(Clone)]
pub struct RequireRoleMiddleware<S> {
    inner: S,
    required: Arc<Vec<Role>>,
}

impl<S> Service<Request<Body>> for RequireRoleMiddleware<S>
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
        let required = self.required.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let identity = req.extensions().get::<ResolvedIdentity>();

            match authorize(identity, &required) {
                Ok(()) => inner.call(req).await,
                Err(err) => {
                    if let Some(identity) = identity {
                        tracing::warn!(
                            subject = %identity.subject,
                            role = %identity.role,
                            required = ?required.as_slice(),
                            "Authorization denied"
                        );
                    }
                    Ok(err.into_response())
                }
            }
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Claims;
    use axum::http::StatusCode;
    use tower::ServiceExt;

    fn identity(role: Role) -> ResolvedIdentity {
        ResolvedIdentity::from_claims(Claims::new("user-1", Some(role), 3600))
    }

    #[test]
    fn test_authorize_no_identity() {
        let err = authorize(None, &[Role::Admin]).unwrap_err();
        assert_eq!(err.error_code(), "UNAUTHORIZED");
    }

    #[test]
    fn test_authorize_role_mismatch() {
        let patient = identity(Role::Patient);
        let err = authorize(Some(&patient), &[Role::Admin]).unwrap_err();
        assert_eq!(err.error_code(), "FORBIDDEN");
    }

    #[test]
    fn test_authorize_role_match() {
        let admin = identity(Role::Admin);
        assert!(authorize(Some(&admin), &[Role::Admin, Role::Doctor]).is_ok());
    }

    #[test]
    fn test_authorize_empty_list_admits_any_identity() {
        let member = identity(Role::OrganizationMember);
        assert!(authorize(Some(&member), &[]).is_ok());
        assert!(authorize(None, &[]).is_err());
    }

    fn mock_service() -> impl Service<
        Request<Body>,
        Response = Response,
        Error = std::convert::Infallible,
        Future = impl Future<Output = Result<Response, std::convert::Infallible>> + Send,
    > + Clone
           + Send {
        tower::service_fn(|_req| async {
            Ok::<_, std::convert::Infallible>(Response::new(Body::empty()))
        })
    }

    #[tokio::test]
    async fn test_middleware_denies_wrong_role() {
        let mut service = RequireRole::any(&[Role::Admin]).layer(mock_service());

        let mut req = Request::builder().uri("/test").body(Body::empty()).unwrap();
        req.extensions_mut().insert(identity(Role::Patient));

        let response = service.ready().await.unwrap().call(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_middleware_allows_matching_role() {
        let mut service = RequireRole::any(&[Role::Admin]).layer(mock_service());

        let mut req = Request::builder().uri("/test").body(Body::empty()).unwrap();
        req.extensions_mut().insert(identity(Role::Admin));

        let response = service.ready().await.unwrap().call(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_middleware_requires_identity() {
        let mut service = RequireRole::authenticated().layer(mock_service());

        let req = Request::builder().uri("/test").body(Body::empty()).unwrap();
        let response = service.ready().await.unwrap().call(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
