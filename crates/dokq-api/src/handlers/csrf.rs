// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! CSRF token issuance and refresh handlers.

use axum::{extract::State, http::HeaderMap, Json};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;

use crate::csrf::{derive_session_id, IssuedToken, CSRF_COOKIE_NAME, CSRF_HEADER_NAME};
use crate::error::{ApiError, ApiResult};
use crate::extractors::{Auth, ClientIp};
use crate::response::{CsrfRefreshResponse, CsrfTokenResponse};
use crate::state::AppState;

/// Builds the double-submit cookie for an issued token.
///
/// Deliberately not HTTP-only: the client must be able to read the value to
/// echo it in the `x-csrf-token` header.
fn csrf_cookie(issued: &IssuedToken, secure: bool) -> Cookie<'static> {
    Cookie::build((CSRF_COOKIE_NAME, issued.token.clone()))
        .path("/")
        .http_only(false)
        .secure(secure)
        .same_site(SameSite::Strict)
        .max_age(time::Duration::seconds(issued.max_age.as_secs() as i64))
        .build()
}

// =============================================================================
// Issue
// =============================================================================

/// GET /api/auth/csrf-token
///
/// Issues a token for the caller's session and sets the double-submit cookie.
pub async fn issue_csrf_token(
    State(state): State<AppState>,
    Auth(identity): Auth,
    ClientIp(client_ip): ClientIp,
    jar: CookieJar,
) -> ApiResult<(CookieJar, Json<CsrfTokenResponse>)> {
    let session_id = derive_session_id(Some(&identity), None, client_ip)
        .ok_or(ApiError::CsrfSessionRequired)?;

    let issued = state.csrf.issue(&session_id);
    tracing::debug!(session_id, "Issued CSRF token");

    let jar = jar.add(csrf_cookie(&issued, state.config.is_production()));

    Ok((
        jar,
        Json(CsrfTokenResponse {
            success: true,
            csrf_token: issued.token.clone(),
            expiry: issued.expires_at.timestamp_millis(),
            header_name: CSRF_HEADER_NAME.to_string(),
            cookie_name: CSRF_COOKIE_NAME.to_string(),
            message: "CSRF token generated successfully".to_string(),
        }),
    ))
}

// =============================================================================
// Refresh
// =============================================================================

/// Refresh request body; the current token may also arrive via header.
#[derive(Debug, Default, Deserialize)]
pub struct RefreshRequest {
    /// The caller's current token.
    #[serde(rename = "_csrf")]
    pub current: Option<String>,
}

/// POST /api/auth/csrf-token/refresh
///
/// Rotates the session's token once it is older than the rotation interval;
/// otherwise confirms the current token remains valid.
pub async fn refresh_csrf_token(
    State(state): State<AppState>,
    Auth(identity): Auth,
    ClientIp(client_ip): ClientIp,
    jar: CookieJar,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> ApiResult<(CookieJar, Json<CsrfRefreshResponse>)> {
    let session_id = derive_session_id(Some(&identity), None, client_ip)
        .ok_or(ApiError::CsrfSessionRequired)?;

    let header_token = headers
        .get(CSRF_HEADER_NAME)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body_token = serde_json::from_slice::<RefreshRequest>(&body)
        .ok()
        .and_then(|request| request.current);
    let current = header_token.or(body_token);

    let outcome = state.csrf.refresh(&session_id, current.as_deref());

    if !outcome.rotated {
        return Ok((
            jar,
            Json(CsrfRefreshResponse {
                success: true,
                rotated: false,
                csrf_token: None,
                expiry: None,
                message: "Current CSRF token is still valid".to_string(),
            }),
        ));
    }

    let issued = outcome
        .token
        .ok_or_else(|| ApiError::internal("Rotation reported without a token"))?;
    tracing::debug!(session_id, "Rotated CSRF token");

    let jar = jar.add(csrf_cookie(&issued, state.config.is_production()));

    Ok((
        jar,
        Json(CsrfRefreshResponse {
            success: true,
            rotated: true,
            csrf_token: Some(issued.token.clone()),
            expiry: Some(issued.expires_at.timestamp_millis()),
            message: "CSRF token refreshed successfully".to_string(),
        }),
    ))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cookie_flags() {
        let issued = IssuedToken {
            token: "tok".to_string(),
            expires_at: chrono::Utc::now(),
            max_age: std::time::Duration::from_secs(1800),
        };

        let dev = csrf_cookie(&issued, false);
        assert_eq!(dev.name(), CSRF_COOKIE_NAME);
        assert_eq!(dev.http_only(), Some(false));
        assert_eq!(dev.secure(), Some(false));
        assert_eq!(dev.same_site(), Some(SameSite::Strict));
        assert_eq!(dev.path(), Some("/"));

        let prod = csrf_cookie(&issued, true);
        assert_eq!(prod.secure(), Some(true));
    }
}
