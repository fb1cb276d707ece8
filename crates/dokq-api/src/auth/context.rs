// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Resolved request identity.

use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Claims, Role};

/// Identity resolved from a verified credential.
///
/// Attached to request extensions by the authentication middleware after a
/// successful verification. It lives only for the duration of the request and
/// is never persisted or shared across requests; public routes carry no
/// identity at all.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedIdentity {
    /// Subject identifier (user ID).
    pub subject: String,
    /// The identity's role.
    pub role: Role,
    /// Raw verified claims.
    pub claims: Claims,
    /// Request ID for tracing.
    pub request_id: Uuid,
    /// Client IP address.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_ip: Option<IpAddr>,
}

impl ResolvedIdentity {
    /// Creates an identity from verified claims.
    pub fn from_claims(claims: Claims) -> Self {
        Self {
            subject: claims.sub.clone(),
            role: claims.role_or_default(),
            claims,
            request_id: Uuid::now_v7(),
            client_ip: None,
        }
    }

    /// Sets the client IP address.
    pub fn with_client_ip(mut self, ip: IpAddr) -> Self {
        self.client_ip = Some(ip);
        self
    }

    /// Sets the request ID.
    pub fn with_request_id(mut self, request_id: Uuid) -> Self {
        self.request_id = request_id;
        self
    }

    /// Returns `true` if the identity holds the given role.
    pub fn has_role(&self, role: Role) -> bool {
        self.role == role
    }

    /// Returns `true` if the identity holds any of the given roles.
    pub fn has_any_role(&self, roles: &[Role]) -> bool {
        roles.contains(&self.role)
    }

    /// Returns the session identifier carried by the credential, if any.
    pub fn session_id(&self) -> Option<&str> {
        self.claims.session_id.as_deref()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_from_claims() {
        let claims = Claims::new("user123", Some(Role::Doctor), 3600);
        let identity = ResolvedIdentity::from_claims(claims);

        assert_eq!(identity.subject, "user123");
        assert!(identity.has_role(Role::Doctor));
        assert!(!identity.has_role(Role::Admin));
    }

    #[test]
    fn test_identity_default_role() {
        let claims = Claims::new("user123", None, 3600);
        let identity = ResolvedIdentity::from_claims(claims);
        assert_eq!(identity.role, Role::Patient);
    }

    #[test]
    fn test_has_any_role() {
        let claims = Claims::new("u", Some(Role::Nurse), 3600);
        let identity = ResolvedIdentity::from_claims(claims);

        assert!(identity.has_any_role(&[Role::Admin, Role::Nurse]));
        assert!(!identity.has_any_role(&[Role::Admin, Role::Doctor]));
    }

    #[test]
    fn test_client_ip_attachment() {
        let claims = Claims::new("u", Some(Role::Patient), 3600);
        let ip: IpAddr = "203.0.113.7".parse().unwrap();
        let identity = ResolvedIdentity::from_claims(claims).with_client_ip(ip);

        assert_eq!(identity.client_ip, Some(ip));
    }
}
