// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Role definitions for authorization.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Roles recognized by the platform.
///
/// Every resolved identity carries exactly one role; route authorization is a
/// membership check against a route's required-role list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Facility administrator.
    Admin,
    /// Attending physician.
    Doctor,
    /// Nursing staff.
    Nurse,
    /// Patient accessing their own records.
    Patient,
    /// Non-clinical facility staff (scheduling, OR coordination).
    ClinicStaff,
    /// Administrator of a partner organization.
    OrganizationAdmin,
    /// Member of a partner organization.
    OrganizationMember,
    /// Platform operations.
    SystemAdmin,
}

impl Role {
    /// Returns the role name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Doctor => "doctor",
            Role::Nurse => "nurse",
            Role::Patient => "patient",
            Role::ClinicStaff => "clinic_staff",
            Role::OrganizationAdmin => "organization_admin",
            Role::OrganizationMember => "organization_member",
            Role::SystemAdmin => "system_admin",
        }
    }

    /// Parses a role from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "doctor" => Some(Role::Doctor),
            "nurse" => Some(Role::Nurse),
            "patient" => Some(Role::Patient),
            "clinic_staff" => Some(Role::ClinicStaff),
            "organization_admin" => Some(Role::OrganizationAdmin),
            "organization_member" => Some(Role::OrganizationMember),
            "system_admin" => Some(Role::SystemAdmin),
            _ => None,
        }
    }

    /// Returns all recognized roles.
    pub fn all() -> &'static [Role] {
        &[
            Role::Admin,
            Role::Doctor,
            Role::Nurse,
            Role::Patient,
            Role::ClinicStaff,
            Role::OrganizationAdmin,
            Role::OrganizationMember,
            Role::SystemAdmin,
        ]
    }

    /// The role assigned when a verified credential carries no role claim.
    pub fn default_role() -> Role {
        Role::Patient
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Tests
// =============================================================================
