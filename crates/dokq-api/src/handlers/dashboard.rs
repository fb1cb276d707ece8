// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Dashboard and analytics handlers.

use axum::{extract::Query, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::Role;
use crate::error::{ApiResult, ValidationErrors};
use crate::extractors::Auth;

/// Checks an ISO 8601 date or datetime string.
fn is_iso8601(value: &str) -> bool {
    DateTime::parse_from_rfc3339(value).is_ok()
        || chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok()
}

// =============================================================================
// Dashboard Stats
// =============================================================================

/// Query parameters for dashboard statistics.
#[derive(Debug, Default, Deserialize)]
pub struct DashboardQuery {
    /// Start of the reporting window (ISO 8601).
    #[serde(rename = "startDate")]
    pub start_date: Option<String>,
    /// End of the reporting window (ISO 8601).
    #[serde(rename = "endDate")]
    pub end_date: Option<String>,
    /// Hospital filter.
    pub hospital: Option<String>,
}

impl DashboardQuery {
    fn validate(&self) -> ApiResult<()> {
        let mut errors = ValidationErrors::new();

        if let Some(date) = &self.start_date {
            if !is_iso8601(date) {
                errors.add("startDate", "Start date must be in ISO8601 format");
            }
        }
        if let Some(date) = &self.end_date {
            if !is_iso8601(date) {
                errors.add("endDate", "End date must be in ISO8601 format");
            }
        }
        if let Some(hospital) = &self.hospital {
            let valid_chars = hospital
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || " -_.".contains(c));
            if hospital.is_empty() || hospital.len() > 100 || !valid_chars {
                errors.add(
                    "hospital",
                    "Hospital must be under 100 characters and contain only alphanumeric characters",
                );
            }
        }

        errors.into_result()
    }
}

/// Facility statistics payload.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    /// Patients currently waiting.
    pub patients_in_queue: u32,
    /// Average wait, human readable.
    pub average_wait_time: String,
    /// Operating-room utilization, human readable.
    pub or_utilization: String,
    /// Open urgent cases.
    pub urgent_cases: u32,
    /// Mobile clinic visits this period.
    pub mobile_clinic_visits: u32,
    /// Offline consultations this period.
    pub offline_consultations: u32,
    /// When the figures were computed.
    pub last_updated: DateTime<Utc>,
}

/// GET /api/dashboard/stats
///
/// Roles: admin, doctor, nurse. Admins see facility-wide totals.
pub async fn dashboard_stats(
    Auth(identity): Auth,
    Query(query): Query<DashboardQuery>,
) -> ApiResult<Json<DashboardStats>> {
    query.validate()?;

    let stats = DashboardStats {
        patients_in_queue: if identity.role == Role::Admin { 847 } else { 156 },
        average_wait_time: "89 days".to_string(),
        or_utilization: "78%".to_string(),
        urgent_cases: 23,
        mobile_clinic_visits: 42,
        offline_consultations: 31,
        last_updated: Utc::now(),
    };

    Ok(Json(stats))
}

// =============================================================================
// Wait-Time Analytics
// =============================================================================

/// Query parameters for wait-time analytics.
#[derive(Debug, Default, Deserialize)]
pub struct AnalyticsQuery {
    /// Start of the reporting window (ISO 8601).
    #[serde(rename = "startDate")]
    pub start_date: Option<String>,
    /// End of the reporting window (ISO 8601).
    #[serde(rename = "endDate")]
    pub end_date: Option<String>,
    /// Department filter.
    pub department: Option<String>,
}

impl AnalyticsQuery {
    fn validate(&self) -> ApiResult<()> {
        let mut errors = ValidationErrors::new();

        if let Some(date) = &self.start_date {
            if !is_iso8601(date) {
                errors.add("startDate", "Start date must be in ISO8601 format");
            }
        }
        if let Some(date) = &self.end_date {
            if !is_iso8601(date) {
                errors.add("endDate", "End date must be in ISO8601 format");
            }
        }
        if let Some(department) = &self.department {
            if department.is_empty() || department.len() > 100 {
                errors.add("department", "Department must be under 100 characters");
            }
        }

        errors.into_result()
    }
}

/// One month of wait-time data.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitTimePoint {
    /// Month label.
    pub month: &'static str,
    /// Average wait in days.
    pub average_wait: i32,
    /// Target wait in days.
    pub target: i32,
    /// Change versus the prior month.
    pub improvement: i32,
}

/// Wait-time analytics payload.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitTimeAnalytics {
    /// Monthly series.
    pub data: Vec<WaitTimePoint>,
    /// Total improvement over the window, in days.
    pub total_improvement: i32,
    /// Trend direction label.
    pub trend: &'static str,
    /// When the figures were computed.
    pub last_updated: DateTime<Utc>,
}

/// GET /api/analytics/wait-times
///
/// Roles: admin, doctor, organization_admin.
pub async fn wait_time_analytics(
    Auth(_identity): Auth,
    Query(query): Query<AnalyticsQuery>,
) -> ApiResult<Json<WaitTimeAnalytics>> {
    query.validate()?;

    let data = vec![
        WaitTimePoint { month: "Sep", average_wait: 165, target: 120, improvement: -27 },
        WaitTimePoint { month: "Oct", average_wait: 158, target: 120, improvement: -4 },
        WaitTimePoint { month: "Nov", average_wait: 142, target: 120, improvement: -10 },
        WaitTimePoint { month: "Dec", average_wait: 128, target: 120, improvement: -10 },
        WaitTimePoint { month: "Jan", average_wait: 89, target: 120, improvement: -30 },
    ];

    Ok(Json(WaitTimeAnalytics {
        data,
        total_improvement: 46,
        trend: "decreasing",
        last_updated: Utc::now(),
    }))
}

// =============================================================================
// Tests
// =============================================================================
