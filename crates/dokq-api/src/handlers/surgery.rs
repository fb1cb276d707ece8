// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Surgery queue and operating-room handlers.

use axum::{extract::Query, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::Role;
use crate::error::{ApiResult, ValidationErrors};
use crate::extractors::{Auth, Validate, ValidatedJson};

/// Case urgency levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Urgency {
    /// Routine scheduling.
    Low,
    /// Elevated priority.
    Medium,
    /// Needs prompt attention.
    High,
    /// Immediate intervention required.
    Critical,
}

/// Operating-room states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrState {
    /// Ready for scheduling.
    Available,
    /// Procedure in progress.
    #[serde(rename = "In Use")]
    InUse,
    /// Out of service.
    Maintenance,
    /// Booked for an upcoming procedure.
    Scheduled,
}

// =============================================================================
// Surgery Queue
// =============================================================================

/// Query parameters for the surgery queue.
#[derive(Debug, Default, Deserialize)]
pub struct SurgeryQueueQuery {
    /// Page size, 1..=100.
    pub limit: Option<u32>,
    /// Offset into the queue.
    pub offset: Option<u32>,
    /// Urgency filter.
    pub urgency: Option<Urgency>,
    /// Specialty filter.
    pub specialty: Option<String>,
    /// Location filter.
    pub location: Option<String>,
}

impl SurgeryQueueQuery {
    fn validate(&self) -> ApiResult<()> {
        let mut errors = ValidationErrors::new();

        if let Some(limit) = self.limit {
            if !(1..=100).contains(&limit) {
                errors.add("limit", "Limit must be between 1 and 100");
            }
        }
        if let Some(specialty) = &self.specialty {
            let valid = specialty
                .chars()
                .all(|c| c.is_ascii_alphabetic() || c == ' ' || c == '-');
            if specialty.is_empty() || specialty.len() > 50 || !valid {
                errors.add(
                    "specialty",
                    "Specialty must be under 50 characters and contain only letters",
                );
            }
        }
        if let Some(location) = &self.location {
            let valid = location
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || " ,.-".contains(c));
            if location.is_empty() || location.len() > 100 || !valid {
                errors.add("location", "Location must be under 100 characters");
            }
        }

        errors.into_result()
    }
}

/// One queued case.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SurgeryCase {
    /// Case identifier.
    pub id: &'static str,
    /// Patient display name.
    pub patient_name: &'static str,
    /// Patient identifier.
    pub patient_id: &'static str,
    /// Scheduled procedure.
    pub procedure: &'static str,
    /// Case urgency.
    pub urgency: Urgency,
    /// Days waited so far.
    pub wait_time: u32,
    /// Facility location.
    pub location: &'static str,
    /// Computed urgency score.
    pub urgency_score: u32,
    /// Expected procedure duration.
    pub estimated_duration: &'static str,
    /// Specialty needed.
    pub required_specialty: &'static str,
    /// When the case entered the queue.
    pub created_at: DateTime<Utc>,
}

/// Surgery queue payload.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SurgeryQueueResponse {
    /// Visible cases after filtering.
    pub queue: Vec<SurgeryCase>,
    /// Number of visible cases.
    pub total_count: usize,
    /// When the queue was read.
    pub last_updated: DateTime<Utc>,
}

fn sample_queue() -> Vec<SurgeryCase> {
    let now = Utc::now();
    vec![
        SurgeryCase {
            id: "1",
            patient_name: "Maria Santos",
            patient_id: "patient_001",
            procedure: "Hysterectomy",
            urgency: Urgency::Critical,
            wait_time: 156,
            location: "Manila",
            urgency_score: 89,
            estimated_duration: "2-3 hours",
            required_specialty: "Gynecology",
            created_at: now,
        },
        SurgeryCase {
            id: "2",
            patient_name: "Ana Rodriguez",
            patient_id: "patient_002",
            procedure: "Fibroid Removal",
            urgency: Urgency::High,
            wait_time: 134,
            location: "Quezon City",
            urgency_score: 82,
            estimated_duration: "1-2 hours",
            required_specialty: "Gynecology",
            created_at: now,
        },
        SurgeryCase {
            id: "3",
            patient_name: "Carmen Dela Cruz",
            patient_id: "patient_003",
            procedure: "Ovarian Cyst Surgery",
            urgency: Urgency::High,
            wait_time: 98,
            location: "Rural Bataan",
            urgency_score: 78,
            estimated_duration: "1-2 hours",
            required_specialty: "Gynecology",
            created_at: now,
        },
    ]
}

/// GET /api/surgery/queue
///
/// Roles: admin, doctor. Non-admins only see cases at their own location.
pub async fn surgery_queue(
    Auth(identity): Auth,
    Query(query): Query<SurgeryQueueQuery>,
) -> ApiResult<Json<SurgeryQueueResponse>> {
    query.validate()?;

    let mut queue = sample_queue();

    if identity.role != Role::Admin {
        let location = identity
            .claims
            .extra
            .get("location")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        queue.retain(|case| case.location == location);
    }

    if let Some(urgency) = query.urgency {
        queue.retain(|case| case.urgency == urgency);
    }

    let total_count = queue.len();
    Ok(Json(SurgeryQueueResponse {
        queue,
        total_count,
        last_updated: Utc::now(),
    }))
}

// =============================================================================
// OR Status
// =============================================================================

/// Query parameters for operating-room status.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrStatusQuery {
    /// Status filter.
    pub status: Option<OrState>,
    /// Specialty filter.
    pub specialty: Option<String>,
    /// Minimum utilization percentage.
    pub min_utilization: Option<u32>,
    /// Maximum utilization percentage.
    pub max_utilization: Option<u32>,
}

impl OrStatusQuery {
    fn validate(&self) -> ApiResult<()> {
        let mut errors = ValidationErrors::new();

        if let Some(min) = self.min_utilization {
            if min > 100 {
                errors.add("minUtilization", "Minimum utilization must be between 0 and 100");
            }
        }
        if let Some(max) = self.max_utilization {
            if max > 100 {
                errors.add("maxUtilization", "Maximum utilization must be between 0 and 100");
            }
        }
        if let Some(specialty) = &self.specialty {
            let valid = specialty
                .chars()
                .all(|c| c.is_ascii_alphabetic() || c == ' ' || c == '-');
            if specialty.is_empty() || specialty.len() > 50 || !valid {
                errors.add(
                    "specialty",
                    "Specialty must be under 50 characters and contain only letters",
                );
            }
        }

        errors.into_result()
    }
}

/// One operating room.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperatingRoom {
    /// Room identifier.
    pub id: &'static str,
    /// Current state.
    pub status: OrState,
    /// Utilization percentage.
    pub utilization: u32,
    /// Primary specialty.
    pub specialty: &'static str,
    /// Procedure currently running, if any.
    pub current_procedure: Option<&'static str>,
    /// Expected completion time, if known.
    pub estimated_completion: Option<&'static str>,
    /// When the room state was read.
    pub last_updated: DateTime<Utc>,
}

/// OR status payload.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrStatusResponse {
    /// Rooms after filtering.
    pub or_status: Vec<OperatingRoom>,
    /// Number of rooms returned.
    pub total_rooms: usize,
    /// Mean utilization of the returned rooms.
    pub average_utilization: u32,
    /// When the states were read.
    pub last_updated: DateTime<Utc>,
}

fn sample_rooms() -> Vec<OperatingRoom> {
    let now = Utc::now();
    vec![
        OperatingRoom {
            id: "OR-1",
            status: OrState::InUse,
            utilization: 85,
            specialty: "Gynecology",
            current_procedure: Some("Hysterectomy"),
            estimated_completion: Some("2024-01-15T14:30:00Z"),
            last_updated: now,
        },
        OperatingRoom {
            id: "OR-2",
            status: OrState::Available,
            utilization: 72,
            specialty: "General Surgery",
            current_procedure: None,
            estimated_completion: None,
            last_updated: now,
        },
        OperatingRoom {
            id: "OR-3",
            status: OrState::Maintenance,
            utilization: 45,
            specialty: "Orthopedics",
            current_procedure: None,
            estimated_completion: Some("2024-01-15T16:00:00Z"),
            last_updated: now,
        },
        OperatingRoom {
            id: "OR-4",
            status: OrState::InUse,
            utilization: 92,
            specialty: "Gynecology",
            current_procedure: Some("Fibroid Removal"),
            estimated_completion: Some("2024-01-15T15:00:00Z"),
            last_updated: now,
        },
        OperatingRoom {
            id: "OR-5",
            status: OrState::Scheduled,
            utilization: 68,
            specialty: "Cardiology",
            current_procedure: None,
            estimated_completion: Some("2024-01-15T13:00:00Z"),
            last_updated: now,
        },
    ]
}

/// GET /api/or/status
///
/// Roles: admin, doctor, nurse, clinic_staff.
pub async fn or_status(
    Auth(_identity): Auth,
    Query(query): Query<OrStatusQuery>,
) -> ApiResult<Json<OrStatusResponse>> {
    query.validate()?;

    let mut rooms = sample_rooms();
    if let Some(status) = query.status {
        rooms.retain(|room| room.status == status);
    }

    let total_rooms = rooms.len();
    let average_utilization = if total_rooms == 0 {
        0
    } else {
        rooms.iter().map(|r| r.utilization).sum::<u32>() / total_rooms as u32
    };

    Ok(Json(OrStatusResponse {
        or_status: rooms,
        total_rooms,
        average_utilization,
        last_updated: Utc::now(),
    }))
}

// =============================================================================
// OR Optimization
// =============================================================================

/// One room in an optimization request.
#[derive(Debug, Deserialize)]
pub struct OrDataPoint {
    /// Room identifier.
    pub id: String,
    /// Current status label.
    pub status: Option<String>,
    /// Utilization percentage; clamped to 0..=100 before analysis.
    pub utilization: f64,
    /// Specialty label.
    pub specialty: Option<String>,
}

/// Optimization request body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizeRequest {
    /// Rooms to analyze.
    pub or_data: Vec<OrDataPoint>,
    /// Optional demand projections.
    pub demand_data: Option<serde_json::Value>,
}

impl Validate for OptimizeRequest {
    fn validate(&self) -> ApiResult<()> {
        let mut errors = ValidationErrors::new();

        if self.or_data.is_empty() {
            errors.add("orData", "OR data must be a non-empty array");
        }
        for (index, room) in self.or_data.iter().enumerate() {
            if room.id.is_empty() {
                errors.add(format!("orData[{}].id", index), "OR ID is required");
            }
            if !room.utilization.is_finite() {
                errors.add(
                    format!("orData[{}].utilization", index),
                    "Utilization must be a number",
                );
            }
        }

        errors.into_result()
    }
}

/// One optimization suggestion.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    /// The suggested change.
    pub suggestion: &'static str,
    /// Expected impact.
    pub impact: &'static str,
    /// Priority label.
    pub priority: &'static str,
    /// Rollout estimate.
    pub estimated_implementation_time: &'static str,
}

/// Optimization payload.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizeResponse {
    /// Ranked suggestions.
    pub suggestions: Vec<Suggestion>,
    /// When the analysis ran.
    pub generated_at: DateTime<Utc>,
    /// Summary of the analyzed input.
    pub based_on: AnalysisBasis,
}

/// Summary of the analyzed input.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisBasis {
    /// Rooms included in the analysis.
    pub or_rooms_analyzed: usize,
    /// Mean utilization of the analyzed rooms.
    pub average_utilization: u32,
}

/// POST /api/or/optimize
///
/// Roles: admin, clinic_staff. CSRF-protected mutation.
pub async fn optimize_or(
    Auth(_identity): Auth,
    ValidatedJson(request): ValidatedJson<OptimizeRequest>,
) -> ApiResult<Json<OptimizeResponse>> {
    let analyzed: Vec<f64> = request
        .or_data
        .iter()
        .map(|room| room.utilization.clamp(0.0, 100.0))
        .collect();
    let average = (analyzed.iter().sum::<f64>() / analyzed.len() as f64).round() as u32;

    let suggestions = vec![
        Suggestion {
            suggestion: "Reschedule OR-3 maintenance to off-peak hours (6 PM - 6 AM)",
            impact: "+12% utilization",
            priority: "High",
            estimated_implementation_time: "1 week",
        },
        Suggestion {
            suggestion: "Cross-train staff for gynecology procedures to reduce bottlenecks",
            impact: "+8% efficiency",
            priority: "Medium",
            estimated_implementation_time: "2-3 months",
        },
        Suggestion {
            suggestion: "Extend OR-1 operating hours on Wednesdays to handle backlog",
            impact: "+15% capacity",
            priority: "High",
            estimated_implementation_time: "2 weeks",
        },
        Suggestion {
            suggestion: "Implement rapid turnover protocols between procedures",
            impact: "+20 min saved per surgery",
            priority: "Medium",
            estimated_implementation_time: "1 month",
        },
    ];

    Ok(Json(OptimizeResponse {
        suggestions,
        generated_at: Utc::now(),
        based_on: AnalysisBasis {
            or_rooms_analyzed: analyzed.len(),
            average_utilization: average,
        },
    }))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_query_validation() {
        let ok = SurgeryQueueQuery {
            limit: Some(10),
            specialty: Some("Gynecology".to_string()),
            ..Default::default()
        };
        assert!(ok.validate().is_ok());

        let bad_limit = SurgeryQueueQuery {
            limit: Some(500),
            ..Default::default()
        };
        assert!(bad_limit.validate().is_err());

        let bad_specialty = SurgeryQueueQuery {
            specialty: Some("Gyn3cology!".to_string()),
            ..Default::default()
        };
        assert!(bad_specialty.validate().is_err());
    }

    #[test]
    fn test_or_query_validation() {
        let ok = OrStatusQuery {
            min_utilization: Some(50),
            max_utilization: Some(90),
            ..Default::default()
        };
        assert!(ok.validate().is_ok());

        let bad = OrStatusQuery {
            min_utilization: Some(150),
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_optimize_request_validation() {
        let ok = OptimizeRequest {
            or_data: vec![OrDataPoint {
                id: "OR-1".to_string(),
                status: None,
                utilization: 85.0,
                specialty: None,
            }],
            demand_data: None,
        };
        assert!(ok.validate().is_ok());

        let empty = OptimizeRequest {
            or_data: vec![],
            demand_data: None,
        };
        assert!(empty.validate().is_err());

        let missing_id = OptimizeRequest {
            or_data: vec![OrDataPoint {
                id: String::new(),
                status: None,
                utilization: 85.0,
                specialty: None,
            }],
            demand_data: None,
        };
        assert!(missing_id.validate().is_err());
    }

    #[test]
    fn test_urgency_serde_labels() {
        assert_eq!(serde_json::to_string(&Urgency::Critical).unwrap(), "\"Critical\"");
        assert_eq!(serde_json::to_string(&OrState::InUse).unwrap(), "\"In Use\"");
    }
}
