// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Patient record and consultation handlers.

use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::Role;
use crate::error::{ApiError, ApiResult, ValidationErrors};
use crate::extractors::{Auth, PatientIdPath, Validate, ValidatedJson};
use crate::handlers::surgery::Urgency;
use crate::response::MutationResponse;

/// Strips control characters, markup brackets, and scriptable URL schemes
/// from free text, capping the length.
fn sanitize_text(input: &str, max_length: usize) -> String {
    let mut cleaned: String = input
        .chars()
        .filter(|c| !c.is_control())
        .filter(|c| *c != '<' && *c != '>')
        .collect();

    for scheme in ["javascript:", "vbscript:", "data:", "file:"] {
        // ASCII-only lowering keeps byte offsets aligned with the original.
        while let Some(position) = cleaned.to_ascii_lowercase().find(scheme) {
            cleaned.replace_range(position..position + scheme.len(), "");
        }
    }

    cleaned.trim().chars().take(max_length).collect()
}

// =============================================================================
// Get Patient
// =============================================================================

/// Patient record payload.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientRecord {
    /// Patient identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Age in years.
    pub age: u32,
    /// Primary condition.
    pub condition: String,
    /// Next scheduled appointment.
    pub next_appointment: String,
    /// Most recent visit.
    pub last_visit: String,
    /// Current medications.
    pub medications: Vec<String>,
    /// Contact details.
    pub contact_info: ContactInfo,
    /// When the record was read.
    pub last_updated: DateTime<Utc>,
}

/// Patient contact details.
#[derive(Debug, Serialize, Deserialize, Default)]
pub struct ContactInfo {
    /// Email address.
    #[serde(default)]
    pub email: String,
    /// Phone number.
    #[serde(default)]
    pub phone: String,
}

/// GET /api/patient/{id}
///
/// Roles: admin, doctor, nurse, patient. A patient may only read their own
/// record; the ownership check runs after authorization, against the resolved
/// subject.
pub async fn get_patient(
    Auth(identity): Auth,
    PatientIdPath(id): PatientIdPath,
) -> ApiResult<Json<PatientRecord>> {
    let sanitized_id = sanitize_text(&id, 50);

    if identity.role == Role::Patient && sanitized_id != identity.subject {
        return Err(ApiError::forbidden(
            "You can only access your own patient data",
        ));
    }

    Ok(Json(PatientRecord {
        id: sanitized_id,
        name: "Maria Santos".to_string(),
        age: 34,
        condition: "Uterine Fibroids".to_string(),
        next_appointment: "2024-01-15".to_string(),
        last_visit: "2023-12-10".to_string(),
        medications: vec![
            "Ibuprofen 400mg".to_string(),
            "Iron supplements".to_string(),
        ],
        contact_info: ContactInfo {
            email: "maria.santos@email.com".to_string(),
            phone: "+63 917 123 4567".to_string(),
        },
        last_updated: Utc::now(),
    }))
}

// =============================================================================
// Create Patient
// =============================================================================

/// Patient creation request body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePatientRequest {
    /// Patient name.
    pub name: String,
    /// Patient age.
    pub age: i64,
    /// Primary condition.
    #[serde(default)]
    pub condition: Option<String>,
    /// Current medications.
    #[serde(default)]
    pub medications: Option<Vec<String>>,
    /// Contact details.
    #[serde(default)]
    pub contact_info: Option<ContactInfo>,
}

impl Validate for CreatePatientRequest {
    fn validate(&self) -> ApiResult<()> {
        let mut errors = ValidationErrors::new();

        if self.name.trim().len() < 2 || self.name.len() > 100 {
            errors.add("name", "Name must be between 2 and 100 characters");
        }
        if !(0..=150).contains(&self.age) {
            errors.add("age", "Age must be a valid number between 0 and 150");
        }
        if let Some(condition) = &self.condition {
            if condition.len() > 500 {
                errors.add("condition", "Condition must be less than 500 characters");
            }
        }
        if let Some(contact) = &self.contact_info {
            if !contact.email.is_empty()
                && !(contact.email.contains('@') && contact.email.contains('.'))
            {
                errors.add("contactInfo.email", "Please provide a valid email");
            }
            if !contact.phone.is_empty() && !(10..=20).contains(&contact.phone.len()) {
                errors.add(
                    "contactInfo.phone",
                    "Phone number must be between 10 and 20 characters",
                );
            }
        }

        errors.into_result()
    }
}

/// Patient creation acknowledgement.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePatientResponse {
    /// Success acknowledgement.
    #[serde(flatten)]
    pub ack: MutationResponse,
    /// Identifier of the created record.
    pub patient_id: String,
}

/// POST /api/patient
///
/// Roles: admin, doctor, nurse. CSRF-protected mutation; the record would be
/// persisted by the external datastore collaborator.
pub async fn create_patient(
    Auth(identity): Auth,
    ValidatedJson(request): ValidatedJson<CreatePatientRequest>,
) -> ApiResult<Json<CreatePatientResponse>> {
    let patient_id = Uuid::now_v7().to_string();

    tracing::info!(
        created_by = %identity.subject,
        patient_id,
        name_len = request.name.trim().len(),
        "Patient record created"
    );

    Ok(Json(CreatePatientResponse {
        ack: MutationResponse::ok("Patient data saved successfully"),
        patient_id,
    }))
}

// =============================================================================
// AI Consultation
// =============================================================================

/// Consultation request body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsultationRequest {
    /// Symptom description, 10 to 1000 characters.
    pub symptoms: String,
    /// Optional history, up to 2000 characters.
    #[serde(default)]
    pub patient_history: Option<String>,
    /// Caller-reported urgency.
    pub urgency: Urgency,
}

impl Validate for ConsultationRequest {
    fn validate(&self) -> ApiResult<()> {
        let mut errors = ValidationErrors::new();

        if !(10..=1000).contains(&self.symptoms.len()) {
            errors.add("symptoms", "Symptoms must be between 10 and 1000 characters");
        }
        if let Some(history) = &self.patient_history {
            if history.len() > 2000 {
                errors.add(
                    "patientHistory",
                    "Patient history must be less than 2000 characters",
                );
            }
        }

        errors.into_result()
    }
}

/// Preliminary assessment payload.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Assessment {
    /// Assessment text.
    pub preliminary_assessment: &'static str,
    /// Urgency carried through from the request.
    pub recommended_urgency: Urgency,
    /// Recommended next steps.
    pub next_steps: Vec<&'static str>,
    /// Whether immediate care is advised.
    pub immediate_attention: bool,
    /// Medical disclaimer.
    pub disclaimer: &'static str,
}

/// Consultation response payload.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsultationResponse {
    /// The preliminary assessment.
    pub assessment: Assessment,
    /// Consultation identifier.
    pub consultation_id: String,
    /// When the consultation ran.
    pub timestamp: DateTime<Utc>,
    /// Requesting user.
    pub user_id: String,
}

/// POST /api/ai/consultation
///
/// Roles: admin, doctor, nurse, patient. CSRF-protected mutation.
pub async fn ai_consultation(
    Auth(identity): Auth,
    ValidatedJson(request): ValidatedJson<ConsultationRequest>,
) -> ApiResult<Json<ConsultationResponse>> {
    let _symptoms = sanitize_text(&request.symptoms, 1000);
    let _history = request
        .patient_history
        .as_deref()
        .map(|history| sanitize_text(history, 2000));

    let assessment = Assessment {
        preliminary_assessment:
            "Based on the symptoms provided, further medical evaluation is recommended.",
        recommended_urgency: request.urgency,
        next_steps: vec![
            "Schedule consultation with healthcare provider",
            "Monitor symptoms closely",
            "Seek immediate care if symptoms worsen",
        ],
        immediate_attention: matches!(request.urgency, Urgency::High | Urgency::Critical),
        disclaimer:
            "This is not a medical diagnosis. Please consult with a qualified healthcare professional.",
    };

    Ok(Json(ConsultationResponse {
        assessment,
        consultation_id: format!("consult_{}", Uuid::now_v7()),
        timestamp: Utc::now(),
        user_id: identity.subject,
    }))
}

// =============================================================================
// Tests
// =============================================================================
