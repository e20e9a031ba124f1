//! JSON request and response bodies, with OpenAPI schemas.
//!
//! Timestamps are RFC 3339 strings in UTC. Enumerations travel as their stored string form.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

/// Body of every non-2xx response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ErrorRes {
    pub error: String,
    /// Internal detail. Present only outside production.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

// ============================================================================
// PRINCIPALS
// ============================================================================

/// The request-scoped principal, as seen by the caller.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ProfileRes {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub picture: String,
    pub role: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct UserRes {
    pub id: i64,
    pub email: String,
    pub subject: String,
    pub name: String,
    pub picture: String,
    pub role: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SetRoleReq {
    /// `admin`, `doctor` or `patient`.
    pub role: String,
    #[serde(default)]
    pub department_id: Option<i64>,
    #[serde(default)]
    pub specialization: Option<String>,
}

// ============================================================================
// CATALOGUE
// ============================================================================

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DepartmentReq {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DepartmentRes {
    pub id: i64,
    pub name: String,
    pub description: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DoctorRes {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub picture: String,
    pub specialization: String,
    pub department: Option<DepartmentRes>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PatientRes {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub picture: String,
    /// `YYYY-MM-DD`
    pub date_of_birth: Option<String>,
    pub gender: String,
}

// ============================================================================
// APPOINTMENTS
// ============================================================================

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BookAppointmentReq {
    /// Patient to book for. Defaults to the caller; only admins may book for someone else.
    #[serde(default)]
    pub patient_id: Option<i64>,
    pub doctor_id: i64,
    /// RFC 3339, or `YYYY-MM-DDTHH:MM` read as UTC. Also accepted as `date`.
    #[serde(alias = "date")]
    pub appointment_date: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AppointmentRes {
    pub id: i64,
    pub patient_id: i64,
    pub doctor_id: i64,
    pub appointment_date: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doctor_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specialization: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct MedicationReq {
    pub medication: String,
    #[serde(default)]
    pub dosage: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CompleteAppointmentReq {
    pub diagnosis: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub medications: Vec<MedicationReq>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PrescriptionRes {
    pub id: i64,
    pub consultation_id: i64,
    pub medication: String,
    pub dosage: String,
    pub status: String,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub appointment_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnosis: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doctor_name: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CompleteAppointmentRes {
    pub appointment: AppointmentRes,
    pub consultation_id: i64,
    pub diagnosis: String,
    pub notes: String,
    pub prescriptions: Vec<PrescriptionRes>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct UpdatePrescriptionReq {
    /// `Issued` or `Dispensed`.
    pub status: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct HistoryRes {
    pub appointments: Vec<AppointmentRes>,
    pub prescriptions: Vec<PrescriptionRes>,
}

/// Consultation recorded when an appointment was completed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ConsultationRes {
    pub id: i64,
    pub appointment_id: i64,
    pub diagnosis: String,
    pub notes: String,
    /// RFC 3339.
    pub date: String,
    pub prescriptions: Vec<PrescriptionRes>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optional_request_fields_default() {
        let req: BookAppointmentReq =
            serde_json::from_str(r#"{"doctor_id": 2, "appointment_date": "2025-03-10T09:00"}"#)
                .unwrap();
        assert_eq!(req.patient_id, None);

        let req: CompleteAppointmentReq = serde_json::from_str(r#"{"diagnosis": "Flu"}"#).unwrap();
        assert!(req.medications.is_empty());
        assert_eq!(req.notes, "");
    }

    #[test]
    fn booking_date_accepts_short_field_name() {
        let req: BookAppointmentReq =
            serde_json::from_str(r#"{"doctor_id": 2, "date": "2025-03-10T09:00"}"#).unwrap();
        assert_eq!(req.appointment_date, "2025-03-10T09:00");
    }

    #[test]
    fn error_details_are_omitted_when_absent() {
        let body = serde_json::to_value(ErrorRes {
            error: "Internal error".into(),
            details: None,
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({ "error": "Internal error" }));
    }
}
