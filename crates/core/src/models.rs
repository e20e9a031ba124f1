//! Domain records persisted by the clinic store.
//!
//! Enums round-trip through their stored string form via `as_str` / `FromStr`.
//! Timestamps are UTC throughout.

use crate::error::ClinicError;
use chrono::{DateTime, NaiveDate, Utc};
use clinic_types::EmailAddress;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// ENUMS
// ============================================================================

/// Role held by a principal. Exactly one at a time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Doctor,
    Patient,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Admin, Role::Doctor, Role::Patient];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Doctor => "doctor",
            Self::Patient => "patient",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ClinicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "doctor" => Ok(Self::Doctor),
            "patient" => Ok(Self::Patient),
            other => Err(ClinicError::InvalidInput(format!("unknown role {other:?}"))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum AppointmentStatus {
    Scheduled,
    Cancelled,
    Completed,
}

impl AppointmentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "Scheduled",
            Self::Cancelled => "Cancelled",
            Self::Completed => "Completed",
        }
    }

    /// Transition table. Only a scheduled appointment may move, and only to a terminal state.
    pub fn can_transition_to(self, next: AppointmentStatus) -> bool {
        matches!(
            (self, next),
            (Self::Scheduled, Self::Completed) | (Self::Scheduled, Self::Cancelled)
        )
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppointmentStatus {
    type Err = ClinicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Scheduled" => Ok(Self::Scheduled),
            "Cancelled" => Ok(Self::Cancelled),
            "Completed" => Ok(Self::Completed),
            other => Err(ClinicError::InvalidInput(format!(
                "unknown appointment status {other:?}"
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum PrescriptionStatus {
    Issued,
    Dispensed,
}

impl PrescriptionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Issued => "Issued",
            Self::Dispensed => "Dispensed",
        }
    }
}

impl fmt::Display for PrescriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PrescriptionStatus {
    type Err = ClinicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            s if s.eq_ignore_ascii_case("issued") => Ok(Self::Issued),
            s if s.eq_ignore_ascii_case("dispensed") => Ok(Self::Dispensed),
            other => Err(ClinicError::InvalidInput(format!(
                "unknown prescription status {other:?}"
            ))),
        }
    }
}

// ============================================================================
// PRINCIPALS AND PROFILES
// ============================================================================

/// Canonical identity asserted by the external issuer, after verification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub email: EmailAddress,
    pub subject: String,
    pub name: String,
    pub picture: String,
}

/// An identity-bearing actor. Email is unique and never changes after creation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub id: i64,
    pub email: EmailAddress,
    /// External subject id; empty until first verified login, then set once.
    pub subject: String,
    pub name: String,
    pub picture: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DoctorProfile {
    pub id: i64,
    pub department_id: Option<i64>,
    pub specialization: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PatientProfile {
    pub id: i64,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: String,
}

// ============================================================================
// CATALOGUE
// ============================================================================

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Department {
    pub id: i64,
    pub name: String,
    pub description: String,
}

/// Doctor profile joined with its user and department.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Doctor {
    pub profile: DoctorProfile,
    pub name: String,
    pub email: String,
    pub picture: String,
    pub department: Option<Department>,
}

/// Patient profile joined with its user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Patient {
    pub profile: PatientProfile,
    pub name: String,
    pub email: String,
    pub picture: String,
}

// ============================================================================
// APPOINTMENT LIFECYCLE
// ============================================================================

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Appointment {
    pub id: i64,
    pub patient_id: i64,
    pub doctor_id: i64,
    pub appointment_date: DateTime<Utc>,
    pub status: AppointmentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Appointment with the richest available counterpart detail for display.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AppointmentDetail {
    pub appointment: Appointment,
    pub patient_name: String,
    pub doctor_name: String,
    pub specialization: String,
    pub department: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Consultation {
    pub id: i64,
    pub appointment_id: i64,
    pub diagnosis: String,
    pub notes: String,
    pub date: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Prescription {
    pub id: i64,
    pub consultation_id: i64,
    pub medication: String,
    pub dosage: String,
    pub status: PrescriptionStatus,
    pub created_at: DateTime<Utc>,
}

/// Prescription joined back through its consultation to the issuing appointment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PrescriptionDetail {
    pub prescription: Prescription,
    pub appointment_id: i64,
    pub diagnosis: String,
    pub doctor_name: String,
}

/// One medication line supplied when completing an appointment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MedicationOrder {
    pub medication: String,
    pub dosage: String,
}

/// Read-only composite of a patient's appointments and prescriptions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PatientHistory {
    pub appointments: Vec<AppointmentDetail>,
    pub prescriptions: Vec<PrescriptionDetail>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_stored_form() {
        for role in Role::ALL {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert_eq!("Doctor".parse::<Role>().unwrap(), Role::Doctor);
        assert!("nurse".parse::<Role>().is_err());
    }

    #[test]
    fn only_scheduled_appointments_transition() {
        use AppointmentStatus::*;
        assert!(Scheduled.can_transition_to(Completed));
        assert!(Scheduled.can_transition_to(Cancelled));
        for from in [Completed, Cancelled] {
            for to in [Scheduled, Completed, Cancelled] {
                assert!(!from.can_transition_to(to), "{from} -> {to} must be rejected");
            }
        }
        assert!(!Scheduled.can_transition_to(Scheduled));
    }

    #[test]
    fn prescription_status_parse_is_case_insensitive() {
        assert_eq!(
            "dispensed".parse::<PrescriptionStatus>().unwrap(),
            PrescriptionStatus::Dispensed
        );
        assert!("lost".parse::<PrescriptionStatus>().is_err());
    }
}
