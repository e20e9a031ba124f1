use crate::models::{AppointmentStatus, PrescriptionStatus};

/// Failures surfaced by the clinic core.
///
/// Variants map one-to-one onto the caller-visible taxonomy: store faults, policy
/// evaluation faults, caller-correctable input errors and compound-write failures.
#[derive(Debug, thiserror::Error)]
pub enum ClinicError {
    #[error("store failure: {0}")]
    StoreFailure(#[from] rusqlite::Error),
    #[error("store did not respond within {0:?}")]
    StoreTimeout(std::time::Duration),
    #[error("store connection poisoned by a panicked writer")]
    StorePoisoned,
    #[error("store work abandoned after its caller gave up")]
    StoreCancelled,
    #[error("store task did not complete: {0}")]
    StoreInterrupted(String),
    #[error("corrupt {entity} row: {detail}")]
    CorruptRow { entity: &'static str, detail: String },

    #[error("policy evaluation failed: {0}")]
    PolicyEvalError(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },
    #[error("invalid date {0:?}: expected RFC 3339 or YYYY-MM-DDTHH:MM")]
    InvalidDate(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("appointment cannot move from {from} to {to}")]
    InvalidTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },
    #[error("prescription cannot move from {from} to {to}")]
    InvalidPrescriptionTransition {
        from: PrescriptionStatus,
        to: PrescriptionStatus,
    },
    #[error("doctor {doctor_id} already has an appointment at {at}")]
    SlotTaken { doctor_id: i64, at: String },

    #[error("completion of appointment {appointment_id} failed at {step}: {source}")]
    PartialWriteFailure {
        appointment_id: i64,
        step: String,
        #[source]
        source: Box<ClinicError>,
    },
}

impl ClinicError {
    pub(crate) fn not_found(entity: &'static str, id: i64) -> Self {
        Self::NotFound { entity, id }
    }

    pub(crate) fn corrupt(entity: &'static str, detail: impl Into<String>) -> Self {
        Self::CorruptRow {
            entity,
            detail: detail.into(),
        }
    }
}

pub type ClinicResult<T> = std::result::Result<T, ClinicError>;
