//! Appointment lifecycle engine.
//!
//! Owns every state change of an appointment and the records hanging off it:
//!
//! ```text
//! Scheduled ──complete──▶ Completed   (+1 consultation, +N prescriptions)
//!     │
//!     └──────cancel─────▶ Cancelled
//! ```
//!
//! Completed and Cancelled are terminal. Compound transitions run inside one unit of work.

use crate::constants::BOOKING_DATE_FALLBACK;
use crate::db::{appointment_instant, Database};
use crate::error::{ClinicError, ClinicResult};
use crate::models::{
    Appointment, AppointmentDetail, AppointmentStatus, Consultation, MedicationOrder,
    PatientHistory, Prescription, PrescriptionDetail, PrescriptionStatus, Principal, Role,
};
use crate::repositories::appointments::{self, AppointmentScope, PrescriptionScope};
use crate::repositories::profiles;
use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::Connection;

/// Result of a successful completion.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompletedAppointment {
    pub appointment: Appointment,
    pub consultation: Consultation,
    pub prescriptions: Vec<Prescription>,
}

/// Parses a booking date: RFC 3339 first, then minute precision without offset (read as UTC).
pub fn parse_booking_date(raw: &str) -> ClinicResult<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Ok(at.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, BOOKING_DATE_FALLBACK)
        .map(|naive| naive.and_utc())
        .map_err(|_| ClinicError::InvalidDate(raw.to_owned()))
}

#[derive(Clone, Debug)]
pub struct AppointmentLifecycle {
    db: Database,
}

impl AppointmentLifecycle {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    // ========================================================================
    // TRANSITIONS
    // ========================================================================

    /// Books a new appointment in the `Scheduled` state.
    ///
    /// # Errors
    ///
    /// - `InvalidDate` if `date` parses under neither accepted format.
    /// - `NotFound` if either the patient or the doctor profile does not exist.
    /// - `SlotTaken` if the doctor already holds a live appointment at that instant.
    pub fn book(&self, patient_id: i64, doctor_id: i64, date: &str) -> ClinicResult<Appointment> {
        let at = parse_booking_date(date)?;

        let appointment = self.db.unit_of_work(|tx| {
            if profiles::find_patient_profile(tx, patient_id)?.is_none() {
                return Err(ClinicError::not_found("patient", patient_id));
            }
            if profiles::find_doctor_profile(tx, doctor_id)?.is_none() {
                return Err(ClinicError::not_found("doctor", doctor_id));
            }
            if appointments::doctor_slot_taken(tx, doctor_id, at)? {
                return Err(slot_taken(doctor_id, at));
            }
            appointments::insert_appointment(tx, patient_id, doctor_id, at).map_err(|e| {
                if is_unique_violation(&e) {
                    slot_taken(doctor_id, at)
                } else {
                    e
                }
            })
        })?;

        tracing::info!(
            appointment_id = appointment.id,
            patient_id,
            doctor_id,
            at = %appointment_instant(at),
            "appointment booked"
        );
        Ok(appointment)
    }

    /// Completes a scheduled appointment, recording one consultation and one `Issued`
    /// prescription per medication order.
    ///
    /// The status change and every insert commit together or not at all.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` if a medication order has an empty medication name.
    /// - `NotFound` if the appointment does not exist.
    /// - `InvalidTransition` if the appointment is not `Scheduled`.
    /// - `PartialWriteFailure` if any write fails after the status change was written. The
    ///   appointment is then still `Scheduled`.
    pub fn complete(
        &self,
        appointment_id: i64,
        diagnosis: &str,
        notes: &str,
        medications: &[MedicationOrder],
    ) -> ClinicResult<CompletedAppointment> {
        if let Some(position) = medications
            .iter()
            .position(|m| m.medication.trim().is_empty())
        {
            return Err(ClinicError::InvalidInput(format!(
                "medication {} has no name",
                position + 1
            )));
        }

        let completed = self.db.unit_of_work(|tx| {
            let appointment = load_for_transition(tx, appointment_id, AppointmentStatus::Completed)?;
            appointments::update_appointment_status(tx, appointment_id, AppointmentStatus::Completed)?;

            let partial = |step: String| {
                move |source: ClinicError| ClinicError::PartialWriteFailure {
                    appointment_id,
                    step,
                    source: Box::new(source),
                }
            };

            let consultation = appointments::insert_consultation(tx, appointment_id, diagnosis, notes)
                .map_err(partial("consultation".to_owned()))?;

            let mut prescriptions = Vec::with_capacity(medications.len());
            for (index, order) in medications.iter().enumerate() {
                let prescription = appointments::insert_prescription(
                    tx,
                    consultation.id,
                    order,
                    PrescriptionStatus::Issued,
                )
                .map_err(partial(format!(
                    "prescription {} of {}",
                    index + 1,
                    medications.len()
                )))?;
                prescriptions.push(prescription);
            }

            let appointment = Appointment {
                status: AppointmentStatus::Completed,
                ..appointment
            };
            Ok(CompletedAppointment {
                appointment,
                consultation,
                prescriptions,
            })
        });

        match &completed {
            Ok(done) => tracing::info!(
                appointment_id,
                consultation_id = done.consultation.id,
                prescriptions = done.prescriptions.len(),
                "appointment completed"
            ),
            Err(err @ ClinicError::PartialWriteFailure { .. }) => {
                tracing::error!(appointment_id, "completion rolled back: {err}")
            }
            Err(_) => {}
        }
        completed
    }

    /// Cancels a scheduled appointment.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the appointment does not exist; nothing is written.
    /// - `InvalidTransition` if the appointment is not `Scheduled`.
    pub fn cancel(&self, appointment_id: i64) -> ClinicResult<Appointment> {
        let appointment = self.db.unit_of_work(|tx| {
            let appointment = load_for_transition(tx, appointment_id, AppointmentStatus::Cancelled)?;
            appointments::update_appointment_status(tx, appointment_id, AppointmentStatus::Cancelled)?;
            Ok(Appointment {
                status: AppointmentStatus::Cancelled,
                ..appointment
            })
        })?;
        tracing::info!(appointment_id, "appointment cancelled");
        Ok(appointment)
    }

    /// Soft-deletes an appointment regardless of its status.
    pub fn delete(&self, appointment_id: i64) -> ClinicResult<()> {
        self.db
            .with_conn(|conn| appointments::soft_delete_appointment(conn, appointment_id))?;
        tracing::info!(appointment_id, "appointment deleted");
        Ok(())
    }

    /// Moves a prescription forward. Issued → Dispensed; repeating the current status is a
    /// no-op.
    pub fn update_prescription_status(
        &self,
        prescription_id: i64,
        status: PrescriptionStatus,
    ) -> ClinicResult<Prescription> {
        self.db.unit_of_work(|tx| {
            let current = appointments::find_prescription(tx, prescription_id)?
                .ok_or_else(|| ClinicError::not_found("prescription", prescription_id))?;
            if current.status == status {
                return Ok(current);
            }
            if !(current.status == PrescriptionStatus::Issued
                && status == PrescriptionStatus::Dispensed)
            {
                return Err(ClinicError::InvalidPrescriptionTransition {
                    from: current.status,
                    to: status,
                });
            }
            appointments::update_prescription_status(tx, prescription_id, status)?;
            Ok(Prescription { status, ..current })
        })
    }

    // ========================================================================
    // READS
    // ========================================================================

    pub fn find(&self, appointment_id: i64) -> ClinicResult<Appointment> {
        self.db
            .with_conn(|conn| appointments::find_appointment(conn, appointment_id))?
            .ok_or_else(|| ClinicError::not_found("appointment", appointment_id))
    }

    /// Appointments visible to `principal`, newest first.
    ///
    /// Admins see all; doctors see those they attend and those they booked as a patient;
    /// patients see their own.
    pub fn list_for(&self, principal: &Principal) -> ClinicResult<Vec<AppointmentDetail>> {
        let scope = match principal.role {
            Role::Admin => AppointmentScope::All,
            Role::Doctor => AppointmentScope::Participant(principal.id),
            Role::Patient => AppointmentScope::Patient(principal.id),
        };
        self.db
            .with_conn(|conn| appointments::list_appointment_details(conn, scope))
    }

    /// Prescriptions visible to `principal`, newest first.
    pub fn prescriptions_for(&self, principal: &Principal) -> ClinicResult<Vec<PrescriptionDetail>> {
        let scope = match principal.role {
            Role::Admin => PrescriptionScope::All,
            Role::Doctor => PrescriptionScope::Doctor(principal.id),
            Role::Patient => PrescriptionScope::Patient(principal.id),
        };
        self.db
            .with_conn(|conn| appointments::list_prescription_details(conn, scope))
    }

    /// Read-only composite of a patient's appointments and prescriptions.
    pub fn history(&self, patient_id: i64) -> ClinicResult<PatientHistory> {
        self.db.with_conn(|conn| {
            if profiles::find_patient_profile(conn, patient_id)?.is_none() {
                return Err(ClinicError::not_found("patient", patient_id));
            }
            Ok(PatientHistory {
                appointments: appointments::list_appointment_details(
                    conn,
                    AppointmentScope::Patient(patient_id),
                )?,
                prescriptions: appointments::list_prescription_details(
                    conn,
                    PrescriptionScope::Patient(patient_id),
                )?,
            })
        })
    }

    pub fn consultation(&self, appointment_id: i64) -> ClinicResult<(Consultation, Vec<Prescription>)> {
        self.db.with_conn(|conn| {
            let consultation = appointments::find_consultation_by_appointment(conn, appointment_id)?
                .ok_or_else(|| ClinicError::not_found("consultation", appointment_id))?;
            let prescriptions =
                appointments::list_prescriptions_by_consultation(conn, consultation.id)?;
            Ok((consultation, prescriptions))
        })
    }
}

fn load_for_transition(
    conn: &Connection,
    appointment_id: i64,
    next: AppointmentStatus,
) -> ClinicResult<Appointment> {
    let appointment = appointments::find_appointment(conn, appointment_id)?
        .ok_or_else(|| ClinicError::not_found("appointment", appointment_id))?;
    if !appointment.status.can_transition_to(next) {
        return Err(ClinicError::InvalidTransition {
            from: appointment.status,
            to: next,
        });
    }
    Ok(appointment)
}

fn slot_taken(doctor_id: i64, at: DateTime<Utc>) -> ClinicError {
    ClinicError::SlotTaken {
        doctor_id,
        at: appointment_instant(at),
    }
}

fn is_unique_violation(err: &ClinicError) -> bool {
    matches!(
        err,
        ClinicError::StoreFailure(rusqlite::Error::SqliteFailure(e, _))
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Identity;
    use crate::principal::{PrincipalResolver, UserService};
    use clinic_types::EmailAddress;

    struct Fixture {
        db: Database,
        lifecycle: AppointmentLifecycle,
        patient: Principal,
        doctor: Principal,
    }

    fn principal(db: &Database, email: &str, name: &str) -> Principal {
        PrincipalResolver::new(db.clone())
            .resolve(&Identity {
                email: EmailAddress::parse(email).unwrap(),
                subject: format!("sub-{name}"),
                name: name.into(),
                picture: String::new(),
            })
            .unwrap()
    }

    fn fixture() -> Fixture {
        let db = Database::open_in_memory().unwrap();
        let patient = principal(&db, "pat@example.com", "Pat");
        let doctor = principal(&db, "doc@example.com", "Doc");
        let doctor = UserService::new(db.clone())
            .set_role(doctor.id, Role::Doctor, None, Some("GP".into()))
            .unwrap();
        Fixture {
            lifecycle: AppointmentLifecycle::new(db.clone()),
            db,
            patient,
            doctor,
        }
    }

    fn count(db: &Database, sql: &str) -> i64 {
        db.with_conn(|conn| Ok(conn.query_row(sql, [], |r| r.get(0))?))
            .unwrap()
    }

    fn orders(names: &[&str]) -> Vec<MedicationOrder> {
        names
            .iter()
            .map(|m| MedicationOrder {
                medication: (*m).into(),
                dosage: "1 daily".into(),
            })
            .collect()
    }

    #[test]
    fn booking_date_formats() {
        let at = parse_booking_date("2025-03-10T09:00:00Z").unwrap();
        assert_eq!(appointment_instant(at), "2025-03-10T09:00:00Z");

        let offset = parse_booking_date("2025-03-10T10:00:00+01:00").unwrap();
        assert_eq!(offset, at);

        let local = parse_booking_date("2025-03-10T09:00").unwrap();
        assert_eq!(local, at);

        for bad in ["not-a-date", "", "2025-03-10", "10/03/2025 09:00"] {
            assert!(matches!(
                parse_booking_date(bad),
                Err(ClinicError::InvalidDate(_))
            ));
        }
    }

    #[test]
    fn book_creates_scheduled_appointment() {
        let f = fixture();
        let appt = f
            .lifecycle
            .book(f.patient.id, f.doctor.id, "2025-03-10T09:00:00Z")
            .unwrap();
        assert_eq!(appt.status, AppointmentStatus::Scheduled);
        assert_eq!(appt.patient_id, f.patient.id);
        assert_eq!(f.lifecycle.find(appt.id).unwrap(), appt);
    }

    #[test]
    fn book_rejects_bad_date_without_writing() {
        let f = fixture();
        let err = f
            .lifecycle
            .book(f.patient.id, f.doctor.id, "not-a-date")
            .unwrap_err();
        assert!(matches!(err, ClinicError::InvalidDate(_)));
        assert_eq!(count(&f.db, "SELECT COUNT(*) FROM appointments"), 0);
    }

    #[test]
    fn book_requires_both_profiles() {
        let f = fixture();
        let err = f
            .lifecycle
            .book(f.patient.id, f.patient.id, "2025-03-10T09:00:00Z")
            .unwrap_err();
        assert!(matches!(err, ClinicError::NotFound { entity: "doctor", .. }));

        let err = f
            .lifecycle
            .book(404, f.doctor.id, "2025-03-10T09:00:00Z")
            .unwrap_err();
        assert!(matches!(err, ClinicError::NotFound { entity: "patient", .. }));
    }

    #[test]
    fn double_booking_a_doctor_slot_is_rejected_until_cancelled() {
        let f = fixture();
        let first = f
            .lifecycle
            .book(f.patient.id, f.doctor.id, "2025-03-10T09:00:00Z")
            .unwrap();
        let err = f
            .lifecycle
            .book(f.patient.id, f.doctor.id, "2025-03-10T09:00")
            .unwrap_err();
        assert!(matches!(err, ClinicError::SlotTaken { .. }));

        f.lifecycle.cancel(first.id).unwrap();
        f.lifecycle
            .book(f.patient.id, f.doctor.id, "2025-03-10T09:00:00Z")
            .unwrap();
    }

    #[test]
    fn complete_writes_consultation_and_issued_prescriptions() {
        let f = fixture();
        let appt = f
            .lifecycle
            .book(f.patient.id, f.doctor.id, "2025-03-10T09:00:00Z")
            .unwrap();

        let done = f
            .lifecycle
            .complete(appt.id, "Flu", "Rest", &orders(&["Paracetamol", "Ibuprofen"]))
            .unwrap();

        assert_eq!(done.appointment.status, AppointmentStatus::Completed);
        assert_eq!(f.lifecycle.find(appt.id).unwrap().status, AppointmentStatus::Completed);
        assert_eq!(count(&f.db, "SELECT COUNT(*) FROM consultations"), 1);
        let (consultation, prescriptions) = f.lifecycle.consultation(appt.id).unwrap();
        assert_eq!(consultation, done.consultation);
        assert_eq!(prescriptions.len(), 2);
        assert!(prescriptions
            .iter()
            .all(|p| p.status == PrescriptionStatus::Issued && p.consultation_id == consultation.id));
    }

    #[test]
    fn failure_on_second_prescription_rolls_back_everything() {
        let f = fixture();
        let appt = f
            .lifecycle
            .book(f.patient.id, f.doctor.id, "2025-03-10T09:00:00Z")
            .unwrap();
        f.db.with_conn(|conn| {
            conn.execute_batch(
                "CREATE TRIGGER fail_second_prescription BEFORE INSERT ON prescriptions
                 WHEN (SELECT COUNT(*) FROM prescriptions
                       WHERE consultation_id = NEW.consultation_id) >= 1
                 BEGIN SELECT RAISE(ABORT, 'forced failure'); END;",
            )?;
            Ok(())
        })
        .unwrap();

        let err = f
            .lifecycle
            .complete(appt.id, "Flu", "", &orders(&["A", "B", "C"]))
            .unwrap_err();

        match err {
            ClinicError::PartialWriteFailure {
                appointment_id,
                step,
                ..
            } => {
                assert_eq!(appointment_id, appt.id);
                assert_eq!(step, "prescription 2 of 3");
            }
            other => panic!("expected PartialWriteFailure, got {other:?}"),
        }
        assert_eq!(f.lifecycle.find(appt.id).unwrap().status, AppointmentStatus::Scheduled);
        assert_eq!(count(&f.db, "SELECT COUNT(*) FROM consultations"), 0);
        assert_eq!(count(&f.db, "SELECT COUNT(*) FROM prescriptions"), 0);
    }

    #[test]
    fn terminal_states_do_not_transition() {
        let f = fixture();
        let done = f
            .lifecycle
            .book(f.patient.id, f.doctor.id, "2025-03-10T09:00:00Z")
            .unwrap();
        f.lifecycle.complete(done.id, "Ok", "", &[]).unwrap();
        assert!(matches!(
            f.lifecycle.cancel(done.id).unwrap_err(),
            ClinicError::InvalidTransition {
                from: AppointmentStatus::Completed,
                to: AppointmentStatus::Cancelled
            }
        ));
        assert!(matches!(
            f.lifecycle.complete(done.id, "Again", "", &[]).unwrap_err(),
            ClinicError::InvalidTransition { .. }
        ));

        let cancelled = f
            .lifecycle
            .book(f.patient.id, f.doctor.id, "2025-03-11T09:00:00Z")
            .unwrap();
        f.lifecycle.cancel(cancelled.id).unwrap();
        assert!(matches!(
            f.lifecycle.complete(cancelled.id, "Late", "", &[]).unwrap_err(),
            ClinicError::InvalidTransition { .. }
        ));
        assert_eq!(count(&f.db, "SELECT COUNT(*) FROM consultations"), 1);
    }

    #[test]
    fn cancelling_unknown_appointment_is_not_found_and_writes_nothing() {
        let f = fixture();
        let appt = f
            .lifecycle
            .book(f.patient.id, f.doctor.id, "2025-03-10T09:00:00Z")
            .unwrap();
        let err = f.lifecycle.cancel(appt.id + 100).unwrap_err();
        assert!(matches!(err, ClinicError::NotFound { entity: "appointment", .. }));
        assert_eq!(f.lifecycle.find(appt.id).unwrap(), appt);
    }

    #[test]
    fn complete_rejects_nameless_medication_before_writing() {
        let f = fixture();
        let appt = f
            .lifecycle
            .book(f.patient.id, f.doctor.id, "2025-03-10T09:00:00Z")
            .unwrap();
        let err = f
            .lifecycle
            .complete(appt.id, "Flu", "", &orders(&["A", "  "]))
            .unwrap_err();
        assert!(matches!(err, ClinicError::InvalidInput(_)));
        assert_eq!(f.lifecycle.find(appt.id).unwrap().status, AppointmentStatus::Scheduled);
    }

    #[test]
    fn delete_hides_appointment_regardless_of_status() {
        let f = fixture();
        let appt = f
            .lifecycle
            .book(f.patient.id, f.doctor.id, "2025-03-10T09:00:00Z")
            .unwrap();
        f.lifecycle.complete(appt.id, "Ok", "", &[]).unwrap();
        f.lifecycle.delete(appt.id).unwrap();
        assert!(matches!(
            f.lifecycle.find(appt.id).unwrap_err(),
            ClinicError::NotFound { .. }
        ));
        assert!(matches!(
            f.lifecycle.delete(appt.id).unwrap_err(),
            ClinicError::NotFound { .. }
        ));
    }

    #[test]
    fn history_lists_newest_first() {
        let f = fixture();
        let older = f
            .lifecycle
            .book(f.patient.id, f.doctor.id, "2025-03-10T09:00:00Z")
            .unwrap();
        let newer = f
            .lifecycle
            .book(f.patient.id, f.doctor.id, "2025-04-10T09:00:00Z")
            .unwrap();
        f.lifecycle
            .complete(older.id, "Flu", "", &orders(&["A"]))
            .unwrap();
        f.lifecycle
            .complete(newer.id, "Cold", "", &orders(&["B"]))
            .unwrap();

        let history = f.lifecycle.history(f.patient.id).unwrap();
        let ids: Vec<i64> = history.appointments.iter().map(|a| a.appointment.id).collect();
        assert_eq!(ids, vec![newer.id, older.id]);
        assert_eq!(history.appointments[0].doctor_name, "Doc");
        assert_eq!(history.appointments[0].specialization, "GP");

        let meds: Vec<&str> = history
            .prescriptions
            .iter()
            .map(|p| p.prescription.medication.as_str())
            .collect();
        assert_eq!(meds, vec!["B", "A"]);
        assert_eq!(history.prescriptions[0].diagnosis, "Cold");

        assert!(matches!(
            f.lifecycle.history(9_999).unwrap_err(),
            ClinicError::NotFound { .. }
        ));
    }

    #[test]
    fn listings_are_scoped_by_role() {
        let f = fixture();
        let other = principal(&f.db, "other@example.com", "Other");
        f.lifecycle
            .book(f.patient.id, f.doctor.id, "2025-03-10T09:00:00Z")
            .unwrap();
        f.lifecycle
            .book(other.id, f.doctor.id, "2025-03-10T10:00:00Z")
            .unwrap();

        assert_eq!(f.lifecycle.list_for(&f.patient).unwrap().len(), 1);
        assert_eq!(f.lifecycle.list_for(&other).unwrap().len(), 1);
        assert_eq!(f.lifecycle.list_for(&f.doctor).unwrap().len(), 2);

        let admin = Principal {
            role: Role::Admin,
            ..other.clone()
        };
        assert_eq!(f.lifecycle.list_for(&admin).unwrap().len(), 2);
    }

    #[test]
    fn prescription_status_moves_forward_only() {
        let f = fixture();
        let appt = f
            .lifecycle
            .book(f.patient.id, f.doctor.id, "2025-03-10T09:00:00Z")
            .unwrap();
        let done = f
            .lifecycle
            .complete(appt.id, "Flu", "", &orders(&["A"]))
            .unwrap();
        let id = done.prescriptions[0].id;

        let dispensed = f
            .lifecycle
            .update_prescription_status(id, PrescriptionStatus::Dispensed)
            .unwrap();
        assert_eq!(dispensed.status, PrescriptionStatus::Dispensed);
        // Repeat is a no-op.
        f.lifecycle
            .update_prescription_status(id, PrescriptionStatus::Dispensed)
            .unwrap();
        assert!(matches!(
            f.lifecycle
                .update_prescription_status(id, PrescriptionStatus::Issued)
                .unwrap_err(),
            ClinicError::InvalidPrescriptionTransition { .. }
        ));

        let listed = f.lifecycle.prescriptions_for(&f.patient).unwrap();
        assert_eq!(listed[0].prescription.status, PrescriptionStatus::Dispensed);
        assert_eq!(f.lifecycle.prescriptions_for(&f.doctor).unwrap().len(), 1);
    }
}
