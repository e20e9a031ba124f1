//! Appointment, consultation and prescription rows.
//!
//! These functions perform single statements. Compound transitions are composed by the
//! lifecycle engine inside a unit of work.

use crate::db::{appointment_instant, now, parse_timestamp};
use crate::error::{ClinicError, ClinicResult};
use crate::models::{
    Appointment, AppointmentDetail, AppointmentStatus, Consultation, MedicationOrder,
    Prescription, PrescriptionDetail, PrescriptionStatus,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

// ============================================================================
// APPOINTMENTS
// ============================================================================

const APPOINTMENT_COLUMNS: &str =
    "a.id, a.patient_id, a.doctor_id, a.appointment_date, a.status, a.created_at, a.updated_at";

struct AppointmentRow {
    id: i64,
    patient_id: i64,
    doctor_id: i64,
    appointment_date: String,
    status: String,
    created_at: String,
    updated_at: String,
}

impl AppointmentRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            patient_id: row.get(1)?,
            doctor_id: row.get(2)?,
            appointment_date: row.get(3)?,
            status: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }

    fn into_appointment(self) -> ClinicResult<Appointment> {
        Ok(Appointment {
            id: self.id,
            patient_id: self.patient_id,
            doctor_id: self.doctor_id,
            appointment_date: parse_timestamp("appointment", &self.appointment_date)?,
            status: self
                .status
                .parse()
                .map_err(|e: ClinicError| ClinicError::corrupt("appointment", e.to_string()))?,
            created_at: parse_timestamp("appointment", &self.created_at)?,
            updated_at: parse_timestamp("appointment", &self.updated_at)?,
        })
    }
}

pub fn insert_appointment(
    conn: &Connection,
    patient_id: i64,
    doctor_id: i64,
    at: DateTime<Utc>,
) -> ClinicResult<Appointment> {
    let stamp = now();
    conn.execute(
        "INSERT INTO appointments (patient_id, doctor_id, appointment_date, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
        params![
            patient_id,
            doctor_id,
            appointment_instant(at),
            AppointmentStatus::Scheduled.as_str(),
            stamp
        ],
    )?;
    let id = conn.last_insert_rowid();
    find_appointment(conn, id)?.ok_or_else(|| ClinicError::not_found("appointment", id))
}

pub fn find_appointment(conn: &Connection, id: i64) -> ClinicResult<Option<Appointment>> {
    let sql = format!(
        "SELECT {APPOINTMENT_COLUMNS} FROM appointments a WHERE a.id = ?1 AND a.deleted_at IS NULL"
    );
    conn.query_row(&sql, params![id], AppointmentRow::read)
        .optional()?
        .map(AppointmentRow::into_appointment)
        .transpose()
}

pub fn update_appointment_status(
    conn: &Connection,
    id: i64,
    status: AppointmentStatus,
) -> ClinicResult<()> {
    let changed = conn.execute(
        "UPDATE appointments SET status = ?1, updated_at = ?2 WHERE id = ?3 AND deleted_at IS NULL",
        params![status.as_str(), now(), id],
    )?;
    if changed == 0 {
        return Err(ClinicError::not_found("appointment", id));
    }
    Ok(())
}

pub fn soft_delete_appointment(conn: &Connection, id: i64) -> ClinicResult<()> {
    let changed = conn.execute(
        "UPDATE appointments SET deleted_at = ?1 WHERE id = ?2 AND deleted_at IS NULL",
        params![now(), id],
    )?;
    if changed == 0 {
        return Err(ClinicError::not_found("appointment", id));
    }
    Ok(())
}

/// Whether the doctor already holds a live appointment at exactly this instant.
pub fn doctor_slot_taken(conn: &Connection, doctor_id: i64, at: DateTime<Utc>) -> ClinicResult<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM appointments
         WHERE doctor_id = ?1 AND appointment_date = ?2
           AND deleted_at IS NULL AND status <> ?3",
        params![
            doctor_id,
            appointment_instant(at),
            AppointmentStatus::Cancelled.as_str()
        ],
        |r| r.get(0),
    )?;
    Ok(count > 0)
}

/// Which appointments a listing covers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AppointmentScope {
    All,
    Patient(i64),
    Doctor(i64),
    /// Either side of the appointment.
    Participant(i64),
}

pub fn list_appointment_details(
    conn: &Connection,
    scope: AppointmentScope,
) -> ClinicResult<Vec<AppointmentDetail>> {
    let (filter, id) = match scope {
        AppointmentScope::All => ("?1 IS NULL", None),
        AppointmentScope::Patient(id) => ("a.patient_id = ?1", Some(id)),
        AppointmentScope::Doctor(id) => ("a.doctor_id = ?1", Some(id)),
        AppointmentScope::Participant(id) => ("a.patient_id = ?1 OR a.doctor_id = ?1", Some(id)),
    };
    let sql = format!(
        "SELECT {APPOINTMENT_COLUMNS},
                COALESCE(pu.name, ''), COALESCE(du.name, ''), COALESCE(d.specialization, ''),
                dep.name
         FROM appointments a
         LEFT JOIN users pu ON pu.id = a.patient_id
         LEFT JOIN doctors d ON d.id = a.doctor_id
         LEFT JOIN users du ON du.id = a.doctor_id
         LEFT JOIN departments dep ON dep.id = d.department_id AND dep.deleted_at IS NULL
         WHERE a.deleted_at IS NULL AND ({filter})
         ORDER BY a.appointment_date DESC, a.id DESC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![id], |row| {
        Ok((
            AppointmentRow::read(row)?,
            row.get::<_, String>(7)?,
            row.get::<_, String>(8)?,
            row.get::<_, String>(9)?,
            row.get::<_, Option<String>>(10)?,
        ))
    })?;

    rows.map(|r| {
        let (appointment, patient_name, doctor_name, specialization, department) = r?;
        Ok(AppointmentDetail {
            appointment: appointment.into_appointment()?,
            patient_name,
            doctor_name,
            specialization,
            department,
        })
    })
    .collect()
}

// ============================================================================
// CONSULTATIONS
// ============================================================================

pub fn insert_consultation(
    conn: &Connection,
    appointment_id: i64,
    diagnosis: &str,
    notes: &str,
) -> ClinicResult<Consultation> {
    let date = Utc::now();
    let stamp = crate::db::timestamp(date);
    conn.execute(
        "INSERT INTO consultations (appointment_id, diagnosis, notes, date, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?4, ?4)",
        params![appointment_id, diagnosis, notes, stamp],
    )?;
    Ok(Consultation {
        id: conn.last_insert_rowid(),
        appointment_id,
        diagnosis: diagnosis.to_owned(),
        notes: notes.to_owned(),
        date,
    })
}

pub fn find_consultation_by_appointment(
    conn: &Connection,
    appointment_id: i64,
) -> ClinicResult<Option<Consultation>> {
    let row = conn
        .query_row(
            "SELECT id, appointment_id, diagnosis, notes, date FROM consultations
             WHERE appointment_id = ?1 AND deleted_at IS NULL",
            params![appointment_id],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            },
        )
        .optional()?;

    row.map(|(id, appointment_id, diagnosis, notes, date)| {
        Ok(Consultation {
            id,
            appointment_id,
            diagnosis,
            notes,
            date: parse_timestamp("consultation", &date)?,
        })
    })
    .transpose()
}

// ============================================================================
// PRESCRIPTIONS
// ============================================================================

const PRESCRIPTION_COLUMNS: &str =
    "p.id, p.consultation_id, p.medication, p.dosage, p.status, p.created_at";

struct PrescriptionRow {
    id: i64,
    consultation_id: i64,
    medication: String,
    dosage: String,
    status: String,
    created_at: String,
}

impl PrescriptionRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            consultation_id: row.get(1)?,
            medication: row.get(2)?,
            dosage: row.get(3)?,
            status: row.get(4)?,
            created_at: row.get(5)?,
        })
    }

    fn into_prescription(self) -> ClinicResult<Prescription> {
        Ok(Prescription {
            id: self.id,
            consultation_id: self.consultation_id,
            medication: self.medication,
            dosage: self.dosage,
            status: self
                .status
                .parse()
                .map_err(|e: ClinicError| ClinicError::corrupt("prescription", e.to_string()))?,
            created_at: parse_timestamp("prescription", &self.created_at)?,
        })
    }
}

pub fn insert_prescription(
    conn: &Connection,
    consultation_id: i64,
    order: &MedicationOrder,
    status: PrescriptionStatus,
) -> ClinicResult<Prescription> {
    let created_at = Utc::now();
    let stamp = crate::db::timestamp(created_at);
    conn.execute(
        "INSERT INTO prescriptions (consultation_id, medication, dosage, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
        params![
            consultation_id,
            order.medication,
            order.dosage,
            status.as_str(),
            stamp
        ],
    )?;
    Ok(Prescription {
        id: conn.last_insert_rowid(),
        consultation_id,
        medication: order.medication.clone(),
        dosage: order.dosage.clone(),
        status,
        created_at,
    })
}

pub fn find_prescription(conn: &Connection, id: i64) -> ClinicResult<Option<Prescription>> {
    let sql = format!(
        "SELECT {PRESCRIPTION_COLUMNS} FROM prescriptions p WHERE p.id = ?1 AND p.deleted_at IS NULL"
    );
    conn.query_row(&sql, params![id], PrescriptionRow::read)
        .optional()?
        .map(PrescriptionRow::into_prescription)
        .transpose()
}

pub fn list_prescriptions_by_consultation(
    conn: &Connection,
    consultation_id: i64,
) -> ClinicResult<Vec<Prescription>> {
    let sql = format!(
        "SELECT {PRESCRIPTION_COLUMNS} FROM prescriptions p
         WHERE p.consultation_id = ?1 AND p.deleted_at IS NULL ORDER BY p.id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![consultation_id], PrescriptionRow::read)?;
    rows.map(|r| r?.into_prescription()).collect()
}

pub fn update_prescription_status(
    conn: &Connection,
    id: i64,
    status: PrescriptionStatus,
) -> ClinicResult<()> {
    let changed = conn.execute(
        "UPDATE prescriptions SET status = ?1, updated_at = ?2 WHERE id = ?3 AND deleted_at IS NULL",
        params![status.as_str(), now(), id],
    )?;
    if changed == 0 {
        return Err(ClinicError::not_found("prescription", id));
    }
    Ok(())
}

/// Whose prescriptions a listing covers, joined through consultation to appointment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PrescriptionScope {
    All,
    Patient(i64),
    Doctor(i64),
}

/// Prescriptions newest first.
pub fn list_prescription_details(
    conn: &Connection,
    scope: PrescriptionScope,
) -> ClinicResult<Vec<PrescriptionDetail>> {
    let (filter, id) = match scope {
        PrescriptionScope::All => ("?1 IS NULL", None),
        PrescriptionScope::Patient(id) => ("a.patient_id = ?1", Some(id)),
        PrescriptionScope::Doctor(id) => ("a.doctor_id = ?1", Some(id)),
    };
    let sql = format!(
        "SELECT {PRESCRIPTION_COLUMNS}, a.id, c.diagnosis, COALESCE(du.name, '')
         FROM prescriptions p
         JOIN consultations c ON c.id = p.consultation_id AND c.deleted_at IS NULL
         JOIN appointments a ON a.id = c.appointment_id AND a.deleted_at IS NULL
         LEFT JOIN users du ON du.id = a.doctor_id
         WHERE p.deleted_at IS NULL AND ({filter})
         ORDER BY p.created_at DESC, p.id DESC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![id], |row| {
        Ok((
            PrescriptionRow::read(row)?,
            row.get::<_, i64>(6)?,
            row.get::<_, String>(7)?,
            row.get::<_, String>(8)?,
        ))
    })?;

    rows.map(|r| {
        let (prescription, appointment_id, diagnosis, doctor_name) = r?;
        Ok(PrescriptionDetail {
            prescription: prescription.into_prescription()?,
            appointment_id,
            diagnosis,
            doctor_name,
        })
    })
    .collect()
}
