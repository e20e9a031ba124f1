//! Role profiles: the 1:1 doctor and patient extensions of a principal.

use crate::db::now;
use crate::error::{ClinicError, ClinicResult};
use crate::models::{DoctorProfile, PatientProfile};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};

pub fn find_doctor_profile(conn: &Connection, id: i64) -> ClinicResult<Option<DoctorProfile>> {
    Ok(conn
        .query_row(
            "SELECT id, department_id, specialization FROM doctors
             WHERE id = ?1 AND deleted_at IS NULL",
            params![id],
            |row| {
                Ok(DoctorProfile {
                    id: row.get(0)?,
                    department_id: row.get(1)?,
                    specialization: row.get(2)?,
                })
            },
        )
        .optional()?)
}

pub fn insert_doctor_profile(conn: &Connection, profile: &DoctorProfile) -> ClinicResult<()> {
    let stamp = now();
    conn.execute(
        "INSERT INTO doctors (id, department_id, specialization, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?4)",
        params![
            profile.id,
            profile.department_id,
            profile.specialization,
            stamp
        ],
    )?;
    Ok(())
}

pub fn update_doctor_profile(conn: &Connection, profile: &DoctorProfile) -> ClinicResult<()> {
    let changed = conn.execute(
        "UPDATE doctors SET department_id = ?1, specialization = ?2, updated_at = ?3
         WHERE id = ?4 AND deleted_at IS NULL",
        params![
            profile.department_id,
            profile.specialization,
            now(),
            profile.id
        ],
    )?;
    if changed == 0 {
        return Err(ClinicError::not_found("doctor", profile.id));
    }
    Ok(())
}

pub fn find_patient_profile(conn: &Connection, id: i64) -> ClinicResult<Option<PatientProfile>> {
    let row = conn
        .query_row(
            "SELECT id, date_of_birth, gender FROM patients WHERE id = ?1 AND deleted_at IS NULL",
            params![id],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, String>(2)?,
                ))
            },
        )
        .optional()?;

    row.map(|(id, dob, gender)| {
        Ok(PatientProfile {
            id,
            date_of_birth: parse_birth_date(dob)?,
            gender,
        })
    })
    .transpose()
}

/// Creates an empty patient profile keyed to the principal's id.
pub fn insert_empty_patient_profile(conn: &Connection, id: i64) -> ClinicResult<()> {
    let stamp = now();
    conn.execute(
        "INSERT INTO patients (id, created_at, updated_at) VALUES (?1, ?2, ?2)",
        params![id, stamp],
    )?;
    Ok(())
}

pub(crate) fn parse_birth_date(raw: Option<String>) -> ClinicResult<Option<NaiveDate>> {
    raw.map(|d| {
        NaiveDate::parse_from_str(&d, "%Y-%m-%d")
            .map_err(|e| ClinicError::corrupt("patient", format!("date_of_birth {d:?}: {e}")))
    })
    .transpose()
}
