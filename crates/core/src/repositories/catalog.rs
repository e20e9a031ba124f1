//! Departments, and the joined doctor/patient listings.

use super::profiles::parse_birth_date;
use crate::db::now;
use crate::error::{ClinicError, ClinicResult};
use crate::models::{Department, Doctor, DoctorProfile, Patient, PatientProfile};
use rusqlite::{params, Connection, OptionalExtension, Row};

fn department_from_row(row: &Row<'_>) -> rusqlite::Result<Department> {
    Ok(Department {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
    })
}

pub fn list_departments(conn: &Connection) -> ClinicResult<Vec<Department>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, description FROM departments WHERE deleted_at IS NULL ORDER BY name",
    )?;
    let rows = stmt.query_map([], department_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn find_department(conn: &Connection, id: i64) -> ClinicResult<Option<Department>> {
    Ok(conn
        .query_row(
            "SELECT id, name, description FROM departments WHERE id = ?1 AND deleted_at IS NULL",
            params![id],
            department_from_row,
        )
        .optional()?)
}

pub fn insert_department(conn: &Connection, name: &str, description: &str) -> ClinicResult<Department> {
    let stamp = now();
    conn.execute(
        "INSERT INTO departments (name, description, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
        params![name, description, stamp],
    )?;
    Ok(Department {
        id: conn.last_insert_rowid(),
        name: name.to_owned(),
        description: description.to_owned(),
    })
}

pub fn update_department(conn: &Connection, department: &Department) -> ClinicResult<()> {
    let changed = conn.execute(
        "UPDATE departments SET name = ?1, description = ?2, updated_at = ?3
         WHERE id = ?4 AND deleted_at IS NULL",
        params![department.name, department.description, now(), department.id],
    )?;
    if changed == 0 {
        return Err(ClinicError::not_found("department", department.id));
    }
    Ok(())
}

pub fn soft_delete_department(conn: &Connection, id: i64) -> ClinicResult<()> {
    let changed = conn.execute(
        "UPDATE departments SET deleted_at = ?1 WHERE id = ?2 AND deleted_at IS NULL",
        params![now(), id],
    )?;
    if changed == 0 {
        return Err(ClinicError::not_found("department", id));
    }
    Ok(())
}

pub fn list_doctors(conn: &Connection) -> ClinicResult<Vec<Doctor>> {
    let mut stmt = conn.prepare(
        "SELECT d.id, d.department_id, d.specialization, u.name, u.email, u.picture,
                dep.id, dep.name, dep.description
         FROM doctors d
         JOIN users u ON u.id = d.id AND u.deleted_at IS NULL
         LEFT JOIN departments dep ON dep.id = d.department_id AND dep.deleted_at IS NULL
         WHERE d.deleted_at IS NULL
         ORDER BY u.name, d.id",
    )?;
    let rows = stmt.query_map([], |row| {
        let department = match row.get::<_, Option<i64>>(6)? {
            Some(id) => Some(Department {
                id,
                name: row.get(7)?,
                description: row.get(8)?,
            }),
            None => None,
        };
        Ok(Doctor {
            profile: DoctorProfile {
                id: row.get(0)?,
                department_id: row.get(1)?,
                specialization: row.get(2)?,
            },
            name: row.get(3)?,
            email: row.get(4)?,
            picture: row.get(5)?,
            department,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

const PATIENT_SELECT: &str = "SELECT p.id, p.date_of_birth, p.gender, u.name, u.email, u.picture
     FROM patients p
     JOIN users u ON u.id = p.id AND u.deleted_at IS NULL
     WHERE p.deleted_at IS NULL";

type PatientRow = (i64, Option<String>, String, String, String, String);

fn patient_row(row: &Row<'_>) -> rusqlite::Result<PatientRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn patient_from_row((id, dob, gender, name, email, picture): PatientRow) -> ClinicResult<Patient> {
    Ok(Patient {
        profile: PatientProfile {
            id,
            date_of_birth: parse_birth_date(dob)?,
            gender,
        },
        name,
        email,
        picture,
    })
}

/// Patients whose principal currently holds the patient role.
pub fn list_patients(conn: &Connection) -> ClinicResult<Vec<Patient>> {
    let sql = format!("{PATIENT_SELECT} AND u.role = 'patient' ORDER BY u.name, p.id");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], patient_row)?;
    rows.map(|r| patient_from_row(r?)).collect()
}

pub fn find_patient(conn: &Connection, id: i64) -> ClinicResult<Option<Patient>> {
    let sql = format!("{PATIENT_SELECT} AND p.id = ?1");
    conn.query_row(&sql, params![id], patient_row)
        .optional()?
        .map(patient_from_row)
        .transpose()
}
