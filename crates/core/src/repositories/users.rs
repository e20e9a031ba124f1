//! Principal (user) rows.

use crate::db::{now, parse_timestamp};
use crate::error::{ClinicError, ClinicResult};
use crate::models::{Identity, Principal, Role};
use clinic_types::EmailAddress;
use rusqlite::{params, Connection, OptionalExtension, Row};

const USER_COLUMNS: &str = "id, email, subject, name, picture, role, created_at, updated_at";

struct UserRow {
    id: i64,
    email: String,
    subject: String,
    name: String,
    picture: String,
    role: String,
    created_at: String,
    updated_at: String,
}

impl UserRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            email: row.get(1)?,
            subject: row.get(2)?,
            name: row.get(3)?,
            picture: row.get(4)?,
            role: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }

    fn into_principal(self) -> ClinicResult<Principal> {
        Ok(Principal {
            id: self.id,
            email: EmailAddress::parse(&self.email)
                .map_err(|e| ClinicError::corrupt("user", e.to_string()))?,
            subject: self.subject,
            name: self.name,
            picture: self.picture,
            role: self
                .role
                .parse()
                .map_err(|e: ClinicError| ClinicError::corrupt("user", e.to_string()))?,
            created_at: parse_timestamp("user", &self.created_at)?,
            updated_at: parse_timestamp("user", &self.updated_at)?,
        })
    }
}

pub fn find_user_by_email(conn: &Connection, email: &str) -> ClinicResult<Option<Principal>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1 AND deleted_at IS NULL");
    conn.query_row(&sql, params![email], UserRow::read)
        .optional()?
        .map(UserRow::into_principal)
        .transpose()
}

pub fn find_user(conn: &Connection, id: i64) -> ClinicResult<Option<Principal>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1 AND deleted_at IS NULL");
    conn.query_row(&sql, params![id], UserRow::read)
        .optional()?
        .map(UserRow::into_principal)
        .transpose()
}

pub fn list_users(conn: &Connection) -> ClinicResult<Vec<Principal>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE deleted_at IS NULL ORDER BY id");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], UserRow::read)?;
    rows.map(|r| r?.into_principal()).collect()
}

/// Inserts a principal for a first-seen identity and returns the stored row.
pub fn insert_user(conn: &Connection, identity: &Identity, role: Role) -> ClinicResult<Principal> {
    let stamp = now();
    conn.execute(
        "INSERT INTO users (email, subject, name, picture, role, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
        params![
            identity.email.as_str(),
            identity.subject,
            identity.name,
            identity.picture,
            role.as_str(),
            stamp,
        ],
    )?;
    let id = conn.last_insert_rowid();
    find_user(conn, id)?.ok_or_else(|| ClinicError::not_found("user", id))
}

/// Persists the mutable profile fields (name, picture, subject). Email and role are untouched.
pub fn update_user_profile(conn: &Connection, principal: &Principal) -> ClinicResult<()> {
    let changed = conn.execute(
        "UPDATE users SET name = ?1, picture = ?2, subject = ?3, updated_at = ?4
         WHERE id = ?5 AND deleted_at IS NULL",
        params![
            principal.name,
            principal.picture,
            principal.subject,
            now(),
            principal.id
        ],
    )?;
    if changed == 0 {
        return Err(ClinicError::not_found("user", principal.id));
    }
    Ok(())
}

pub fn update_user_role(conn: &Connection, id: i64, role: Role) -> ClinicResult<()> {
    let changed = conn.execute(
        "UPDATE users SET role = ?1, updated_at = ?2 WHERE id = ?3 AND deleted_at IS NULL",
        params![role.as_str(), now(), id],
    )?;
    if changed == 0 {
        return Err(ClinicError::not_found("user", id));
    }
    Ok(())
}
