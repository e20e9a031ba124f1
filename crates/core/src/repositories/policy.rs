//! Durable policy rule rows.

use crate::error::ClinicResult;
use rusqlite::{params, Connection};

/// Raw `(role, resource, action)` triple as stored.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StoredRule {
    pub role: String,
    pub resource: String,
    pub action: String,
}

impl StoredRule {
    pub fn new(role: impl Into<String>, resource: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            resource: resource.into(),
            action: action.into(),
        }
    }
}

/// All rules in insertion order.
pub fn list_rules(conn: &Connection) -> ClinicResult<Vec<StoredRule>> {
    let mut stmt = conn.prepare("SELECT role, resource, action FROM policy_rules ORDER BY id")?;
    let rows = stmt.query_map([], |row| {
        Ok(StoredRule {
            role: row.get(0)?,
            resource: row.get(1)?,
            action: row.get(2)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn rule_exists(conn: &Connection, rule: &StoredRule) -> ClinicResult<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM policy_rules WHERE role = ?1 AND resource = ?2 AND action = ?3",
        params![rule.role, rule.resource, rule.action],
        |r| r.get(0),
    )?;
    Ok(count > 0)
}

/// Appends a rule unless the exact triple is already stored. Returns whether a row was added.
pub fn insert_rule_if_absent(conn: &Connection, rule: &StoredRule) -> ClinicResult<bool> {
    let added = conn.execute(
        "INSERT OR IGNORE INTO policy_rules (role, resource, action) VALUES (?1, ?2, ?3)",
        params![rule.role, rule.resource, rule.action],
    )?;
    Ok(added > 0)
}

pub fn delete_rule(conn: &Connection, rule: &StoredRule) -> ClinicResult<bool> {
    let removed = conn.execute(
        "DELETE FROM policy_rules WHERE role = ?1 AND resource = ?2 AND action = ?3",
        params![rule.role, rule.resource, rule.action],
    )?;
    Ok(removed > 0)
}
