use crate::models::Role;
use crate::repositories::policy::StoredRule;

/// Baseline rules for a role. The first entry is the role's baseline rule: when it is
/// missing from the store the whole set is (re)applied, skipping triples already present.
pub fn default_rules(role: Role) -> Vec<StoredRule> {
    let entries: &[(&str, &str)] = match role {
        Role::Admin => &[
            ("/api/v1/*", ".*"),
            ("/api/v1/users", "(GET)|(PUT)"),
            ("/api/v1/users/:id/role", "(PUT)"),
        ],
        Role::Doctor => &[
            ("/api/v1/profile", "(GET)"),
            ("/api/v1/patients", "(GET)"),
            ("/api/v1/patients/:id/history", "(GET)"),
            ("/api/v1/appointments", "(GET)"),
            ("/api/v1/appointments/:id/complete", "(PUT)"),
            ("/api/v1/appointments/:id/cancel", "(PUT)"),
            ("/api/v1/appointments/:id/consultation", "(GET)"),
        ],
        Role::Patient => &[
            ("/api/v1/profile", "(GET)"),
            ("/api/v1/appointments", "(GET)|(POST)"),
            ("/api/v1/appointments/:id/cancel", "(PUT)"),
            ("/api/v1/appointments/:id/consultation", "(GET)"),
            ("/api/v1/prescriptions", "(GET)"),
            ("/api/v1/doctors", "(GET)"),
            ("/api/v1/departments", "(GET)"),
        ],
    };

    entries
        .iter()
        .map(|(resource, action)| StoredRule::new(role.as_str(), *resource, *action))
        .collect()
}
