//! Pattern compilation and the in-memory rule table.

use super::Enforcer;
use crate::error::{ClinicError, ClinicResult};
use crate::models::Role;
use crate::repositories::policy::StoredRule;
use regex::Regex;
use std::collections::HashMap;

/// Compiles a resource pattern into an anchored regular expression.
///
/// Path-template syntax: a `:name` segment matches exactly one path segment, `*` matches any
/// run of characters (including `/`), everything else matches literally. A pattern starting
/// with `^` is taken verbatim as a regular expression.
pub fn resource_regex(pattern: &str) -> Result<Regex, regex::Error> {
    if pattern.starts_with('^') {
        return Regex::new(pattern);
    }

    let translated: Vec<String> = pattern
        .split('/')
        .map(|segment| {
            if segment.len() > 1 && segment.starts_with(':') {
                "[^/]+".to_string()
            } else {
                segment
                    .split('*')
                    .map(regex::escape)
                    .collect::<Vec<_>>()
                    .join(".*")
            }
        })
        .collect();

    Regex::new(&format!("^{}$", translated.join("/")))
}

/// Compiles an action pattern, matched against the whole HTTP verb.
pub fn action_regex(pattern: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!("^(?:{pattern})$"))
}

#[derive(Clone, Debug)]
enum Matcher {
    Valid { resource: Regex, action: Regex },
    /// Kept so a single bad stored row cannot prevent startup; evaluating it is an error.
    Invalid { reason: String },
}

/// A stored rule paired with its compiled matcher.
#[derive(Clone, Debug)]
pub struct CompiledRule {
    rule: StoredRule,
    matcher: Matcher,
}

impl CompiledRule {
    pub fn compile(rule: StoredRule) -> Self {
        let matcher = match (resource_regex(&rule.resource), action_regex(&rule.action)) {
            (Ok(resource), Ok(action)) => Matcher::Valid { resource, action },
            (Err(e), _) | (_, Err(e)) => Matcher::Invalid {
                reason: e.to_string(),
            },
        };
        Self { rule, matcher }
    }

    pub fn rule(&self) -> &StoredRule {
        &self.rule
    }

    pub fn is_valid(&self) -> bool {
        matches!(self.matcher, Matcher::Valid { .. })
    }

    fn matches(&self, resource: &str, action: &str) -> ClinicResult<bool> {
        match &self.matcher {
            Matcher::Valid {
                resource: resource_re,
                action: action_re,
            } => Ok(resource_re.is_match(resource) && action_re.is_match(action)),
            Matcher::Invalid { reason } => Err(ClinicError::PolicyEvalError(format!(
                "rule ({}, {}, {}) cannot be evaluated: {reason}",
                self.rule.role, self.rule.resource, self.rule.action
            ))),
        }
    }
}

/// Immutable, per-role compiled rule set. Built once, then only read.
#[derive(Clone, Debug, Default)]
pub struct RuleTable {
    rules: HashMap<Role, Vec<CompiledRule>>,
}

impl RuleTable {
    /// Compiles stored rules, preserving their order within each role.
    ///
    /// Rows naming a role no principal can hold are skipped with a warning.
    pub fn from_rules(rules: impl IntoIterator<Item = StoredRule>) -> Self {
        let mut table: HashMap<Role, Vec<CompiledRule>> = HashMap::new();
        for rule in rules {
            let role = match rule.role.parse::<Role>() {
                Ok(role) => role,
                Err(_) => {
                    tracing::warn!(
                        role = %rule.role,
                        resource = %rule.resource,
                        "skipping policy rule for unknown role"
                    );
                    continue;
                }
            };
            let compiled = CompiledRule::compile(rule);
            if !compiled.is_valid() {
                tracing::warn!(rule = ?compiled.rule(), "policy rule has an invalid pattern");
            }
            table.entry(role).or_default().push(compiled);
        }
        Self { rules: table }
    }

    pub fn rules_for(&self, role: Role) -> &[CompiledRule] {
        self.rules.get(&role).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.rules.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Enforcer for RuleTable {
    fn enforce(&self, role: Role, resource: &str, action: &str) -> ClinicResult<bool> {
        for rule in self.rules_for(role) {
            if rule.matches(resource, action)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::default_rules;

    fn seeded_table() -> RuleTable {
        RuleTable::from_rules(Role::ALL.into_iter().flat_map(default_rules))
    }

    #[test]
    fn empty_rule_set_denies_everything() {
        let table = RuleTable::default();
        for role in Role::ALL {
            for (path, verb) in [("/api/v1/profile", "GET"), ("/", "POST"), ("", "")] {
                assert!(!table.enforce(role, path, verb).unwrap());
            }
        }
    }

    #[test]
    fn admin_wildcard_allows_any_api_verb() {
        let table = seeded_table();
        for verb in ["GET", "PUT", "POST", "DELETE"] {
            assert!(table.enforce(Role::Admin, "/api/v1/anything", verb).unwrap());
        }
        assert!(!table.enforce(Role::Admin, "/internal/metrics", "GET").unwrap());
    }

    #[test]
    fn parameter_segments_match_one_segment() {
        let table = seeded_table();
        assert!(table
            .enforce(Role::Doctor, "/api/v1/appointments/42/complete", "PUT")
            .unwrap());
        assert!(!table
            .enforce(Role::Doctor, "/api/v1/appointments/42/extra/complete", "PUT")
            .unwrap());
        assert!(!table
            .enforce(Role::Doctor, "/api/v1/appointments//complete", "PUT")
            .unwrap());
    }

    #[test]
    fn action_pattern_matches_whole_verb() {
        let table = seeded_table();
        assert!(table.enforce(Role::Patient, "/api/v1/appointments", "POST").unwrap());
        assert!(!table.enforce(Role::Patient, "/api/v1/appointments", "DELETE").unwrap());
        assert!(!table.enforce(Role::Patient, "/api/v1/appointments", "GETX").unwrap());
        assert!(!table.enforce(Role::Doctor, "/api/v1/appointments", "POST").unwrap());
    }

    #[test]
    fn patients_cannot_reach_admin_routes() {
        let table = seeded_table();
        assert!(!table.enforce(Role::Patient, "/api/v1/users", "GET").unwrap());
        assert!(!table.enforce(Role::Patient, "/api/v1/users/3/role", "PUT").unwrap());
    }

    #[test]
    fn literal_characters_are_escaped() {
        let re = resource_regex("/api/v1/a.b").unwrap();
        assert!(re.is_match("/api/v1/a.b"));
        assert!(!re.is_match("/api/v1/aXb"));
    }

    #[test]
    fn caret_prefix_is_a_raw_regex() {
        let re = resource_regex(r"^/api/v1/appointments/\d+$").unwrap();
        assert!(re.is_match("/api/v1/appointments/7"));
        assert!(!re.is_match("/api/v1/appointments/x"));
    }

    #[test]
    fn invalid_rule_is_an_evaluation_error_not_a_deny() {
        let table = RuleTable::from_rules([StoredRule::new("doctor", "/api/v1/profile", "(GET")]);
        let err = table
            .enforce(Role::Doctor, "/api/v1/profile", "GET")
            .unwrap_err();
        assert!(matches!(err, ClinicError::PolicyEvalError(_)));
        // Other roles are unaffected.
        assert!(!table.enforce(Role::Patient, "/api/v1/profile", "GET").unwrap());
    }

    #[test]
    fn unknown_roles_are_skipped() {
        let table = RuleTable::from_rules([StoredRule::new("nurse", "/api/v1/*", ".*")]);
        assert!(table.is_empty());
    }
}
