use super::{action_regex, default_rules, resource_regex, RuleTable};
use crate::db::Database;
use crate::error::{ClinicError, ClinicResult};
use crate::models::Role;
use crate::repositories::policy::{self, StoredRule};

/// Outcome of a seeding pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SeedReport {
    /// Rows actually inserted.
    pub added: usize,
    /// Roles whose baseline rule was missing and whose defaults were applied.
    pub roles_seeded: Vec<Role>,
}

/// Durable rule storage. Writes happen at startup or from operator tooling only.
#[derive(Clone, Debug)]
pub struct PolicyStore {
    db: Database,
}

impl PolicyStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Adds one rule. Both patterns must compile; an identical triple is not duplicated.
    pub fn add(&self, role: Role, resource: &str, action: &str) -> ClinicResult<bool> {
        resource_regex(resource)
            .map_err(|e| ClinicError::InvalidInput(format!("resource pattern {resource:?}: {e}")))?;
        action_regex(action)
            .map_err(|e| ClinicError::InvalidInput(format!("action pattern {action:?}: {e}")))?;

        let rule = StoredRule::new(role.as_str(), resource, action);
        self.db.with_conn(|conn| policy::insert_rule_if_absent(conn, &rule))
    }

    pub fn remove(&self, role: Role, resource: &str, action: &str) -> ClinicResult<bool> {
        let rule = StoredRule::new(role.as_str(), resource, action);
        self.db.with_conn(|conn| policy::delete_rule(conn, &rule))
    }

    pub fn rules(&self) -> ClinicResult<Vec<StoredRule>> {
        self.db.with_conn(policy::list_rules)
    }

    /// Applies the default rules for every role whose baseline rule is absent.
    ///
    /// Runs as one unit of work, so a failure leaves the stored rule set as it was.
    pub fn seed_defaults(&self) -> ClinicResult<SeedReport> {
        let report = self.db.unit_of_work(|tx| {
            let mut report = SeedReport::default();
            for role in Role::ALL {
                let defaults = default_rules(role);
                let Some(baseline) = defaults.first() else {
                    continue;
                };
                if policy::rule_exists(tx, baseline)? {
                    continue;
                }
                for rule in &defaults {
                    if policy::insert_rule_if_absent(tx, rule)? {
                        report.added += 1;
                    }
                }
                report.roles_seeded.push(role);
            }
            Ok(report)
        })?;

        if report.roles_seeded.is_empty() {
            tracing::info!("policy already seeded");
        } else {
            tracing::info!(
                added = report.added,
                roles = ?report.roles_seeded,
                "seeded default policy rules"
            );
        }
        Ok(report)
    }

    /// Compiles the stored rule set into an in-memory table.
    pub fn load(&self) -> ClinicResult<RuleTable> {
        let table = RuleTable::from_rules(self.rules()?);
        tracing::info!(rules = table.len(), "policy rules loaded");
        Ok(table)
    }

    /// Seeds, then loads. Must complete before the gate serves traffic.
    pub fn bootstrap(&self) -> ClinicResult<RuleTable> {
        self.seed_defaults()?;
        self.load()
    }
}
