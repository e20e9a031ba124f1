//! Deny-by-default role policy.
//!
//! Rules are `(role, resource-pattern, action-pattern)` triples. A request is allowed when
//! any rule for the principal's role matches both its path and its method; no match is a
//! deny, never an error.
//!
//! The durable rule set lives in the store ([`PolicyStore`]). At startup it is seeded and
//! compiled once into an immutable [`RuleTable`], which is then shared read-only across
//! requests behind the [`Enforcer`] seam.

mod defaults;
mod matcher;
mod store;

pub use defaults::default_rules;
pub use matcher::{action_regex, resource_regex, CompiledRule, RuleTable};
pub use store::{PolicyStore, SeedReport};

use crate::error::ClinicResult;
use crate::models::Role;

/// Single policy decision point.
///
/// `Ok(false)` is a clean deny. `Err` means the decision could not be made and must be
/// treated as a server fault, not as a deny.
pub trait Enforcer: Send + Sync {
    fn enforce(&self, role: Role, resource: &str, action: &str) -> ClinicResult<bool>;
}
