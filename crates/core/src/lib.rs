//! # Clinic Core
//!
//! Core business logic for the clinic backend.
//!
//! This crate owns the store and every rule that governs it:
//! - principals and their role profiles ([`PrincipalResolver`], [`UserService`])
//! - the deny-by-default role policy ([`policy`])
//! - the appointment lifecycle ([`AppointmentLifecycle`])
//! - the department, doctor and patient catalogue ([`CatalogService`])
//!
//! **No API concerns**: token verification, HTTP routing and response mapping belong in
//! `api-shared` and `api-rest`.

pub mod catalog;
pub mod config;
pub mod constants;
pub mod db;
pub mod error;
pub mod lifecycle;
pub mod models;
pub mod policy;
pub mod principal;
pub mod repositories;

pub use catalog::CatalogService;
pub use config::{CoreConfig, Environment};
pub use db::{CancelFlag, Database};
pub use error::{ClinicError, ClinicResult};
pub use lifecycle::{parse_booking_date, AppointmentLifecycle, CompletedAppointment};
pub use models::*;
pub use policy::{Enforcer, PolicyStore, RuleTable};
pub use principal::{PrincipalResolver, UserService};

pub use clinic_types::{EmailAddress, NonEmptyText, TextError};

/// Every core service over one shared store handle.
#[derive(Clone, Debug)]
pub struct Clinic {
    pub db: Database,
    pub principals: PrincipalResolver,
    pub users: UserService,
    pub policy: PolicyStore,
    pub lifecycle: AppointmentLifecycle,
    pub catalog: CatalogService,
}

impl Clinic {
    /// Opens the configured database, applying the schema.
    pub fn open(cfg: &CoreConfig) -> ClinicResult<Self> {
        let db = Database::open(cfg.database_path(), cfg.store_timeout())?;
        tracing::info!(path = %cfg.database_path().display(), "clinic store opened");
        Ok(Self::with_database(db))
    }

    /// Services over the same store whose work is abandoned once `flag` is raised.
    pub fn cancellable(&self, flag: &CancelFlag) -> Self {
        Self::with_database(self.db.cancellable(flag))
    }

    pub fn with_database(db: Database) -> Self {
        Self {
            principals: PrincipalResolver::new(db.clone()),
            users: UserService::new(db.clone()),
            policy: PolicyStore::new(db.clone()),
            lifecycle: AppointmentLifecycle::new(db.clone()),
            catalog: CatalogService::new(db.clone()),
            db,
        }
    }
}
