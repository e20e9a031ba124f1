//! Departments, doctors and patients. Thin reads and writes with input checks.

use crate::db::Database;
use crate::error::{ClinicError, ClinicResult};
use crate::models::{Department, Doctor, Patient};
use crate::repositories::catalog;
use clinic_types::NonEmptyText;
use rusqlite::Connection;

#[derive(Clone, Debug)]
pub struct CatalogService {
    db: Database,
}

impl CatalogService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn departments(&self) -> ClinicResult<Vec<Department>> {
        self.db.with_conn(catalog::list_departments)
    }

    /// Creates a department. Names are unique among live departments.
    pub fn create_department(&self, name: &str, description: &str) -> ClinicResult<Department> {
        let name = department_name(name)?;
        self.db.unit_of_work(|tx| {
            ensure_name_free(tx, name.as_str(), None)?;
            catalog::insert_department(tx, name.as_str(), description.trim())
        })
    }

    pub fn update_department(
        &self,
        id: i64,
        name: &str,
        description: &str,
    ) -> ClinicResult<Department> {
        let department = Department {
            id,
            name: department_name(name)?.into_inner(),
            description: description.trim().to_owned(),
        };
        self.db.unit_of_work(|tx| {
            ensure_name_free(tx, &department.name, Some(id))?;
            catalog::update_department(tx, &department)
        })?;
        Ok(department)
    }

    pub fn delete_department(&self, id: i64) -> ClinicResult<()> {
        self.db
            .with_conn(|conn| catalog::soft_delete_department(conn, id))
    }

    pub fn doctors(&self) -> ClinicResult<Vec<Doctor>> {
        self.db.with_conn(catalog::list_doctors)
    }

    pub fn patients(&self) -> ClinicResult<Vec<Patient>> {
        self.db.with_conn(catalog::list_patients)
    }

    pub fn patient(&self, id: i64) -> ClinicResult<Patient> {
        self.db
            .with_conn(|conn| catalog::find_patient(conn, id))?
            .ok_or_else(|| ClinicError::not_found("patient", id))
    }
}

/// Live department names are unique, compared case-insensitively.
fn ensure_name_free(conn: &Connection, name: &str, except: Option<i64>) -> ClinicResult<()> {
    let taken = catalog::list_departments(conn)?
        .iter()
        .any(|d| Some(d.id) != except && d.name.eq_ignore_ascii_case(name));
    if taken {
        return Err(ClinicError::InvalidInput(format!(
            "department {name:?} already exists"
        )));
    }
    Ok(())
}

fn department_name(raw: &str) -> ClinicResult<NonEmptyText> {
    NonEmptyText::new(raw)
        .map_err(|_| ClinicError::InvalidInput("department name is required".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Identity, Role};
    use crate::principal::{PrincipalResolver, UserService};
    use clinic_types::EmailAddress;

    fn service() -> (Database, CatalogService) {
        let db = Database::open_in_memory().unwrap();
        (db.clone(), CatalogService::new(db))
    }

    fn sign_in(db: &Database, email: &str, name: &str) -> i64 {
        PrincipalResolver::new(db.clone())
            .resolve(&Identity {
                email: EmailAddress::parse(email).unwrap(),
                subject: String::new(),
                name: name.into(),
                picture: String::new(),
            })
            .unwrap()
            .id
    }

    #[test]
    fn department_crud() {
        let (_, catalog) = service();
        let cardio = catalog.create_department(" Cardiology ", "Hearts").unwrap();
        assert_eq!(cardio.name, "Cardiology");

        assert!(matches!(
            catalog.create_department("cardiology", "").unwrap_err(),
            ClinicError::InvalidInput(_)
        ));
        assert!(matches!(
            catalog.create_department("   ", "").unwrap_err(),
            ClinicError::InvalidInput(_)
        ));

        let renamed = catalog
            .update_department(cardio.id, "Cardiac care", "")
            .unwrap();
        assert_eq!(catalog.departments().unwrap(), vec![renamed]);

        catalog.delete_department(cardio.id).unwrap();
        assert!(catalog.departments().unwrap().is_empty());
        // The name is free again once the department is gone.
        catalog.create_department("Cardiac care", "").unwrap();
        assert!(matches!(
            catalog.delete_department(cardio.id).unwrap_err(),
            ClinicError::NotFound { .. }
        ));
    }

    #[test]
    fn doctors_carry_department_detail() {
        let (db, catalog) = service();
        let dept = catalog.create_department("Neurology", "").unwrap();
        let id = sign_in(&db, "doc@example.com", "Doc");
        UserService::new(db.clone())
            .set_role(id, Role::Doctor, Some(dept.id), Some("Neurologist".into()))
            .unwrap();

        let doctors = catalog.doctors().unwrap();
        assert_eq!(doctors.len(), 1);
        assert_eq!(doctors[0].name, "Doc");
        assert_eq!(doctors[0].department.as_ref(), Some(&dept));
    }

    #[test]
    fn patients_are_users_currently_holding_the_role() {
        let (db, catalog) = service();
        let pat = sign_in(&db, "pat@example.com", "Pat");
        let doc = sign_in(&db, "doc@example.com", "Doc");
        UserService::new(db.clone())
            .set_role(doc, Role::Doctor, None, None)
            .unwrap();

        let patients = catalog.patients().unwrap();
        assert_eq!(patients.len(), 1);
        assert_eq!(patients[0].profile.id, pat);
        assert_eq!(catalog.patient(pat).unwrap().email, "pat@example.com");
        assert!(matches!(
            catalog.patient(12345).unwrap_err(),
            ClinicError::NotFound { .. }
        ));
    }
}
