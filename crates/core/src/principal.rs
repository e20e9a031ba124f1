//! Principals: resolution from verified identities, and role changes.
//!
//! Both operations keep a principal and its role profile in step inside a single unit of
//! work, so a principal never becomes visible without the profile its role implies.

use crate::constants::PENDING_SPECIALIZATION;
use crate::db::Database;
use crate::error::{ClinicError, ClinicResult};
use crate::models::{DoctorProfile, Identity, Principal, Role};
use crate::repositories::{catalog, profiles, users};
use clinic_types::EmailAddress;

/// Maps verified identities to stored principals.
#[derive(Clone, Debug)]
pub struct PrincipalResolver {
    db: Database,
}

impl PrincipalResolver {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Returns the principal for `identity`, creating it on first sight.
    ///
    /// An existing principal has its name and picture replaced by non-empty incoming values
    /// that differ, and its subject id filled in if still empty. Nothing is written when no
    /// field changed.
    ///
    /// A new principal is created with the patient role together with an empty patient
    /// profile.
    ///
    /// # Errors
    ///
    /// Returns `StoreFailure` if any read or write fails. No partial state is left behind.
    pub fn resolve(&self, identity: &Identity) -> ClinicResult<Principal> {
        self.db.unit_of_work(|tx| {
            match users::find_user_by_email(tx, identity.email.as_str())? {
                Some(mut principal) => {
                    if reconcile(&mut principal, identity) {
                        users::update_user_profile(tx, &principal)?;
                        tracing::debug!(user_id = principal.id, "principal profile reconciled");
                    }
                    Ok(principal)
                }
                None => {
                    let principal = users::insert_user(tx, identity, Role::Patient)?;
                    profiles::insert_empty_patient_profile(tx, principal.id)?;
                    tracing::info!(
                        user_id = principal.id,
                        email = %principal.email,
                        "created principal on first sight"
                    );
                    Ok(principal)
                }
            }
        })
    }
}

/// Applies the reconciliation rules in place. Returns whether anything changed.
fn reconcile(principal: &mut Principal, identity: &Identity) -> bool {
    let mut changed = false;
    if !identity.name.is_empty() && identity.name != principal.name {
        principal.name = identity.name.clone();
        changed = true;
    }
    if !identity.picture.is_empty() && identity.picture != principal.picture {
        principal.picture = identity.picture.clone();
        changed = true;
    }
    if principal.subject.is_empty() && !identity.subject.is_empty() {
        principal.subject = identity.subject.clone();
        changed = true;
    }
    changed
}

/// Administrative operations on principals.
#[derive(Clone, Debug)]
pub struct UserService {
    db: Database,
}

impl UserService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn list_users(&self) -> ClinicResult<Vec<Principal>> {
        self.db.with_conn(users::list_users)
    }

    pub fn find_user(&self, id: i64) -> ClinicResult<Principal> {
        self.db
            .with_conn(|conn| users::find_user(conn, id))?
            .ok_or_else(|| ClinicError::not_found("user", id))
    }

    /// Changes a principal's role and synchronises its role profile.
    ///
    /// Becoming a doctor creates the doctor profile if absent (specialization defaults to
    /// `Pending...`) or updates the existing one's department and specialization. Becoming
    /// a patient creates an empty patient profile if absent. Profiles of a role being left
    /// are retained.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the user or the supplied department does not exist.
    /// - `StoreFailure` if any write fails; the role change is then not applied either.
    pub fn set_role(
        &self,
        user_id: i64,
        role: Role,
        department_id: Option<i64>,
        specialization: Option<String>,
    ) -> ClinicResult<Principal> {
        let specialization = specialization
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty());

        let principal = self.db.unit_of_work(|tx| {
            if users::find_user(tx, user_id)?.is_none() {
                return Err(ClinicError::not_found("user", user_id));
            }
            if let Some(department_id) = department_id {
                if catalog::find_department(tx, department_id)?.is_none() {
                    return Err(ClinicError::not_found("department", department_id));
                }
            }

            users::update_user_role(tx, user_id, role)?;

            match role {
                Role::Doctor => match profiles::find_doctor_profile(tx, user_id)? {
                    Some(mut profile) => {
                        if department_id.is_some() {
                            profile.department_id = department_id;
                        }
                        if let Some(specialization) = &specialization {
                            profile.specialization = specialization.clone();
                        }
                        profiles::update_doctor_profile(tx, &profile)?;
                    }
                    None => {
                        let profile = DoctorProfile {
                            id: user_id,
                            department_id,
                            specialization: specialization
                                .clone()
                                .unwrap_or_else(|| PENDING_SPECIALIZATION.to_owned()),
                        };
                        profiles::insert_doctor_profile(tx, &profile)?;
                    }
                },
                Role::Patient => {
                    if profiles::find_patient_profile(tx, user_id)?.is_none() {
                        profiles::insert_empty_patient_profile(tx, user_id)?;
                    }
                }
                Role::Admin => {}
            }

            users::find_user(tx, user_id)?.ok_or_else(|| ClinicError::not_found("user", user_id))
        })?;

        tracing::info!(user_id, role = %role, "role changed");
        Ok(principal)
    }

    /// Promotes each listed, already-registered email to admin.
    ///
    /// Emails with no principal yet are skipped; they are picked up on a later start once
    /// the person has signed in. Returns the number of principals whose role changed.
    pub fn promote_bootstrap_admins(&self, emails: &[EmailAddress]) -> ClinicResult<usize> {
        let mut promoted = 0;
        for email in emails {
            let existing = self
                .db
                .with_conn(|conn| users::find_user_by_email(conn, email.as_str()))?;
            match existing {
                Some(principal) if principal.role == Role::Admin => {}
                Some(principal) => {
                    self.set_role(principal.id, Role::Admin, None, None)?;
                    promoted += 1;
                }
                None => {
                    tracing::warn!(email = %email, "bootstrap admin has not signed in yet");
                }
            }
        }
        Ok(promoted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::profiles::{find_doctor_profile, find_patient_profile};

    fn identity(email: &str, name: &str, picture: &str, subject: &str) -> Identity {
        Identity {
            email: EmailAddress::parse(email).unwrap(),
            subject: subject.into(),
            name: name.into(),
            picture: picture.into(),
        }
    }

    fn setup() -> (Database, PrincipalResolver, UserService) {
        let db = Database::open_in_memory().unwrap();
        (
            db.clone(),
            PrincipalResolver::new(db.clone()),
            UserService::new(db),
        )
    }

    fn count(db: &Database, table: &str) -> i64 {
        let sql = format!("SELECT COUNT(*) FROM {table}");
        db.with_conn(|conn| Ok(conn.query_row(&sql, [], |r| r.get(0))?))
            .unwrap()
    }

    #[test]
    fn first_sight_creates_patient_with_profile() {
        let (db, resolver, _) = setup();
        let principal = resolver
            .resolve(&identity("ana@example.com", "Ana", "http://pic/a", "sub-1"))
            .unwrap();

        assert_eq!(principal.role, Role::Patient);
        assert_eq!(principal.subject, "sub-1");
        let profile = db
            .with_conn(|conn| find_patient_profile(conn, principal.id))
            .unwrap();
        assert!(profile.is_some());
    }

    #[test]
    fn unchanged_identity_performs_no_second_write() {
        let (_, resolver, _) = setup();
        let id = identity("ana@example.com", "Ana", "http://pic/a", "sub-1");
        let first = resolver.resolve(&id).unwrap();
        let second = resolver.resolve(&id).unwrap();
        // updated_at would move on any write.
        assert_eq!(first, second);
    }

    #[test]
    fn changed_picture_only_updates_picture() {
        let (_, resolver, _) = setup();
        let first = resolver
            .resolve(&identity("ana@example.com", "Ana", "http://pic/a", "sub-1"))
            .unwrap();
        let second = resolver
            .resolve(&identity("ana@example.com", "Ana", "http://pic/b", "sub-1"))
            .unwrap();

        assert_eq!(second.picture, "http://pic/b");
        assert_eq!(second.name, first.name);
        assert_eq!(second.subject, first.subject);
        assert_eq!(second.id, first.id);
    }

    #[test]
    fn empty_incoming_values_never_overwrite() {
        let (_, resolver, _) = setup();
        resolver
            .resolve(&identity("ana@example.com", "Ana", "http://pic/a", "sub-1"))
            .unwrap();
        let again = resolver
            .resolve(&identity("ana@example.com", "", "", ""))
            .unwrap();
        assert_eq!(again.name, "Ana");
        assert_eq!(again.picture, "http://pic/a");
        assert_eq!(again.subject, "sub-1");
    }

    #[test]
    fn subject_is_set_once() {
        let (_, resolver, _) = setup();
        resolver
            .resolve(&identity("ana@example.com", "Ana", "", ""))
            .unwrap();
        let filled = resolver
            .resolve(&identity("ana@example.com", "Ana", "", "sub-1"))
            .unwrap();
        assert_eq!(filled.subject, "sub-1");
        let kept = resolver
            .resolve(&identity("ana@example.com", "Ana", "", "sub-2"))
            .unwrap();
        assert_eq!(kept.subject, "sub-1");
    }

    #[test]
    fn failed_profile_insert_leaves_no_orphan_principal() {
        let (db, resolver, _) = setup();
        db.with_conn(|conn| {
            conn.execute_batch(
                "CREATE TRIGGER fail_patient_insert BEFORE INSERT ON patients
                 BEGIN SELECT RAISE(ABORT, 'forced failure'); END;",
            )?;
            Ok(())
        })
        .unwrap();

        let err = resolver
            .resolve(&identity("ana@example.com", "Ana", "", "sub-1"))
            .unwrap_err();
        assert!(matches!(err, ClinicError::StoreFailure(_)));
        assert_eq!(count(&db, "users"), 0);
    }

    #[test]
    fn set_role_to_doctor_creates_pending_profile_then_updates_in_place() {
        let (db, resolver, users) = setup();
        let principal = resolver
            .resolve(&identity("doc@example.com", "Doc", "", "sub-d"))
            .unwrap();

        let updated = users.set_role(principal.id, Role::Doctor, None, None).unwrap();
        assert_eq!(updated.role, Role::Doctor);
        let profile = db
            .with_conn(|conn| find_doctor_profile(conn, principal.id))
            .unwrap()
            .unwrap();
        assert_eq!(profile.specialization, PENDING_SPECIALIZATION);

        let dept = db
            .with_conn(|conn| catalog::insert_department(conn, "Cardiology", ""))
            .unwrap();
        users
            .set_role(principal.id, Role::Doctor, Some(dept.id), Some("Cardiologist".into()))
            .unwrap();
        let profile = db
            .with_conn(|conn| find_doctor_profile(conn, principal.id))
            .unwrap()
            .unwrap();
        assert_eq!(profile.department_id, Some(dept.id));
        assert_eq!(profile.specialization, "Cardiologist");
        assert_eq!(count(&db, "doctors"), 1);
    }

    #[test]
    fn leaving_a_role_keeps_its_profile() {
        let (db, resolver, users) = setup();
        let principal = resolver
            .resolve(&identity("doc@example.com", "Doc", "", ""))
            .unwrap();
        users.set_role(principal.id, Role::Doctor, None, None).unwrap();
        users.set_role(principal.id, Role::Patient, None, None).unwrap();
        users.set_role(principal.id, Role::Doctor, None, None).unwrap();

        assert_eq!(count(&db, "doctors"), 1);
        assert_eq!(count(&db, "patients"), 1);
    }

    #[test]
    fn set_role_rejects_unknown_user_and_department() {
        let (_, resolver, users) = setup();
        let err = users.set_role(99, Role::Admin, None, None).unwrap_err();
        assert!(matches!(err, ClinicError::NotFound { entity: "user", id: 99 }));

        let principal = resolver
            .resolve(&identity("doc@example.com", "Doc", "", ""))
            .unwrap();
        let err = users
            .set_role(principal.id, Role::Doctor, Some(42), None)
            .unwrap_err();
        assert!(matches!(err, ClinicError::NotFound { entity: "department", id: 42 }));
        // Role untouched.
        assert_eq!(users.find_user(principal.id).unwrap().role, Role::Patient);
    }

    #[test]
    fn bootstrap_admins_promotes_known_users_only() {
        let (_, resolver, users) = setup();
        let known = resolver
            .resolve(&identity("boss@example.com", "Boss", "", ""))
            .unwrap();
        let emails = vec![
            EmailAddress::parse("boss@example.com").unwrap(),
            EmailAddress::parse("ghost@example.com").unwrap(),
        ];

        assert_eq!(users.promote_bootstrap_admins(&emails).unwrap(), 1);
        assert_eq!(users.find_user(known.id).unwrap().role, Role::Admin);
        assert_eq!(users.promote_bootstrap_admins(&emails).unwrap(), 0);
        assert_eq!(users.list_users().unwrap().len(), 1);
    }
}
