use crate::error::ApiError;
use api_shared::IdentityVerifier;
use clinic_core::{CancelFlag, Clinic, ClinicError, ClinicResult, Enforcer, Environment};
use std::sync::Arc;
use std::time::Duration;

/// Application state shared across REST handlers and the authorization gate.
///
/// Built once at startup. The rule table behind `enforcer` is immutable for the life of the
/// process.
#[derive(Clone)]
pub struct AppState {
    pub clinic: Clinic,
    pub verifier: Arc<dyn IdentityVerifier>,
    pub enforcer: Arc<dyn Enforcer>,
    pub identity_timeout: Duration,
    pub store_timeout: Duration,
    pub environment: Environment,
}

impl AppState {
    /// Runs store work off the async runtime, bounded by the store timeout.
    ///
    /// On timeout the task's cancel flag is raised: it stops waiting for the connection and
    /// rolls back any unit of work it has not yet committed.
    pub async fn blocking<T, F>(&self, f: F) -> ClinicResult<T>
    where
        F: FnOnce(&Clinic) -> ClinicResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let flag = CancelFlag::new();
        let clinic = self.clinic.cancellable(&flag);
        let task = tokio::task::spawn_blocking(move || f(&clinic));
        match tokio::time::timeout(self.store_timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(ClinicError::StoreInterrupted(join.to_string())),
            Err(_) => {
                flag.cancel();
                tracing::warn!(timeout = ?self.store_timeout, "store call abandoned");
                Err(ClinicError::StoreTimeout(self.store_timeout))
            }
        }
    }

    /// [`AppState::blocking`] with the failure already mapped to a response.
    pub async fn store<T, F>(&self, f: F) -> Result<T, ApiError>
    where
        F: FnOnce(&Clinic) -> ClinicResult<T> + Send + 'static,
        T: Send + 'static,
    {
        self.blocking(f)
            .await
            .map_err(|e| ApiError::clinic(e, self.environment))
    }
}
