//! Process startup shared by the `clinic-run` and `clinic-api-rest` binaries.
//!
//! Configuration is resolved once from the environment, the store is opened, bootstrap
//! administrators are promoted and the policy table is seeded and loaded before the listener
//! is bound. Any failure here stops the process.

use crate::state::AppState;
use api_shared::{Es256Verifier, IssuerConfig};
use clinic_core::config::{
    admin_emails_from_env_value, database_path_from_env_value, environment_from_env_value,
    store_timeout_from_env_value,
};
use clinic_core::{Clinic, CoreConfig};
use std::sync::Arc;

/// Default listen address for the REST server.
pub const DEFAULT_REST_ADDR: &str = "0.0.0.0:8080";

/// Listen address from `CLINIC_REST_ADDR`.
pub fn rest_addr_from_env() -> String {
    std::env::var("CLINIC_REST_ADDR")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_REST_ADDR.into())
}

/// Resolves [`CoreConfig`] from `CLINIC_DATABASE_PATH`, `CLINIC_STORE_TIMEOUT_MS`,
/// `CLINIC_ENV` and `CLINIC_ADMIN_EMAILS`.
///
/// # Errors
///
/// Returns an error if any value is present but malformed.
pub fn core_config_from_env() -> anyhow::Result<CoreConfig> {
    let database_path = database_path_from_env_value(std::env::var("CLINIC_DATABASE_PATH").ok());
    let store_timeout = store_timeout_from_env_value(std::env::var("CLINIC_STORE_TIMEOUT_MS").ok())?;
    let environment = environment_from_env_value(std::env::var("CLINIC_ENV").ok())?;
    let admins = admin_emails_from_env_value(std::env::var("CLINIC_ADMIN_EMAILS").ok())?;
    Ok(CoreConfig::new(
        database_path,
        store_timeout,
        environment,
        admins,
    )?)
}

/// Resolves the identity issuer from `CLINIC_ISSUER_AUDIENCE`, `CLINIC_ISSUER`,
/// `CLINIC_ISSUER_KEYS` and `CLINIC_IDENTITY_TIMEOUT_MS`.
pub fn issuer_config_from_env() -> anyhow::Result<IssuerConfig> {
    Ok(IssuerConfig::from_env_values(
        std::env::var("CLINIC_ISSUER_AUDIENCE").ok(),
        std::env::var("CLINIC_ISSUER").ok(),
        std::env::var("CLINIC_ISSUER_KEYS").ok(),
        std::env::var("CLINIC_IDENTITY_TIMEOUT_MS").ok(),
    )?)
}

/// Opens the store and builds the request state.
///
/// # Errors
///
/// Returns an error if:
/// - the database cannot be opened or migrated,
/// - bootstrap administrators cannot be promoted,
/// - the policy rules cannot be seeded or loaded, or
/// - the issuer key bundle cannot be read.
pub fn build_state(core: &CoreConfig, issuer: &IssuerConfig) -> anyhow::Result<AppState> {
    let clinic = Clinic::open(core)?;

    let promoted = clinic.users.promote_bootstrap_admins(core.bootstrap_admins())?;
    if promoted > 0 {
        tracing::info!(promoted, "bootstrap administrators promoted");
    }

    let rules = clinic.policy.bootstrap()?;
    let verifier = Es256Verifier::from_config(issuer)?;

    Ok(AppState {
        clinic,
        verifier: Arc::new(verifier),
        enforcer: Arc::new(rules),
        identity_timeout: issuer.timeout(),
        store_timeout: core.store_timeout(),
        environment: core.environment(),
    })
}

/// Binds `addr` and serves until Ctrl-C.
pub async fn serve(addr: &str, state: AppState) -> anyhow::Result<()> {
    let app = crate::app(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("-- Clinic REST API listening on {}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("-- Clinic REST API stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
}
