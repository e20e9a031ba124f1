//! Standalone REST API server binary.
//!
//! ## Purpose
//! Runs the REST API server on its own.
//!
//! ## Intended use
//! Useful for development and debugging. The workspace's main `clinic-run` binary performs
//! the same startup and additionally logs the resolved configuration.

use api_rest::startup;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main entry point for the clinic REST API server
///
/// # Environment Variables
/// - `CLINIC_REST_ADDR`: Server address (default: "0.0.0.0:8080")
/// - `CLINIC_DATABASE_PATH`, `CLINIC_STORE_TIMEOUT_MS`, `CLINIC_ENV`, `CLINIC_ADMIN_EMAILS`
/// - `CLINIC_ISSUER_AUDIENCE`, `CLINIC_ISSUER`, `CLINIC_ISSUER_KEYS`,
///   `CLINIC_IDENTITY_TIMEOUT_MS`
///
/// # Errors
/// Returns an error if:
/// - the logging/tracing configuration cannot be initialised,
/// - any configuration value is missing or malformed,
/// - the store or the issuer keys cannot be loaded, or
/// - the server address cannot be bound.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("api_rest=info".parse()?)
                .add_directive("clinic_core=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let addr = startup::rest_addr_from_env();
    tracing::info!("-- Starting clinic REST API on {}", addr);

    let core = startup::core_config_from_env()?;
    let issuer = startup::issuer_config_from_env()?;
    let state = startup::build_state(&core, &issuer)?;

    startup::serve(&addr, state).await
}
