use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::startup;

/// Main entry point for the clinic backend
///
/// Resolves configuration, opens the store, promotes bootstrap administrators, seeds and
/// loads the access policy, loads the issuer keys, and only then starts serving REST traffic.
///
/// # Environment Variables
/// - `CLINIC_REST_ADDR`: REST server address (default: "0.0.0.0:8080")
/// - `CLINIC_DATABASE_PATH`: SQLite database file (default: "clinic.db")
/// - `CLINIC_ENV`: `development` or `production` (default: development)
/// - `CLINIC_STORE_TIMEOUT_MS`: bound on each store call (default: 5000)
/// - `CLINIC_ADMIN_EMAILS`: comma-separated emails promoted to admin at startup
/// - `CLINIC_ISSUER_AUDIENCE`: expected token audience (required)
/// - `CLINIC_ISSUER`: expected token issuer (optional)
/// - `CLINIC_ISSUER_KEYS`: PEM bundle, or directory of `<kid>.pem` files, of trusted issuer
///   public keys (required)
/// - `CLINIC_IDENTITY_TIMEOUT_MS`: bound on each token verification (default: 5000)
///
/// # Returns
/// * `Ok(())` - If the server starts and shuts down cleanly
/// * `Err(anyhow::Error)` - If configuration, startup or serving fails
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("clinic_run=info".parse()?)
                .add_directive("api_rest=info".parse()?)
                .add_directive("clinic_core=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let addr = startup::rest_addr_from_env();
    let core = startup::core_config_from_env()?;
    let issuer = startup::issuer_config_from_env()?;

    tracing::info!(
        database = %core.database_path().display(),
        environment = ?core.environment(),
        store_timeout_ms = core.store_timeout().as_millis() as u64,
        identity_timeout_ms = issuer.timeout().as_millis() as u64,
        audience = issuer.audience(),
        bootstrap_admins = core.bootstrap_admins().len(),
        "-- Starting clinic backend"
    );

    let state = startup::build_state(&core, &issuer)?;

    tracing::info!("++ Starting REST server on {}", addr);
    startup::serve(&addr, state).await
}
