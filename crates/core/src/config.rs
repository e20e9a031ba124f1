//! Core runtime configuration.
//!
//! This module defines configuration that should be resolved once at process startup and then
//! passed into core services. The intent is to avoid reading process-wide environment variables
//! during request handling, which can lead to inconsistent behaviour in multi-threaded runtimes
//! and test harnesses.

use crate::constants::{DEFAULT_DATABASE_PATH, DEFAULT_STORE_TIMEOUT};
use crate::{ClinicError, ClinicResult};
use clinic_types::EmailAddress;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Deployment posture. Controls how much internal detail reaches untrusted callers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    /// Internal error detail is only exposed to callers outside production.
    pub fn exposes_error_detail(self) -> bool {
        matches!(self, Self::Development)
    }
}

impl FromStr for Environment {
    type Err = ClinicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            other => Err(ClinicError::InvalidInput(format!(
                "unknown environment {other:?} (expected development or production)"
            ))),
        }
    }
}

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    database_path: PathBuf,
    store_timeout: Duration,
    environment: Environment,
    bootstrap_admins: Vec<EmailAddress>,
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    pub fn new(
        database_path: PathBuf,
        store_timeout: Duration,
        environment: Environment,
        bootstrap_admins: Vec<EmailAddress>,
    ) -> ClinicResult<Self> {
        if database_path.as_os_str().is_empty() {
            return Err(ClinicError::InvalidInput(
                "database path cannot be empty".into(),
            ));
        }
        if store_timeout.is_zero() {
            return Err(ClinicError::InvalidInput(
                "store timeout must be greater than zero".into(),
            ));
        }

        Ok(Self {
            database_path,
            store_timeout,
            environment,
            bootstrap_admins,
        })
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    pub fn store_timeout(&self) -> Duration {
        self.store_timeout
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    pub fn bootstrap_admins(&self) -> &[EmailAddress] {
        &self.bootstrap_admins
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Database path, defaulting to [`DEFAULT_DATABASE_PATH`] when unset or blank.
pub fn database_path_from_env_value(value: Option<String>) -> PathBuf {
    PathBuf::from(non_blank(value).unwrap_or_else(|| DEFAULT_DATABASE_PATH.to_string()))
}

/// Parse the deployment environment from an optional string value.
///
/// If `value` is `None` or empty/whitespace, returns [`Environment::Development`].
pub fn environment_from_env_value(value: Option<String>) -> ClinicResult<Environment> {
    non_blank(value)
        .map(|v| v.parse::<Environment>())
        .transpose()
        .map(Option::unwrap_or_default)
}

/// Parse a millisecond timeout from an optional string value, falling back to `default`.
pub fn timeout_from_env_value(value: Option<String>, default: Duration) -> ClinicResult<Duration> {
    let Some(raw) = non_blank(value) else {
        return Ok(default);
    };
    let millis: u64 = raw.parse().map_err(|_| {
        ClinicError::InvalidInput(format!("timeout must be a whole number of milliseconds, got {raw:?}"))
    })?;
    if millis == 0 {
        return Err(ClinicError::InvalidInput(
            "timeout must be greater than zero".into(),
        ));
    }
    Ok(Duration::from_millis(millis))
}

/// Store timeout with the crate default applied.
pub fn store_timeout_from_env_value(value: Option<String>) -> ClinicResult<Duration> {
    timeout_from_env_value(value, DEFAULT_STORE_TIMEOUT)
}

/// Parse a comma-separated list of bootstrap administrator emails.
pub fn admin_emails_from_env_value(value: Option<String>) -> ClinicResult<Vec<EmailAddress>> {
    let Some(raw) = non_blank(value) else {
        return Ok(Vec::new());
    };
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            EmailAddress::parse(s)
                .map_err(|e| ClinicError::InvalidInput(format!("bootstrap admin: {e}")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_defaults_to_development() {
        assert_eq!(
            environment_from_env_value(None).unwrap(),
            Environment::Development
        );
        assert_eq!(
            environment_from_env_value(Some("  ".into())).unwrap(),
            Environment::Development
        );
        assert_eq!(
            environment_from_env_value(Some("Production".into())).unwrap(),
            Environment::Production
        );
        assert!(environment_from_env_value(Some("staging".into())).is_err());
    }

    #[test]
    fn timeout_parses_millis_and_rejects_zero() {
        let default = Duration::from_secs(3);
        assert_eq!(timeout_from_env_value(None, default).unwrap(), default);
        assert_eq!(
            timeout_from_env_value(Some("250".into()), default).unwrap(),
            Duration::from_millis(250)
        );
        assert!(timeout_from_env_value(Some("0".into()), default).is_err());
        assert!(timeout_from_env_value(Some("soon".into()), default).is_err());
    }

    #[test]
    fn admin_emails_are_split_and_validated() {
        let admins =
            admin_emails_from_env_value(Some("a@clinic.test, b@clinic.test,".into())).unwrap();
        assert_eq!(admins.len(), 2);
        assert_eq!(admins[1].as_str(), "b@clinic.test");
        assert!(admin_emails_from_env_value(Some("not-an-email".into())).is_err());
    }

    #[test]
    fn database_path_falls_back_to_default() {
        assert_eq!(
            database_path_from_env_value(Some(" ".into())),
            PathBuf::from(DEFAULT_DATABASE_PATH)
        );
        assert_eq!(
            database_path_from_env_value(Some("/var/lib/clinic.db".into())),
            PathBuf::from("/var/lib/clinic.db")
        );
    }

    #[test]
    fn config_rejects_zero_timeout() {
        let err = CoreConfig::new(
            PathBuf::from("clinic.db"),
            Duration::ZERO,
            Environment::Production,
            vec![],
        )
        .unwrap_err();
        assert!(matches!(err, ClinicError::InvalidInput(_)));
    }
}
