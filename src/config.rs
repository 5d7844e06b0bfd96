use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use crate::endpoint::EndpointIdentity;
use crate::error::DataApiError;
use crate::reset::validate_identifier;

pub const RESOURCE_ENV: &str = "RESOURCE_ARN";
pub const CREDENTIAL_ENV: &str = "SECRET_ARN";
pub const DATABASE_ENV: &str = "DATABASE_NAME";
pub const REGION_ENV: &str = "AWS_REGION";
pub const ADMIN_DATABASE_ENV: &str = "SQL_DATAAPI_ADMIN_DATABASE";
pub const MIGRATIONS_DIR_ENV: &str = "SQL_DATAAPI_MIGRATIONS_DIR";
pub const PRIMARY_TABLE_ENV: &str = "SQL_DATAAPI_PRIMARY_TABLE";
pub const TIMEOUT_ENV: &str = "SQL_DATAAPI_TIMEOUT_SECS";

pub const DEFAULT_ADMIN_DATABASE: &str = "postgres";
pub const DEFAULT_MIGRATIONS_DIR: &str = "migrations";
pub const DEFAULT_PRIMARY_TABLE: &str = "User";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Everything one invocation needs to reach the endpoint.
///
/// Built once and passed by reference; nothing here is global.
#[derive(Clone, Serialize)]
pub struct AppConfig {
    pub resource: String,
    #[serde(skip)]
    pub credential: String,
    pub database: String,
    pub region: String,
    pub admin_database: String,
    pub migrations_dir: PathBuf,
    pub primary_table: String,
    #[serde(serialize_with = "serialize_secs")]
    pub timeout: Duration,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("resource", &self.resource)
            .field("credential", &"<redacted>")
            .field("database", &self.database)
            .field("region", &self.region)
            .field("admin_database", &self.admin_database)
            .field("migrations_dir", &self.migrations_dir)
            .field("primary_table", &self.primary_table)
            .field("timeout", &self.timeout)
            .finish()
    }
}

fn serialize_secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_secs())
}

impl AppConfig {
    /// Read configuration from the process environment.
    ///
    /// # Errors
    /// `ConfigError` when a required variable is missing or empty, or an
    /// override does not parse.
    pub fn from_env() -> Result<Self, DataApiError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`, which maps a variable name to its value.
    ///
    /// # Errors
    /// `ConfigError` when a required variable is missing or empty, or an
    /// override does not parse.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, DataApiError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> Result<String, DataApiError> {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| DataApiError::ConfigError(format!("{key} must be set")))
        };
        let optional = |key: &str, default: &str| -> String {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let timeout = match lookup(TIMEOUT_ENV).filter(|v| !v.trim().is_empty()) {
            Some(raw) => {
                let secs: u64 = raw.trim().parse().map_err(|_| {
                    DataApiError::ConfigError(format!(
                        "{TIMEOUT_ENV} must be a whole number of seconds, got {raw:?}"
                    ))
                })?;
                Duration::from_secs(secs)
            }
            None => DEFAULT_TIMEOUT,
        };

        let config = Self {
            resource: required(RESOURCE_ENV)?,
            credential: required(CREDENTIAL_ENV)?,
            database: required(DATABASE_ENV)?,
            region: required(REGION_ENV)?,
            admin_database: optional(ADMIN_DATABASE_ENV, DEFAULT_ADMIN_DATABASE),
            migrations_dir: PathBuf::from(optional(MIGRATIONS_DIR_ENV, DEFAULT_MIGRATIONS_DIR)),
            primary_table: optional(PRIMARY_TABLE_ENV, DEFAULT_PRIMARY_TABLE),
            timeout,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check the fields that end up in SQL text or select a database.
    ///
    /// # Errors
    /// `ConfigError` describing the first invalid field.
    pub fn validate(&self) -> Result<(), DataApiError> {
        for (name, value) in [
            ("resource", &self.resource),
            ("credential", &self.credential),
            ("region", &self.region),
        ] {
            if value.trim().is_empty() {
                return Err(DataApiError::ConfigError(format!("{name} must not be empty")));
            }
        }
        validate_identifier(&self.database)?;
        validate_identifier(&self.admin_database)?;
        if self.admin_database == self.database {
            return Err(DataApiError::ConfigError(format!(
                "admin database must differ from the target database {}",
                self.database
            )));
        }
        if self.timeout.is_zero() {
            return Err(DataApiError::ConfigError("timeout must be positive".into()));
        }
        Ok(())
    }

    /// Endpoint bound to the application database.
    #[must_use]
    pub fn endpoint(&self) -> EndpointIdentity {
        EndpointIdentity::new(&self.resource, &self.credential, &self.database)
    }

    /// Endpoint bound to the maintenance database used for drop/create.
    #[must_use]
    pub fn admin_endpoint(&self) -> EndpointIdentity {
        EndpointIdentity::new(&self.resource, &self.credential, &self.admin_database)
    }
}
