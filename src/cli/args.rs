use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;

use sql_dataapi::config::{
    ADMIN_DATABASE_ENV, CREDENTIAL_ENV, DATABASE_ENV, MIGRATIONS_DIR_ENV, PRIMARY_TABLE_ENV,
    REGION_ENV, RESOURCE_ENV, TIMEOUT_ENV,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
pub(crate) enum BackendKind {
    #[cfg(feature = "postgres")]
    Postgres,
    #[cfg(feature = "sqlite")]
    Sqlite,
}

impl BackendKind {
    #[cfg(feature = "postgres")]
    pub(crate) const DEFAULT: Self = BackendKind::Postgres;
    #[cfg(all(not(feature = "postgres"), feature = "sqlite"))]
    pub(crate) const DEFAULT: Self = BackendKind::Sqlite;
}

#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    /// Drop, recreate and migrate the database
    Reset,
    /// Apply all migrations to the existing database
    Migrate,
    /// Insert one user (random name and email unless both are given)
    CreateUser {
        #[arg(long, requires = "email")]
        name: Option<String>,
        #[arg(long, requires = "name")]
        email: Option<String>,
    },
    /// List every user
    GetUsers,
    /// Create, update and read back a user in one transaction
    CreateUpdateGet,
    /// Recreate the User table and round-trip a row through begin/execute/commit
    Probe,
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Statement-oriented SQL endpoint toolkit")]
pub(crate) struct Args {
    #[command(subcommand)]
    pub(crate) command: Command,

    #[arg(long, value_enum, global = true)]
    pub(crate) backend: Option<BackendKind>,

    /// Cluster locator: a libpq connection string for postgres, a directory for sqlite
    #[arg(long, env = RESOURCE_ENV, global = true)]
    pub(crate) resource: Option<String>,

    #[arg(long, env = CREDENTIAL_ENV, global = true, hide_env_values = true)]
    pub(crate) credential: Option<String>,

    #[arg(long, env = DATABASE_ENV, global = true)]
    pub(crate) database: Option<String>,

    #[arg(long, env = REGION_ENV, global = true)]
    pub(crate) region: Option<String>,

    #[arg(long, env = ADMIN_DATABASE_ENV, global = true)]
    pub(crate) admin_database: Option<String>,

    #[arg(long, env = MIGRATIONS_DIR_ENV, global = true)]
    pub(crate) migrations_dir: Option<PathBuf>,

    #[arg(long, env = PRIMARY_TABLE_ENV, global = true)]
    pub(crate) primary_table: Option<String>,

    /// Upper bound for the whole invocation, in seconds
    #[arg(long, env = TIMEOUT_ENV, global = true)]
    pub(crate) timeout_secs: Option<u64>,

    /// Append log output to this file as well as stderr
    #[arg(long, global = true)]
    pub(crate) log: Option<PathBuf>,

    /// Log filter, e.g. `info` or `sql_dataapi=debug`; falls back to `RUST_LOG`
    #[arg(long, global = true)]
    pub(crate) log_level: Option<String>,
}

impl Args {
    /// Value for a configuration variable, as resolved by clap from flag or env.
    pub(crate) fn lookup(&self, key: &str) -> Option<String> {
        match key {
            RESOURCE_ENV => self.resource.clone(),
            CREDENTIAL_ENV => self.credential.clone(),
            DATABASE_ENV => self.database.clone(),
            REGION_ENV => self.region.clone(),
            ADMIN_DATABASE_ENV => self.admin_database.clone(),
            MIGRATIONS_DIR_ENV => self
                .migrations_dir
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned()),
            PRIMARY_TABLE_ENV => self.primary_table.clone(),
            TIMEOUT_ENV => self.timeout_secs.map(|s| s.to_string()),
            _ => None,
        }
    }
}
