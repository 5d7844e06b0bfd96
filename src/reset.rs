use std::fmt;
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::client::StatementClient;
use crate::endpoint::EndpointIdentity;
use crate::error::DataApiError;
use crate::migrations::MigrationLoader;
use crate::results::RowSet;
use crate::runner::{MigrationRunner, RunFailure, RunReport};
use crate::session::TransactionSession;
use crate::types::{RowValues, SqlParam, Statement};

static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z_][a-z0-9_]*$").expect("identifier regex is valid")
});

/// Administrative steps, in the order they are issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AdminStep {
    TerminateConnections,
    DropDatabase,
    CreateDatabase,
}

impl fmt::Display for AdminStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AdminStep::TerminateConnections => "terminate connections",
            AdminStep::DropDatabase => "drop database",
            AdminStep::CreateDatabase => "create database",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum ResetError {
    /// Rejected before anything was sent (bad names, unreadable migrations).
    #[error("reset not started: {0}")]
    Preflight(DataApiError),

    /// An administrative statement failed; no migration was attempted.
    #[error("reset aborted during {step}: {source}")]
    Admin {
        step: AdminStep,
        #[source]
        source: DataApiError,
    },

    /// The database was recreated but the migration run did not commit; rerun the
    /// whole reset.
    #[error("{0}")]
    Migration(RunFailure),
}

impl ResetError {
    /// The underlying endpoint/protocol error.
    #[must_use]
    pub fn cause(&self) -> &DataApiError {
        match self {
            ResetError::Preflight(err) | ResetError::Admin { source: err, .. } => err,
            ResetError::Migration(failure) => &failure.error,
        }
    }
}

impl From<ResetError> for DataApiError {
    fn from(err: ResetError) -> Self {
        match err {
            ResetError::Preflight(err) | ResetError::Admin { source: err, .. } => err,
            ResetError::Migration(failure) => failure.error,
        }
    }
}

/// Post-reset view of the primary table's columns.
#[derive(Debug, Clone, Serialize)]
pub struct SchemaCheck {
    pub table: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub columns: Option<RowSet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResetReport {
    pub database: String,
    pub migrations: RunReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<SchemaCheck>,
}

#[derive(Debug, Clone, Default)]
pub struct ResetOptions {
    /// Table whose `INFORMATION_SCHEMA` columns are reported after the run.
    pub primary_table: Option<String>,
    /// Upper bound for the migration run.
    pub migration_timeout: Option<Duration>,
}

/// Drops and recreates a database through an administrative session, then replays
/// every migration into it.
pub struct DatabaseResetCoordinator<'c, C: StatementClient + ?Sized> {
    client: &'c C,
    runner: MigrationRunner,
    options: ResetOptions,
}

impl<'c, C: StatementClient + ?Sized> DatabaseResetCoordinator<'c, C> {
    #[must_use]
    pub fn new(client: &'c C, options: ResetOptions) -> Self {
        Self {
            client,
            runner: MigrationRunner::new(),
            options,
        }
    }

    /// Reset `target` and migrate it from `migrations_root`.
    ///
    /// `admin` must name a different database on the same cluster: an endpoint
    /// cannot drop the database it is bound to. The migration plan is read before
    /// anything is dropped.
    ///
    /// # Errors
    /// See [`ResetError`]. Any error means the caller must rerun the full reset.
    pub async fn reset(
        &self,
        admin: &EndpointIdentity,
        target: &EndpointIdentity,
        migrations_root: &Path,
    ) -> Result<ResetReport, ResetError> {
        let database = target.database();
        validate_identifier(database).map_err(ResetError::Preflight)?;
        if admin.database() == database {
            return Err(ResetError::Preflight(DataApiError::ConfigError(format!(
                "administrative endpoint is bound to the target database {database}"
            ))));
        }
        let plan = MigrationLoader::new(migrations_root)
            .discover()
            .map_err(ResetError::Preflight)?;

        for (step, statement) in admin_statements(database) {
            info!(%step, database, "reset step");
            self.client
                .execute(admin, None, &statement.sql, &statement.params)
                .await
                .map_err(|source| {
                    warn!(%step, error = %source, "reset step failed");
                    ResetError::Admin { step, source }
                })?;
        }

        let mut session = TransactionSession::new(self.client, target.clone());
        let run = match self.options.migration_timeout {
            Some(limit) => {
                self.runner
                    .run_with_timeout(&plan, &mut session, limit)
                    .await
            }
            None => self.runner.run(&plan, &mut session).await,
        };
        let migrations = run.map_err(ResetError::Migration)?;

        let schema = match &self.options.primary_table {
            Some(table) => Some(self.schema_check(target, table).await),
            None => None,
        };

        Ok(ResetReport {
            database: database.to_string(),
            migrations,
            schema,
        })
    }

    async fn schema_check(&self, target: &EndpointIdentity, table: &str) -> SchemaCheck {
        let statement = schema_statement(table);
        match self
            .client
            .execute(target, None, &statement.sql, &statement.params)
            .await
        {
            Ok(columns) => SchemaCheck {
                table: table.to_string(),
                columns: Some(columns),
                error: None,
            },
            Err(err) => {
                warn!(table, error = %err, "schema check failed");
                SchemaCheck {
                    table: table.to_string(),
                    columns: None,
                    error: Some(err.to_string()),
                }
            }
        }
    }
}

/// Reject anything that is not a plain lowercase SQL identifier before it is spliced into
/// `DROP`/`CREATE DATABASE`, which cannot take bind parameters.
///
/// # Errors
/// `ConfigError` for empty or non-identifier names.
pub fn validate_identifier(name: &str) -> Result<(), DataApiError> {
    if IDENTIFIER.is_match(name) {
        Ok(())
    } else {
        Err(DataApiError::ConfigError(format!(
            "invalid database name {name:?}; expected lowercase [a-z_][a-z0-9_]*"
        )))
    }
}

/// The three auto-committed administrative statements, in issue order.
#[must_use]
pub fn admin_statements(database: &str) -> [(AdminStep, Statement); 3] {
    [
        (
            AdminStep::TerminateConnections,
            Statement::with_params(
                "SELECT pg_terminate_backend(pg_stat_activity.pid) FROM pg_stat_activity \
                 WHERE pg_stat_activity.datname = $1 AND pid <> pg_backend_pid()",
                vec![SqlParam::new("database", RowValues::Text(database.to_string()))],
            ),
        ),
        (
            AdminStep::DropDatabase,
            Statement::new(format!("DROP DATABASE IF EXISTS {database}")),
        ),
        (
            AdminStep::CreateDatabase,
            Statement::new(format!("CREATE DATABASE {database}")),
        ),
    ]
}

fn schema_statement(table: &str) -> Statement {
    Statement::new(
        "SELECT column_name::text AS column_name, data_type::text AS data_type, \
         character_maximum_length::int4 AS character_maximum_length \
         FROM information_schema.columns WHERE table_name = $1 ORDER BY ordinal_position",
    )
    .bind("table_name", RowValues::Text(table.to_string()))
}
