//! Transactional statement execution and migration replay for statement-oriented
//! SQL endpoints.
//!
//! An endpoint exposes three remote calls (begin, execute one statement, commit)
//! and no explicit rollback. [`TransactionSession`] drives one transaction over a
//! [`StatementClient`], [`MigrationRunner`] replays a [`MigrationPlan`] inside a
//! single session, and [`DatabaseResetCoordinator`] drops, recreates and migrates
//! a database.
//!
//! ```rust,no_run
//! # #[cfg(feature = "sqlite")]
//! # async fn demo() -> Result<(), sql_dataapi::DataApiError> {
//! use sql_dataapi::prelude::*;
//!
//! let client = SqliteStatementClient::new();
//! let endpoint = EndpointIdentity::new("/var/lib/cluster", "", "appdb");
//! let mut session = TransactionSession::new(&client, endpoint);
//! session.open().await?;
//! session
//!     .run(&Statement::new("INSERT INTO t (v) VALUES ($1)").bind("v", RowValues::Int(1)))
//!     .await?;
//! session.commit().await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod handlers;
pub mod migrations;
pub mod prelude;
pub mod reset;
pub mod results;
pub mod runner;
pub mod session;
pub mod types;

#[cfg(any(feature = "postgres", feature = "sqlite"))]
mod registry;

#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use client::{CommitResult, StatementClient};
pub use config::AppConfig;
pub use endpoint::{EndpointIdentity, TransactionHandle};
pub use error::DataApiError;
pub use migrations::{MigrationLoader, MigrationPlan, MigrationUnit, split_statements};
pub use reset::{DatabaseResetCoordinator, ResetError, ResetOptions, ResetReport};
pub use results::{DbRow, RowSet};
pub use runner::{MigrationRunner, RunFailure, RunReport, RunResult};
pub use session::{SessionOutcome, SessionState, TransactionSession};
pub use types::{ParamConverter, RowValues, SqlParam, Statement};

#[cfg(feature = "postgres")]
pub use postgres::PostgresStatementClient;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStatementClient;

/// Convert parameters into a backend's native form.
///
/// # Errors
/// Whatever the backend's converter reports for an unsupported value.
pub fn convert_sql_params<'a, T: ParamConverter<'a>>(
    params: &'a [SqlParam],
) -> Result<T::Converted, DataApiError> {
    T::convert_sql_params(params)
}
