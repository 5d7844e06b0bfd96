//! Convenient imports for common functionality.
//!
//! This module re-exports the most commonly used types and functions
//! to make it easier to get started with the library.

pub use crate::client::{CommitResult, StatementClient};
pub use crate::config::AppConfig;
pub use crate::convert_sql_params;
pub use crate::endpoint::{EndpointIdentity, TransactionHandle};
pub use crate::error::DataApiError;
pub use crate::migrations::{MigrationLoader, MigrationPlan, split_statements};
pub use crate::reset::{DatabaseResetCoordinator, ResetOptions};
pub use crate::results::{DbRow, RowSet};
pub use crate::runner::MigrationRunner;
pub use crate::session::{SessionState, TransactionSession};
pub use crate::types::{ParamConverter, RowValues, SqlParam, Statement};

#[cfg(feature = "postgres")]
pub use crate::postgres::{Params as PostgresParams, PostgresStatementClient};

#[cfg(feature = "sqlite")]
pub use crate::sqlite::{Params as SqliteParams, SqliteStatementClient};
