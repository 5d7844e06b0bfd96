use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::client::{CommitResult, StatementClient};
use crate::error::DataApiError;
use crate::migrations::MigrationPlan;
use crate::session::TransactionSession;

/// Summary of a committed migration run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub units_applied: usize,
    pub statements_applied: usize,
    pub commit: CommitResult,
}

/// Where and why a migration run stopped.
#[derive(Debug)]
pub struct RunFailure {
    /// Name of the unit holding the failing statement, if a statement failed.
    pub unit: Option<String>,
    pub unit_index: Option<usize>,
    pub statement_index: Option<usize>,
    /// Statements that executed successfully before the failure. None of them
    /// are visible once the transaction is abandoned.
    pub statements_executed: usize,
    pub error: DataApiError,
}

impl RunFailure {
    fn outside_statements(error: DataApiError, statements_executed: usize) -> Self {
        Self {
            unit: None,
            unit_index: None,
            statement_index: None,
            statements_executed,
            error,
        }
    }
}

impl std::fmt::Display for RunFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.unit, self.statement_index) {
            (Some(unit), Some(idx)) => {
                write!(f, "migration {unit} statement {idx} failed: {}", self.error)
            }
            _ => write!(f, "migration run failed: {}", self.error),
        }
    }
}

impl std::error::Error for RunFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl From<RunFailure> for DataApiError {
    fn from(failure: RunFailure) -> Self {
        failure.error
    }
}

pub type RunResult = Result<RunReport, RunFailure>;

/// Replays a whole migration plan inside one transaction.
///
/// The run is all-or-nothing across every unit: later units routinely depend on
/// earlier ones, so a partial application is never kept.
#[derive(Debug, Default, Clone, Copy)]
pub struct MigrationRunner;

impl MigrationRunner {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Open `session`, execute every statement of `plan` in order, commit.
    ///
    /// Stops at the first failing statement; remaining statements and units are
    /// not attempted and nothing is committed.
    pub async fn run<C: StatementClient + ?Sized>(
        &self,
        plan: &MigrationPlan,
        session: &mut TransactionSession<'_, C>,
    ) -> RunResult {
        session
            .open()
            .await
            .map_err(|e| RunFailure::outside_statements(e, 0))?;

        let mut applied = 0usize;
        for (unit_idx, stmt_idx, statement) in plan.iter_statements() {
            let unit_name = plan.unit(unit_idx).map(|u| u.name.clone());
            debug!(
                unit = unit_name.as_deref().unwrap_or_default(),
                statement = stmt_idx,
                "running migration statement"
            );
            if let Err(error) = session.run(statement).await {
                warn!(
                    unit = unit_name.as_deref().unwrap_or_default(),
                    statement = stmt_idx,
                    applied,
                    "migration run aborted"
                );
                return Err(RunFailure {
                    unit: unit_name,
                    unit_index: Some(unit_idx),
                    statement_index: Some(stmt_idx),
                    statements_executed: applied,
                    error,
                });
            }
            applied += 1;
        }

        let commit = session
            .commit()
            .await
            .map_err(|e| RunFailure::outside_statements(e, applied))?;

        info!(
            units = plan.len(),
            statements = applied,
            "migrations committed"
        );
        Ok(RunReport {
            units_applied: plan.len(),
            statements_applied: applied,
            commit,
        })
    }

    /// [`run`](Self::run) bounded by a wall-clock limit.
    ///
    /// On timeout the session is rolled back, which releases the handle on the
    /// backend. The outcome is unknown and the caller must reset from scratch
    /// rather than resume.
    pub async fn run_with_timeout<C: StatementClient + ?Sized>(
        &self,
        plan: &MigrationPlan,
        session: &mut TransactionSession<'_, C>,
        limit: Duration,
    ) -> RunResult {
        let outcome = tokio::time::timeout(limit, self.run(plan, session)).await;
        match outcome {
            Ok(result) => result,
            Err(_) => {
                warn!(?limit, "migration run timed out");
                // Idle and RolledBack sessions hold no handle to release.
                let _ = session.rollback();
                Err(RunFailure::outside_statements(
                    DataApiError::Timeout(limit),
                    session.results().len(),
                ))
            }
        }
    }
}
