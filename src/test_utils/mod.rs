//! In-memory [`StatementClient`] for tests.
//!
//! [`RecordingClient`] keeps every call it receives, can be told to reject
//! statements matching a predicate, can stall every `execute` to exercise
//! timeouts, and optionally tracks which databases exist so drop/create
//! sequences behave like a real cluster.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::client::{CommitResult, StatementClient};
use crate::endpoint::{EndpointIdentity, TransactionHandle};
use crate::error::DataApiError;
use crate::results::RowSet;
use crate::types::SqlParam;

/// Embedded `PostgreSQL` server for integration tests.
#[cfg(feature = "test-utils-postgres")]
pub mod postgres;

/// One call as seen by the client.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCall {
    Begin {
        database: String,
    },
    Execute {
        database: String,
        handle: Option<TransactionHandle>,
        sql: String,
        params: Vec<SqlParam>,
    },
    Commit {
        database: String,
        handle: TransactionHandle,
    },
}

type StatementPredicate = Box<dyn Fn(&str) -> bool + Send + Sync>;

#[derive(Default)]
struct State {
    calls: Vec<RecordedCall>,
    open: HashMap<TransactionHandle, String>,
    databases: Option<HashSet<String>>,
    abandoned: Vec<TransactionHandle>,
    next_handle: u64,
}

#[derive(Default)]
pub struct RecordingClient {
    state: Mutex<State>,
    fail_when: Option<StatementPredicate>,
    execute_delay: Option<Duration>,
}

impl RecordingClient {
    /// Every database exists and every statement succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Only `databases` exist; `CREATE`/`DROP DATABASE` without a handle
    /// change the set, and `begin`/`execute` on a missing database fail.
    #[must_use]
    pub fn with_databases<I, S>(self, databases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lock().databases = Some(databases.into_iter().map(Into::into).collect());
        self
    }

    /// Reject with `StatementError` every statement whose SQL satisfies `predicate`.
    #[must_use]
    pub fn fail_statements_matching<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.fail_when = Some(Box::new(predicate));
        self
    }

    /// Sleep for `delay` before answering each `execute`.
    #[must_use]
    pub fn with_execute_delay(mut self, delay: Duration) -> Self {
        self.execute_delay = Some(delay);
        self
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock().calls.clone()
    }

    #[must_use]
    pub fn begin_count(&self) -> usize {
        self.count(|c| matches!(c, RecordedCall::Begin { .. }))
    }

    #[must_use]
    pub fn execute_count(&self) -> usize {
        self.count(|c| matches!(c, RecordedCall::Execute { .. }))
    }

    #[must_use]
    pub fn commit_count(&self) -> usize {
        self.count(|c| matches!(c, RecordedCall::Commit { .. }))
    }

    fn count(&self, pred: impl Fn(&RecordedCall) -> bool) -> usize {
        self.lock().calls.iter().filter(|c| pred(c)).count()
    }

    /// SQL of every `execute` call, in order.
    #[must_use]
    pub fn executed_sql(&self) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                RecordedCall::Execute { sql, .. } => Some(sql.clone()),
                _ => None,
            })
            .collect()
    }

    /// Known databases, sorted, when existence is being tracked.
    #[must_use]
    pub fn databases(&self) -> Option<Vec<String>> {
        self.lock().databases.as_ref().map(|set| {
            let mut names: Vec<_> = set.iter().cloned().collect();
            names.sort();
            names
        })
    }

    #[must_use]
    pub fn open_transactions(&self) -> usize {
        self.lock().open.len()
    }

    /// Handles released through `abandon`, in order.
    #[must_use]
    pub fn abandoned(&self) -> Vec<TransactionHandle> {
        self.lock().abandoned.clone()
    }
}

fn require_database(state: &State, database: &str) -> Result<(), DataApiError> {
    match &state.databases {
        Some(set) if !set.contains(database) => Err(DataApiError::ConnectionError(format!(
            "database \"{database}\" does not exist"
        ))),
        _ => Ok(()),
    }
}

/// Apply `CREATE DATABASE x` / `DROP DATABASE [IF EXISTS] x` to the tracked set.
fn apply_admin(
    databases: &mut HashSet<String>,
    sql: &str,
    params: &[SqlParam],
) -> Result<(), DataApiError> {
    let words: Vec<String> = sql
        .trim_end_matches(';')
        .split_whitespace()
        .map(str::to_ascii_uppercase)
        .collect();
    let name = || {
        sql.trim_end_matches(';')
            .split_whitespace()
            .last()
            .unwrap_or_default()
            .to_string()
    };
    match words.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        ["CREATE", "DATABASE", _] => {
            if !databases.insert(name()) {
                return Err(DataApiError::statement(sql, params, "database already exists"));
            }
        }
        ["DROP", "DATABASE", "IF", "EXISTS", _] => {
            databases.remove(&name());
        }
        ["DROP", "DATABASE", _] => {
            if !databases.remove(&name()) {
                return Err(DataApiError::statement(sql, params, "database does not exist"));
            }
        }
        _ => {}
    }
    Ok(())
}

#[async_trait]
impl StatementClient for RecordingClient {
    async fn begin(&self, endpoint: &EndpointIdentity) -> Result<TransactionHandle, DataApiError> {
        let mut state = self.lock();
        state.calls.push(RecordedCall::Begin {
            database: endpoint.database().to_string(),
        });
        require_database(&state, endpoint.database())?;
        state.next_handle += 1;
        let handle = TransactionHandle::new(format!("tx-{}", state.next_handle));
        state
            .open
            .insert(handle.clone(), endpoint.database().to_string());
        Ok(handle)
    }

    async fn execute(
        &self,
        endpoint: &EndpointIdentity,
        handle: Option<&TransactionHandle>,
        sql: &str,
        params: &[SqlParam],
    ) -> Result<RowSet, DataApiError> {
        if let Some(delay) = self.execute_delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.lock();
        state.calls.push(RecordedCall::Execute {
            database: endpoint.database().to_string(),
            handle: handle.cloned(),
            sql: sql.to_string(),
            params: params.to_vec(),
        });
        require_database(&state, endpoint.database())?;
        if let Some(handle) = handle {
            if state.open.get(handle).map(String::as_str) != Some(endpoint.database()) {
                return Err(DataApiError::TransactionError(format!(
                    "transaction {handle} is unknown or already terminated"
                )));
            }
        }
        if self.fail_when.as_ref().is_some_and(|fail| fail(sql)) {
            if let Some(handle) = handle {
                state.open.remove(handle);
            }
            return Err(DataApiError::statement(sql, params, "scripted failure"));
        }
        if handle.is_none() {
            if let Some(databases) = state.databases.as_mut() {
                apply_admin(databases, sql, params)?;
            }
        }
        Ok(RowSet::affected(0))
    }

    async fn commit(
        &self,
        endpoint: &EndpointIdentity,
        handle: &TransactionHandle,
    ) -> Result<CommitResult, DataApiError> {
        let mut state = self.lock();
        state.calls.push(RecordedCall::Commit {
            database: endpoint.database().to_string(),
            handle: handle.clone(),
        });
        match state.open.remove(handle) {
            Some(_) => Ok(CommitResult::committed(handle.clone())),
            None => Err(DataApiError::TransactionError(format!(
                "transaction {handle} is unknown or already terminated"
            ))),
        }
    }

    fn abandon(&self, _endpoint: &EndpointIdentity, handle: &TransactionHandle) {
        let mut state = self.lock();
        if state.open.remove(handle).is_some() {
            state.abandoned.push(handle.clone());
        }
    }
}
