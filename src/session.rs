use serde::Serialize;
use tracing::{debug, info, warn};

use crate::client::{CommitResult, StatementClient};
use crate::endpoint::{EndpointIdentity, TransactionHandle};
use crate::error::DataApiError;
use crate::results::RowSet;
use crate::types::Statement;

/// Lifecycle of a [`TransactionSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Idle,
    Active,
    Committed,
    RolledBack,
}

/// Everything a finished session produced.
#[derive(Debug, Clone, Serialize)]
pub struct SessionOutcome {
    pub state: SessionState,
    pub results: Vec<RowSet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit: Option<CommitResult>,
}

impl SessionOutcome {
    #[must_use]
    pub fn committed(&self) -> bool {
        self.state == SessionState::Committed
    }
}

/// A single remote transaction driven through a [`StatementClient`].
///
/// `Idle -> Active -> {Committed, RolledBack}`. Statements only reach the client
/// while the session is `Active`. The first failing statement moves the session
/// to `RolledBack`; the endpoint discards the uncommitted work on its own, so no
/// rollback call is sent. Every later `run` fails with `SessionClosed` locally.
pub struct TransactionSession<'c, C: StatementClient + ?Sized> {
    client: &'c C,
    endpoint: EndpointIdentity,
    handle: Option<TransactionHandle>,
    state: SessionState,
    results: Vec<RowSet>,
    commit: Option<CommitResult>,
}

impl<'c, C: StatementClient + ?Sized> TransactionSession<'c, C> {
    #[must_use]
    pub fn new(client: &'c C, endpoint: EndpointIdentity) -> Self {
        Self {
            client,
            endpoint,
            handle: None,
            state: SessionState::Idle,
            results: Vec::new(),
            commit: None,
        }
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[must_use]
    pub fn handle(&self) -> Option<&TransactionHandle> {
        self.handle.as_ref()
    }

    #[must_use]
    pub fn endpoint(&self) -> &EndpointIdentity {
        &self.endpoint
    }

    /// Results of the statements executed so far, in execution order.
    #[must_use]
    pub fn results(&self) -> &[RowSet] {
        &self.results
    }

    /// Begin the remote transaction.
    ///
    /// # Errors
    /// `TransactionError` if the session was already opened; otherwise whatever
    /// `begin` returns. A failed open leaves the session `Idle`.
    pub async fn open(&mut self) -> Result<&TransactionHandle, DataApiError> {
        if self.state != SessionState::Idle {
            return Err(DataApiError::TransactionError(format!(
                "cannot open a session in state {:?}",
                self.state
            )));
        }
        let handle = self.client.begin(&self.endpoint).await?;
        info!(
            transaction_id = %handle,
            database = self.endpoint.database(),
            "transaction started"
        );
        self.state = SessionState::Active;
        Ok(self.handle.insert(handle))
    }

    /// Execute one statement inside the transaction.
    ///
    /// # Errors
    /// `SessionClosed` unless the session is `Active` (no remote call is made);
    /// otherwise the client's error, after which the session is `RolledBack`.
    pub async fn run(&mut self, statement: &Statement) -> Result<&RowSet, DataApiError> {
        let handle = match (&self.state, &self.handle) {
            (SessionState::Active, Some(handle)) => handle,
            (state, _) => {
                return Err(DataApiError::SessionClosed(format!(
                    "statement rejected locally, session is {state:?}"
                )));
            }
        };

        debug!(transaction_id = %handle, sql = %statement.sql, "executing statement");
        match self
            .client
            .execute(
                &self.endpoint,
                Some(handle),
                &statement.sql,
                &statement.params,
            )
            .await
        {
            Ok(rows) => {
                self.results.push(rows);
                Ok(&self.results[self.results.len() - 1])
            }
            Err(err) => {
                warn!(
                    transaction_id = %handle,
                    sql = %statement.sql,
                    error = %err,
                    "statement failed, transaction abandoned"
                );
                self.abandon();
                Err(err)
            }
        }
    }

    /// Commit the transaction.
    ///
    /// # Errors
    /// `SessionClosed` unless `Active`; otherwise the client's error, after which the
    /// session is `RolledBack` (a failed commit never leaves a usable handle).
    pub async fn commit(&mut self) -> Result<CommitResult, DataApiError> {
        let handle = match (&self.state, self.handle.take()) {
            (SessionState::Active, Some(handle)) => handle,
            (state, handle) => {
                self.handle = handle;
                return Err(DataApiError::SessionClosed(format!(
                    "cannot commit a session in state {state:?}"
                )));
            }
        };

        match self.client.commit(&self.endpoint, &handle).await {
            Ok(result) => {
                info!(transaction_id = %handle, "transaction committed");
                self.state = SessionState::Committed;
                self.commit = Some(result.clone());
                Ok(result)
            }
            Err(err) => {
                warn!(transaction_id = %handle, error = %err, "commit failed");
                self.state = SessionState::RolledBack;
                Err(err)
            }
        }
    }

    /// Give up on an active transaction without a remote call.
    ///
    /// The handle is released through [`StatementClient::abandon`]; dropping an
    /// active session does the same.
    ///
    /// # Errors
    /// `SessionClosed` unless the session is `Active`.
    pub fn rollback(&mut self) -> Result<(), DataApiError> {
        if self.state != SessionState::Active {
            return Err(DataApiError::SessionClosed(format!(
                "cannot roll back a session in state {:?}",
                self.state
            )));
        }
        self.abandon();
        Ok(())
    }

    /// Finish the session and hand back what it produced.
    #[must_use]
    pub fn into_outcome(mut self) -> SessionOutcome {
        if self.state == SessionState::Active {
            self.abandon();
        }
        SessionOutcome {
            state: self.state,
            results: std::mem::take(&mut self.results),
            commit: self.commit.take(),
        }
    }

    fn abandon(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.client.abandon(&self.endpoint, &handle);
        }
        self.state = SessionState::RolledBack;
    }
}

impl<C: StatementClient + ?Sized> Drop for TransactionSession<'_, C> {
    fn drop(&mut self) {
        if self.state == SessionState::Active
            && let Some(handle) = &self.handle
        {
            warn!(
                transaction_id = %handle,
                "session dropped while active, transaction abandoned"
            );
            self.abandon();
        }
    }
}
