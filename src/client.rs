use async_trait::async_trait;
use serde::Serialize;

use crate::endpoint::{EndpointIdentity, TransactionHandle};
use crate::error::DataApiError;
use crate::results::RowSet;
use crate::types::SqlParam;

/// Acknowledgement returned by a successful commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitResult {
    pub transaction_id: TransactionHandle,
    pub status: String,
}

impl CommitResult {
    #[must_use]
    pub fn committed(handle: TransactionHandle) -> Self {
        Self {
            transaction_id: handle,
            status: "Transaction Committed".to_string(),
        }
    }
}

/// The three remote operations of a statement-oriented SQL endpoint.
///
/// Every call is a single request/response; there are no retries at this layer.
/// Exactly one SQL statement may be sent per `execute`. A statement that fails
/// inside a transaction abandons that transaction on the endpoint: the handle is
/// forgotten and uncommitted work is discarded without an explicit rollback call.
#[async_trait]
pub trait StatementClient: Send + Sync {
    /// Open a transaction.
    ///
    /// # Errors
    /// `ConnectionError` if the endpoint is unreachable, `AuthError` if the
    /// credential is rejected.
    async fn begin(&self, endpoint: &EndpointIdentity) -> Result<TransactionHandle, DataApiError>;

    /// Execute exactly one statement, inside `handle` when given, auto-committed otherwise.
    ///
    /// # Errors
    /// `StatementError` carrying the SQL and parameters when the engine rejects it;
    /// `TransactionError` when `handle` is unknown; `ConnectionError`/`AuthError` as for `begin`.
    async fn execute(
        &self,
        endpoint: &EndpointIdentity,
        handle: Option<&TransactionHandle>,
        sql: &str,
        params: &[SqlParam],
    ) -> Result<RowSet, DataApiError>;

    /// Commit the transaction behind `handle`.
    ///
    /// # Errors
    /// `TransactionError` if the handle is unknown or already terminated.
    async fn commit(
        &self,
        endpoint: &EndpointIdentity,
        handle: &TransactionHandle,
    ) -> Result<CommitResult, DataApiError>;

    /// Forget `handle` without contacting the endpoint.
    ///
    /// Backends holding a dedicated connection per transaction drop it here, and
    /// the engine discards the uncommitted work. Unknown handles are ignored.
    fn abandon(&self, _endpoint: &EndpointIdentity, _handle: &TransactionHandle) {}
}
