use std::time::Duration;

use async_trait::async_trait;
use tokio_postgres::{Client, Config, NoTls};
use tracing::{debug, info};

use super::query::{StatementFailure, run_statement};
use crate::client::{CommitResult, StatementClient};
use crate::endpoint::{EndpointIdentity, TransactionHandle};
use crate::error::DataApiError;
use crate::registry::TransactionRegistry;
use crate::results::RowSet;
use crate::types::SqlParam;

/// [`StatementClient`] over the Postgres wire protocol.
///
/// Each transaction owns a dedicated connection, registered under a random
/// handle. Statements without a handle run on a short-lived connection in
/// auto-commit mode. When a statement fails inside a transaction, or the session
/// abandons the handle, the connection is dropped and the handle forgotten; the
/// server rolls the work back on disconnect, so a later commit on that handle is
/// a `TransactionError`.
///
/// Endpoint identity mapping:
/// - `resource`: libpq-style connection string for the cluster
///   (`host=db.internal port=5432 user=app`)
/// - `credential`: password
/// - `database`: database name
pub struct PostgresStatementClient {
    transactions: TransactionRegistry<Client>,
    connect_timeout: Option<Duration>,
}

impl Default for PostgresStatementClient {
    fn default() -> Self {
        Self::new()
    }
}

impl PostgresStatementClient {
    #[must_use]
    pub fn new() -> Self {
        Self {
            transactions: TransactionRegistry::new(None),
            connect_timeout: None,
        }
    }

    /// Abandon transactions left idle for longer than `timeout`.
    #[must_use]
    pub fn with_transaction_timeout(mut self, timeout: Duration) -> Self {
        self.transactions = TransactionRegistry::new(Some(timeout));
        self
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Number of transactions currently open on this client.
    #[must_use]
    pub fn open_transactions(&self) -> usize {
        self.transactions.len()
    }

    fn config_for(&self, endpoint: &EndpointIdentity) -> Result<Config, DataApiError> {
        let mut cfg: Config = endpoint.resource().parse().map_err(|e| {
            DataApiError::ConfigError(format!("invalid postgres resource string: {e}"))
        })?;
        cfg.dbname(endpoint.database());
        if !endpoint.credential().is_empty() {
            cfg.password(endpoint.credential());
        }
        if let Some(timeout) = self.connect_timeout {
            cfg.connect_timeout(timeout);
        }
        Ok(cfg)
    }

    async fn connect(&self, endpoint: &EndpointIdentity) -> Result<Client, DataApiError> {
        let cfg = self.config_for(endpoint)?;
        let (client, connection) = cfg.connect(NoTls).await.map_err(classify_connect_error)?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                debug!(error = %e, "postgres connection closed with error");
            }
        });
        Ok(client)
    }
}

#[async_trait]
impl StatementClient for PostgresStatementClient {
    async fn begin(&self, endpoint: &EndpointIdentity) -> Result<TransactionHandle, DataApiError> {
        let client = self.connect(endpoint).await?;
        client
            .batch_execute("BEGIN")
            .await
            .map_err(classify_connect_error)?;
        let handle = self.transactions.insert(endpoint, client);
        info!(transaction_id = %handle, database = endpoint.database(), "begin");
        Ok(handle)
    }

    async fn execute(
        &self,
        endpoint: &EndpointIdentity,
        handle: Option<&TransactionHandle>,
        sql: &str,
        params: &[SqlParam],
    ) -> Result<RowSet, DataApiError> {
        match handle {
            Some(handle) => {
                let client = self.transactions.checkout(endpoint, handle)?;
                let result = run_statement(&client, sql, params).await;
                result.map_err(|failure| {
                    self.transactions.discard(handle);
                    classify_statement_error(failure, sql, params)
                })
            }
            None => {
                let client = self.connect(endpoint).await?;
                run_statement(&client, sql, params)
                    .await
                    .map_err(|failure| classify_statement_error(failure, sql, params))
            }
        }
    }

    async fn commit(
        &self,
        endpoint: &EndpointIdentity,
        handle: &TransactionHandle,
    ) -> Result<CommitResult, DataApiError> {
        let client = self.transactions.remove(endpoint, handle)?;
        client.batch_execute("COMMIT").await.map_err(|e| {
            if e.is_closed() {
                DataApiError::ConnectionError(format!("connection lost during commit: {e}"))
            } else {
                DataApiError::TransactionError(format!("commit rejected: {e}"))
            }
        })?;
        Ok(CommitResult::committed(handle.clone()))
    }

    fn abandon(&self, _endpoint: &EndpointIdentity, handle: &TransactionHandle) {
        self.transactions.discard(handle);
    }
}

fn sqlstate(err: &tokio_postgres::Error) -> Option<&str> {
    err.as_db_error().map(|db| db.code().code())
}

// SQLSTATE class 28: invalid authorization specification.
fn is_auth_failure(err: &tokio_postgres::Error) -> bool {
    sqlstate(err).is_some_and(|code| code.starts_with("28"))
}

fn classify_connect_error(err: tokio_postgres::Error) -> DataApiError {
    if is_auth_failure(&err) {
        DataApiError::AuthError(err.to_string())
    } else {
        DataApiError::ConnectionError(err.to_string())
    }
}

fn classify_statement_error(
    failure: StatementFailure,
    sql: &str,
    params: &[SqlParam],
) -> DataApiError {
    match failure {
        StatementFailure::Local(err) => err,
        StatementFailure::Driver(err) if err.is_closed() => {
            DataApiError::ConnectionError(err.to_string())
        }
        StatementFailure::Driver(err) if is_auth_failure(&err) => {
            DataApiError::AuthError(err.to_string())
        }
        StatementFailure::Driver(err) => {
            let cause = match err.as_db_error() {
                Some(db) => format!("{} ({})", db.message(), db.code().code()),
                None => err.to_string(),
            };
            DataApiError::statement(sql, params, cause)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable() -> EndpointIdentity {
        EndpointIdentity::new("host=127.0.0.1 port=1 user=app", "secret", "appdb")
    }

    #[test]
    fn endpoint_maps_onto_connection_config() {
        let client = PostgresStatementClient::new();
        let cfg = client.config_for(&unreachable()).unwrap();
        assert_eq!(cfg.get_dbname(), Some("appdb"));
        assert_eq!(cfg.get_user(), Some("app"));
        assert_eq!(cfg.get_password(), Some(&b"secret"[..]));

        let bad = EndpointIdentity::new("port=not-a-number", "", "appdb");
        let err = client.config_for(&bad).unwrap_err();
        assert!(matches!(err, DataApiError::ConfigError(_)));
    }

    #[tokio::test]
    async fn refused_connection_is_retryable() {
        let client = PostgresStatementClient::new().with_connect_timeout(Duration::from_secs(2));
        let err = client.begin(&unreachable()).await.unwrap_err();
        assert!(matches!(err, DataApiError::ConnectionError(_)), "{err:?}");
        assert!(err.is_retryable());

        let err = client
            .execute(&unreachable(), None, "SELECT 1", &[])
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn unknown_handles_never_reach_the_server() {
        let client = PostgresStatementClient::new();
        let handle = TransactionHandle::new("not-issued");
        let err = client
            .execute(&unreachable(), Some(&handle), "SELECT 1", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, DataApiError::TransactionError(_)));
        let err = client.commit(&unreachable(), &handle).await.unwrap_err();
        assert!(matches!(err, DataApiError::TransactionError(_)));

        client.abandon(&unreachable(), &handle);
        assert_eq!(client.open_transactions(), 0);
    }
}
