use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::{Connection, ErrorCode, OpenFlags};
use tracing::{debug, info};

use super::admin::{self, AdminCommand};
use super::query::run_statement;
use crate::client::{CommitResult, StatementClient};
use crate::endpoint::{EndpointIdentity, TransactionHandle};
use crate::error::DataApiError;
use crate::registry::TransactionRegistry;
use crate::reset::validate_identifier;
use crate::results::RowSet;
use crate::types::SqlParam;

type SharedConnection = Mutex<Connection>;

/// [`StatementClient`] over `SQLite` files.
///
/// The endpoint `resource` is a directory standing in for the cluster; each
/// database is the file `<resource>/<database>.sqlite3`. The credential is not
/// checked. Transactions hold a dedicated connection; dropping it after a failed
/// statement, or when the session abandons the handle, makes `SQLite` roll the
/// transaction back.
///
/// Without a handle, `CREATE DATABASE`, `DROP DATABASE [IF EXISTS]` and the
/// `pg_terminate_backend` query used by the reset flow act on the directory and
/// on this client's open transactions.
pub struct SqliteStatementClient {
    transactions: TransactionRegistry<SharedConnection>,
    busy_timeout: Duration,
}

impl Default for SqliteStatementClient {
    fn default() -> Self {
        Self::new()
    }
}

impl SqliteStatementClient {
    #[must_use]
    pub fn new() -> Self {
        Self {
            transactions: TransactionRegistry::new(None),
            busy_timeout: Duration::from_secs(5),
        }
    }

    /// Abandon transactions left idle for longer than `timeout`.
    #[must_use]
    pub fn with_transaction_timeout(mut self, timeout: Duration) -> Self {
        self.transactions = TransactionRegistry::new(Some(timeout));
        self
    }

    #[must_use]
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Number of transactions currently open on this client.
    #[must_use]
    pub fn open_transactions(&self) -> usize {
        self.transactions.len()
    }

    /// File backing `database` on the endpoint's cluster directory.
    ///
    /// # Errors
    /// `ConfigError` for a non-identifier database name.
    pub fn database_path(resource: &str, database: &str) -> Result<PathBuf, DataApiError> {
        validate_identifier(database)?;
        Ok(Path::new(resource).join(format!("{database}.sqlite3")))
    }

    async fn open_existing(
        &self,
        endpoint: &EndpointIdentity,
    ) -> Result<Connection, DataApiError> {
        let path = Self::database_path(endpoint.resource(), endpoint.database())?;
        let database = endpoint.database().to_string();
        let busy_timeout = self.busy_timeout;
        blocking(move || {
            if !path.is_file() {
                return Err(DataApiError::ConnectionError(format!(
                    "database \"{database}\" does not exist"
                )));
            }
            let conn = Connection::open_with_flags(
                &path,
                OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )
            .map_err(|e| DataApiError::ConnectionError(e.to_string()))?;
            conn.busy_timeout(busy_timeout)
                .map_err(|e| DataApiError::ConnectionError(e.to_string()))?;
            Ok(conn)
        })
        .await
    }

    async fn run_admin(
        &self,
        endpoint: &EndpointIdentity,
        command: AdminCommand,
        sql: &str,
        params: &[SqlParam],
    ) -> Result<RowSet, DataApiError> {
        let resource = endpoint.resource().to_string();
        match command {
            AdminCommand::TerminateConnections => {
                let target = params
                    .iter()
                    .find_map(|p| p.value.as_text())
                    .ok_or_else(|| {
                        DataApiError::statement(sql, params, "missing target database parameter")
                    })?;
                let closed = self.transactions.discard_database(&resource, target);
                info!(database = target, closed, "terminated open transactions");
                Ok(RowSet::affected(closed))
            }
            AdminCommand::DropDatabase { name, if_exists } => {
                let path = Self::database_path(&resource, &name)?;
                if !path.is_file() {
                    return if if_exists {
                        debug!(database = %name, "drop skipped, database absent");
                        Ok(RowSet::affected(0))
                    } else {
                        Err(DataApiError::statement(
                            sql,
                            params,
                            format!("database \"{name}\" does not exist"),
                        ))
                    };
                }
                if self.transactions.has_database(&resource, &name) {
                    return Err(DataApiError::statement(
                        sql,
                        params,
                        format!("database \"{name}\" is being accessed by other users"),
                    ));
                }
                let sql_owned = sql.to_string();
                let params_owned = params.to_vec();
                blocking(move || {
                    for suffix in ["", "-journal", "-wal", "-shm"] {
                        let mut file = path.clone().into_os_string();
                        file.push(suffix);
                        match std::fs::remove_file(&file) {
                            Ok(()) => {}
                            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                            Err(e) => {
                                return Err(DataApiError::statement(&sql_owned, &params_owned, e));
                            }
                        }
                    }
                    Ok(RowSet::affected(0))
                })
                .await
            }
            AdminCommand::CreateDatabase { name } => {
                let path = Self::database_path(&resource, &name)?;
                if !Path::new(&resource).is_dir() {
                    return Err(DataApiError::ConnectionError(format!(
                        "cluster directory {resource} does not exist"
                    )));
                }
                if path.exists() {
                    return Err(DataApiError::statement(
                        sql,
                        params,
                        format!("database \"{name}\" already exists"),
                    ));
                }
                let sql_owned = sql.to_string();
                let params_owned = params.to_vec();
                blocking(move || {
                    Connection::open(&path)
                        .and_then(|conn| conn.execute_batch("PRAGMA user_version = 0"))
                        .map_err(|e| DataApiError::statement(&sql_owned, &params_owned, e))?;
                    Ok(RowSet::affected(0))
                })
                .await
            }
        }
    }
}

#[async_trait]
impl StatementClient for SqliteStatementClient {
    async fn begin(&self, endpoint: &EndpointIdentity) -> Result<TransactionHandle, DataApiError> {
        let conn = self.open_existing(endpoint).await?;
        let conn = blocking(move || {
            conn.execute_batch("BEGIN")
                .map_err(|e| DataApiError::ConnectionError(e.to_string()))?;
            Ok(conn)
        })
        .await?;
        let handle = self.transactions.insert(endpoint, Mutex::new(conn));
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
        let command = admin::parse(sql);
        match (handle, command) {
            (Some(handle), Some(_)) => {
                self.transactions.discard(handle);
                Err(DataApiError::statement(
                    sql,
                    params,
                    "database administration cannot run inside a transaction block",
                ))
            }
            (None, Some(command)) => self.run_admin(endpoint, command, sql, params).await,
            (Some(handle), None) => {
                let conn = self.transactions.checkout(endpoint, handle)?;
                let result = execute_on(conn, sql, params).await;
                if result.is_err() {
                    self.transactions.discard(handle);
                }
                result
            }
            (None, None) => {
                let conn = Arc::new(Mutex::new(self.open_existing(endpoint).await?));
                execute_on(conn, sql, params).await
            }
        }
    }

    async fn commit(
        &self,
        endpoint: &EndpointIdentity,
        handle: &TransactionHandle,
    ) -> Result<CommitResult, DataApiError> {
        let conn = self.transactions.remove(endpoint, handle)?;
        blocking(move || {
            lock(&conn)
                .execute_batch("COMMIT")
                .map_err(|e| DataApiError::TransactionError(format!("commit rejected: {e}")))
        })
        .await?;
        Ok(CommitResult::committed(handle.clone()))
    }

    fn abandon(&self, _endpoint: &EndpointIdentity, handle: &TransactionHandle) {
        self.transactions.discard(handle);
    }
}

async fn execute_on(
    conn: Arc<SharedConnection>,
    sql: &str,
    params: &[SqlParam],
) -> Result<RowSet, DataApiError> {
    let sql = sql.to_string();
    let params = params.to_vec();
    blocking(move || {
        let guard = lock(&conn);
        run_statement(&guard, &sql, &params).map_err(|e| classify(e, &sql, &params))
    })
    .await
}

async fn blocking<T, F>(f: F) -> Result<T, DataApiError>
where
    F: FnOnce() -> Result<T, DataApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| DataApiError::ConnectionError(format!("sqlite worker failed: {e}")))?
}

fn lock(conn: &SharedConnection) -> MutexGuard<'_, Connection> {
    match conn.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn classify(err: rusqlite::Error, sql: &str, params: &[SqlParam]) -> DataApiError {
    match err.sqlite_error_code() {
        Some(ErrorCode::CannotOpen | ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => {
            DataApiError::ConnectionError(err.to_string())
        }
        Some(ErrorCode::PermissionDenied | ErrorCode::AuthorizationForStatementDenied) => {
            DataApiError::AuthError(err.to_string())
        }
        _ => DataApiError::statement(sql, params, err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RowValues;

    async fn cluster_with(db: &str) -> (tempfile::TempDir, SqliteStatementClient, EndpointIdentity) {
        let dir = tempfile::tempdir().unwrap();
        let client = SqliteStatementClient::new();
        let resource = dir.path().to_string_lossy().into_owned();
        let admin = EndpointIdentity::new(&resource, "", "admin");
        client
            .execute(&admin, None, &format!("CREATE DATABASE {db}"), &[])
            .await
            .unwrap();
        (dir, client, EndpointIdentity::new(resource, "", db))
    }

    #[tokio::test]
    async fn failed_statement_abandons_transaction() {
        let (_dir, client, ep) = cluster_with("app").await;
        let handle = client.begin(&ep).await.unwrap();
        client
            .execute(&ep, Some(&handle), "CREATE TABLE t (id INTEGER)", &[])
            .await
            .unwrap();
        let err = client
            .execute(&ep, Some(&handle), "INSERT INTO missing VALUES (1)", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, DataApiError::StatementError { .. }));

        let commit = client.commit(&ep, &handle).await.unwrap_err();
        assert!(matches!(commit, DataApiError::TransactionError(_)));

        let tables = client
            .execute(&ep, None, "SELECT name FROM sqlite_master WHERE type = 'table'", &[])
            .await
            .unwrap();
        assert!(tables.is_empty());
        assert_eq!(client.open_transactions(), 0);
    }

    #[tokio::test]
    async fn abandon_releases_the_connection() {
        let (_dir, client, ep) = cluster_with("app").await;
        client
            .execute(&ep, None, "CREATE TABLE t (id INTEGER)", &[])
            .await
            .unwrap();
        let handle = client.begin(&ep).await.unwrap();
        client
            .execute(&ep, Some(&handle), "INSERT INTO t VALUES (1)", &[])
            .await
            .unwrap();
        client.abandon(&ep, &handle);
        assert_eq!(client.open_transactions(), 0);

        let rows = client
            .execute(&ep, None, "SELECT id FROM t", &[])
            .await
            .unwrap();
        assert!(rows.is_empty());
        let err = client.commit(&ep, &handle).await.unwrap_err();
        assert!(matches!(err, DataApiError::TransactionError(_)));

        let admin = ep.with_database("admin");
        client
            .execute(&admin, None, "DROP DATABASE app", &[])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn multi_statement_bodies_are_rejected() {
        let (_dir, client, ep) = cluster_with("app").await;
        let err = client
            .execute(&ep, None, "SELECT 1; SELECT 2", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, DataApiError::StatementError { .. }));
    }

    #[tokio::test]
    async fn params_bind_positionally() {
        let (_dir, client, ep) = cluster_with("app").await;
        client
            .execute(&ep, None, "CREATE TABLE kv (k TEXT, v INTEGER)", &[])
            .await
            .unwrap();
        let params = vec![
            SqlParam::new("k", RowValues::Text("a".into())),
            SqlParam::new("v", RowValues::Int(42)),
        ];
        let inserted = client
            .execute(&ep, None, "INSERT INTO kv (k, v) VALUES ($1, $2)", &params)
            .await
            .unwrap();
        assert_eq!(inserted.rows_affected, 1);
        let rows = client
            .execute(&ep, None, "SELECT k, v FROM kv", &[])
            .await
            .unwrap();
        assert_eq!(rows.results[0].get("v"), Some(&RowValues::Int(42)));
    }

    #[tokio::test]
    async fn unknown_database_is_a_connection_error() {
        let (_dir, client, ep) = cluster_with("app").await;
        let other = ep.with_database("nope");
        let err = client.begin(&other).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn drop_refuses_database_with_open_transactions() {
        let (_dir, client, ep) = cluster_with("app").await;
        let admin = ep.with_database("admin");
        let _handle = client.begin(&ep).await.unwrap();
        let err = client
            .execute(&admin, None, "DROP DATABASE IF EXISTS app", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, DataApiError::StatementError { .. }));

        let terminate = vec![SqlParam::new("database", RowValues::Text("app".into()))];
        client
            .execute(&admin, None, "SELECT pg_terminate_backend(pid)", &terminate)
            .await
            .unwrap();
        client
            .execute(&admin, None, "DROP DATABASE IF EXISTS app", &[])
            .await
            .unwrap();
        client
            .execute(&admin, None, "DROP DATABASE IF EXISTS app", &[])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn create_existing_database_fails() {
        let (_dir, client, ep) = cluster_with("app").await;
        let admin = ep.with_database("admin");
        let err = client
            .execute(&admin, None, "CREATE DATABASE app", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, DataApiError::StatementError { .. }));
    }
}
