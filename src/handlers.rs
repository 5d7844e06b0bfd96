//! Invocation entry points.
//!
//! Every handler takes a [`StatementClient`] and an [`AppConfig`], and turns the
//! outcome into a [`HandlerResponse`]: status 200 with the JSON result, or 400
//! with a structured error body. Nothing propagates past this layer.

use std::future::Future;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::client::{CommitResult, StatementClient};
use crate::config::AppConfig;
use crate::error::{DataApiError, ErrorBody};
use crate::migrations::MigrationLoader;
use crate::reset::{DatabaseResetCoordinator, ResetError, ResetOptions};
use crate::results::{DbRow, RowSet};
use crate::runner::{MigrationRunner, RunFailure};
use crate::session::{SessionState, TransactionSession};
use crate::types::{RowValues, Statement};

pub const STATUS_OK: u16 = 200;
pub const STATUS_FAILED: u16 = 400;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HandlerResponse {
    pub status_code: u16,
    /// JSON document; 64-bit integers inside it are strings.
    pub body: String,
}

impl HandlerResponse {
    /// 200 with `value` as the body, or 400 if it cannot be serialized.
    pub fn ok<T: Serialize>(value: &T) -> Self {
        match serde_json::to_string(value) {
            Ok(body) => Self {
                status_code: STATUS_OK,
                body,
            },
            Err(err) => Self::failure(&DataApiError::from(err)),
        }
    }

    #[must_use]
    pub fn failure(err: &DataApiError) -> Self {
        Self::failure_with(FailureBody::from_error(err))
    }

    fn failure_with(body: FailureBody) -> Self {
        let body = serde_json::to_string(&body).unwrap_or_else(|_| {
            format!(r#"{{"kind":"{}","message":"unserializable error"}}"#, body.error.kind)
        });
        Self {
            status_code: STATUS_FAILED,
            body,
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status_code == STATUS_OK
    }
}

/// Error payload, with the failing stage when one is known.
#[derive(Debug, Clone, Serialize)]
pub struct FailureBody {
    #[serde(flatten)]
    pub error: ErrorBody,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statement_index: Option<usize>,
}

impl FailureBody {
    fn from_error(err: &DataApiError) -> Self {
        Self {
            error: err.to_body(),
            stage: None,
            unit: None,
            statement_index: None,
        }
    }

    fn from_run_failure(failure: &RunFailure) -> Self {
        Self {
            stage: Some("migrate".into()),
            unit: failure.unit.clone(),
            statement_index: failure.statement_index,
            ..Self::from_error(&failure.error)
        }
    }

    fn from_reset_error(err: &ResetError) -> Self {
        match err {
            ResetError::Preflight(cause) => Self {
                stage: Some("preflight".into()),
                ..Self::from_error(cause)
            },
            ResetError::Admin { step, source } => Self {
                stage: Some(step.to_string()),
                ..Self::from_error(source)
            },
            ResetError::Migration(failure) => Self::from_run_failure(failure),
        }
    }
}

/// Name and email for a new row of the primary table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUser {
    pub name: String,
    pub email: String,
}

impl NewUser {
    /// A user with a random, unique email.
    #[must_use]
    pub fn generated() -> Self {
        let id = Uuid::new_v4();
        Self {
            name: format!("{id}-name"),
            email: format!("{id}@test.com"),
        }
    }
}

async fn bounded<T, F>(config: &AppConfig, fut: F) -> Result<T, DataApiError>
where
    F: Future<Output = Result<T, DataApiError>>,
{
    tokio::time::timeout(config.timeout, fut)
        .await
        .map_err(|_| DataApiError::Timeout(config.timeout))?
}

fn respond<T: Serialize>(name: &str, result: Result<T, DataApiError>) -> HandlerResponse {
    match result {
        Ok(value) => HandlerResponse::ok(&value),
        Err(err) => {
            warn!(handler = name, kind = err.kind(), error = %err, "handler failed");
            HandlerResponse::failure(&err)
        }
    }
}

/// Drop, recreate and migrate the configured database.
pub async fn reset_database<C: StatementClient + ?Sized>(
    client: &C,
    config: &AppConfig,
) -> HandlerResponse {
    info!(database = %config.database, "reset requested");
    let options = ResetOptions {
        primary_table: Some(config.primary_table.clone()),
        migration_timeout: None,
    };
    let coordinator = DatabaseResetCoordinator::new(client, options);
    let outcome = tokio::time::timeout(
        config.timeout,
        coordinator.reset(
            &config.admin_endpoint(),
            &config.endpoint(),
            &config.migrations_dir,
        ),
    )
    .await;
    match outcome {
        Ok(Ok(report)) => HandlerResponse::ok(&report),
        Ok(Err(err)) => {
            warn!(handler = "reset_database", error = %err, "handler failed");
            HandlerResponse::failure_with(FailureBody::from_reset_error(&err))
        }
        Err(_) => HandlerResponse::failure(&DataApiError::Timeout(config.timeout)),
    }
}

/// Apply every migration to the configured database without dropping it.
pub async fn run_migrations<C: StatementClient + ?Sized>(
    client: &C,
    config: &AppConfig,
) -> HandlerResponse {
    let plan = match MigrationLoader::new(&config.migrations_dir).discover() {
        Ok(plan) => plan,
        Err(err) => return respond::<()>("run_migrations", Err(err)),
    };
    let mut session = TransactionSession::new(client, config.endpoint());
    match MigrationRunner::new()
        .run_with_timeout(&plan, &mut session, config.timeout)
        .await
    {
        Ok(report) => HandlerResponse::ok(&report),
        Err(failure) => {
            warn!(handler = "run_migrations", error = %failure, "handler failed");
            HandlerResponse::failure_with(FailureBody::from_run_failure(&failure))
        }
    }
}

fn insert_user(user: &NewUser) -> Statement {
    Statement::new(
        r#"INSERT INTO "User" ("name", "email") VALUES ($1, $2) RETURNING "name", "email""#,
    )
    .bind("name", RowValues::Text(user.name.clone()))
    .bind("email", RowValues::Text(user.email.clone()))
}

fn single_row(rows: &RowSet) -> Result<DbRow, DataApiError> {
    rows.results.first().cloned().ok_or_else(|| {
        DataApiError::TransactionError("statement returned no row".into())
    })
}

/// Insert one user in auto-commit mode; `None` generates a unique one.
pub async fn create_user<C: StatementClient + ?Sized>(
    client: &C,
    config: &AppConfig,
    user: Option<NewUser>,
) -> HandlerResponse {
    let user = user.unwrap_or_else(NewUser::generated);
    let result = bounded(config, async {
        let statement = insert_user(&user);
        let rows = client
            .execute(&config.endpoint(), None, &statement.sql, &statement.params)
            .await?;
        single_row(&rows)
    })
    .await;
    respond("create_user", result)
}

pub async fn get_all_users<C: StatementClient + ?Sized>(
    client: &C,
    config: &AppConfig,
) -> HandlerResponse {
    let result = bounded(config, async {
        let rows = client
            .execute(
                &config.endpoint(),
                None,
                r#"SELECT "name", "email" FROM "User""#,
                &[],
            )
            .await?;
        Ok(rows.results)
    })
    .await;
    respond("get_all_users", result)
}

/// Create a user, rename it and read it back, all in one transaction.
pub async fn create_update_get<C: StatementClient + ?Sized>(
    client: &C,
    config: &AppConfig,
) -> HandlerResponse {
    let user = NewUser::generated();
    let mut session = TransactionSession::new(client, config.endpoint());
    let result = bounded(config, async {
        session.open().await?;
        let created = single_row(session.run(&insert_user(&user)).await?)?;
        let email = created
            .get("email")
            .cloned()
            .unwrap_or_else(|| RowValues::Text(user.email.clone()));
        session
            .run(
                &Statement::new(
                    r#"UPDATE "User" SET "name" = "name" || '- Updated' WHERE "email" = $1"#,
                )
                .bind("email", email.clone()),
            )
            .await?;
        let fetched = single_row(
            session
                .run(
                    &Statement::new(r#"SELECT "name", "email" FROM "User" WHERE "email" = $1"#)
                        .bind("email", email),
                )
                .await?,
        )?;
        session.commit().await?;
        Ok(fetched)
    })
    .await;
    if session.state() == SessionState::Active {
        let _ = session.rollback();
    }
    respond("create_update_get", result)
}

/// Exercise begin/execute/commit directly: recreate the `User` table, insert a
/// row and read it back inside a single transaction.
pub async fn probe_data_api<C: StatementClient + ?Sized>(
    client: &C,
    config: &AppConfig,
) -> HandlerResponse {
    let email = format!("{}@test.com", Uuid::new_v4());
    let statements = [
        Statement::new(r#"DROP TABLE IF EXISTS "User""#),
        Statement::new(r#"CREATE TABLE "User" ("name" TEXT NOT NULL, "email" TEXT NOT NULL)"#),
        Statement::new(r#"CREATE UNIQUE INDEX "User_email_key" ON "User"("email")"#),
        Statement::new(r#"INSERT INTO "User" ("name", "email") VALUES ($1, $2)"#)
            .bind("name", RowValues::Text("test".into()))
            .bind("email", RowValues::Text(email)),
        Statement::new(r#"SELECT "User"."email", "User"."name" FROM "User" WHERE 1=1"#),
    ];
    let mut session = TransactionSession::new(client, config.endpoint());
    let result: Result<CommitResult, DataApiError> = bounded(config, async {
        session.open().await?;
        for statement in &statements {
            session.run(statement).await?;
        }
        session.commit().await
    })
    .await;
    if session.state() == SessionState::Active {
        let _ = session.rollback();
    }
    respond("probe_data_api", result)
}
