use std::fs;
use std::path::Path;

use sql_dataapi::prelude::*;
use sql_dataapi::reset::{AdminStep, ResetError};
use sql_dataapi::test_utils::{RecordedCall, RecordingClient};

fn migrations() -> tempfile::TempDir {
    let root = tempfile::tempdir().unwrap();
    fs::write(root.path().join("migration_lock.toml"), "").unwrap();
    let unit = root.path().join("20240101000000_init");
    fs::create_dir(&unit).unwrap();
    fs::write(
        unit.join("migration.sql"),
        "CREATE TABLE \"User\" (\"name\" TEXT NOT NULL, \"email\" TEXT NOT NULL);\n\
         CREATE UNIQUE INDEX \"User_email_key\" ON \"User\"(\"email\");\n",
    )
    .unwrap();
    root
}

fn endpoints() -> (EndpointIdentity, EndpointIdentity) {
    let admin = EndpointIdentity::new("cluster", "secret", "postgres");
    let target = admin.with_database("appdb");
    (admin, target)
}

async fn reset(
    client: &RecordingClient,
    root: &Path,
) -> Result<sql_dataapi::ResetReport, ResetError> {
    let (admin, target) = endpoints();
    DatabaseResetCoordinator::new(client, ResetOptions::default())
        .reset(&admin, &target, root)
        .await
}

#[tokio::test]
async fn test4_reset_is_repeatable() {
    let root = migrations();
    let client = RecordingClient::new().with_databases(["postgres"]);

    let first = reset(&client, root.path()).await.unwrap();
    let second = reset(&client, root.path()).await.unwrap();
    assert_eq!(first.migrations.statements_applied, 2);
    assert_eq!(second.migrations.statements_applied, 2);
    assert!(second.schema.is_none());
    assert_eq!(
        client.databases(),
        Some(vec!["appdb".to_string(), "postgres".to_string()])
    );
    assert_eq!(client.commit_count(), 2);
}

#[tokio::test]
async fn test4_admin_steps_precede_migrations_on_the_admin_endpoint() {
    let root = migrations();
    let client = RecordingClient::new().with_databases(["postgres"]);
    reset(&client, root.path()).await.unwrap();

    let calls = client.calls();
    let admin_calls: Vec<_> = calls
        .iter()
        .take(3)
        .map(|call| match call {
            RecordedCall::Execute {
                database,
                handle: None,
                sql,
                ..
            } => (database.as_str(), sql.as_str()),
            other => panic!("expected admin execute, got {other:?}"),
        })
        .collect();
    assert_eq!(admin_calls[0].0, "postgres");
    assert!(admin_calls[0].1.contains("pg_terminate_backend"));
    assert_eq!(admin_calls[1], ("postgres", "DROP DATABASE IF EXISTS appdb"));
    assert_eq!(admin_calls[2], ("postgres", "CREATE DATABASE appdb"));
    assert!(matches!(&calls[3], RecordedCall::Begin { database } if database == "appdb"));
}

#[tokio::test]
async fn test4_admin_failure_aborts_before_migrations() {
    let root = migrations();
    let client = RecordingClient::new()
        .with_databases(["postgres"])
        .fail_statements_matching(|sql| sql.starts_with("DROP DATABASE"));

    let err = reset(&client, root.path()).await.unwrap_err();
    match &err {
        ResetError::Admin { step, .. } => assert_eq!(*step, AdminStep::DropDatabase),
        other => panic!("unexpected {other:?}"),
    }
    assert!(matches!(err.cause(), DataApiError::StatementError { .. }));
    assert_eq!(client.begin_count(), 0);
    assert_eq!(client.execute_count(), 2);
}

#[tokio::test]
async fn test4_broken_migrations_never_drop_the_database() {
    let root = tempfile::tempdir().unwrap();
    fs::create_dir(root.path().join("20240101000000_missing_sql")).unwrap();
    let client = RecordingClient::new().with_databases(["postgres", "appdb"]);

    let err = reset(&client, root.path()).await.unwrap_err();
    assert!(matches!(err, ResetError::Preflight(DataApiError::MigrationIo { .. })));
    assert!(client.calls().is_empty());
}

#[tokio::test]
async fn test4_invalid_database_name_is_rejected() {
    let root = migrations();
    let client = RecordingClient::new();
    let admin = EndpointIdentity::new("cluster", "secret", "postgres");
    let err = DatabaseResetCoordinator::new(&client, ResetOptions::default())
        .reset(&admin, &admin.with_database("app; DROP"), root.path())
        .await
        .unwrap_err();
    assert!(matches!(err.cause(), DataApiError::ConfigError(_)));
    assert!(client.calls().is_empty());
}

#[tokio::test]
async fn test4_migration_failure_reports_the_unit() {
    let root = migrations();
    let client = RecordingClient::new().fail_statements_matching(|sql| sql.contains("INDEX"));
    let err = reset(&client, root.path()).await.unwrap_err();
    match err {
        ResetError::Migration(failure) => {
            assert_eq!(failure.unit.as_deref(), Some("20240101000000_init"));
            assert_eq!(failure.statement_index, Some(1));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(client.commit_count(), 0);
}

#[cfg(feature = "sqlite")]
#[tokio::test]
async fn test4_sqlite_reset_recreates_an_empty_database() -> Result<(), Box<dyn std::error::Error>>
{
    let cluster = tempfile::tempdir()?;
    let root = migrations();
    let client = SqliteStatementClient::new();
    let admin = EndpointIdentity::new(cluster.path().to_string_lossy(), "", "postgres");
    let target = admin.with_database("appdb");
    let options = ResetOptions {
        primary_table: Some("User".into()),
        migration_timeout: Some(std::time::Duration::from_secs(30)),
    };
    let coordinator = DatabaseResetCoordinator::new(&client, options);

    coordinator.reset(&admin, &target, root.path()).await?;
    client
        .execute(
            &target,
            None,
            "INSERT INTO \"User\" (\"name\", \"email\") VALUES ('a', 'a@test.com')",
            &[],
        )
        .await?;

    // A transaction left open on the target is terminated by the reset.
    let mut session = TransactionSession::new(&client, target.clone());
    session.open().await?;

    let report = coordinator.reset(&admin, &target, root.path()).await?;
    assert_eq!(report.database, "appdb");
    // INFORMATION_SCHEMA does not exist on SQLite; the check reports instead of failing.
    let schema = report.schema.expect("schema check requested");
    assert!(schema.columns.is_none());
    assert!(schema.error.is_some());

    let rows = client
        .execute(&target, None, "SELECT * FROM \"User\"", &[])
        .await?;
    assert!(rows.is_empty());

    let err = session.run(&Statement::new("SELECT 1")).await.unwrap_err();
    assert!(matches!(err, DataApiError::TransactionError(_)));
    Ok(())
}
