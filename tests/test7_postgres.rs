#![cfg(feature = "test-utils-postgres")]

use std::fs;
use std::path::Path;

use sql_dataapi::prelude::*;
use sql_dataapi::test_utils::postgres::{EmbeddedPostgres, setup_postgres_embedded};

// One server at a time; the bundled install directory is shared.
static SERIAL: tokio::sync::Mutex<()> = tokio::sync::Mutex::const_new(());

fn write_unit(root: &Path, name: &str, sql: &str) {
    let dir = root.join(name);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("migration.sql"), sql).unwrap();
}

fn user_migrations() -> tempfile::TempDir {
    let root = tempfile::tempdir().unwrap();
    fs::write(root.path().join("migration_lock.toml"), "provider = \"postgresql\"\n").unwrap();
    write_unit(
        root.path(),
        "20240101000000_init",
        "-- CreateTable\n\
         CREATE TABLE \"User\" (\"name\" TEXT NOT NULL, \"email\" TEXT NOT NULL);\n\n\
         -- CreateIndex\n\
         CREATE UNIQUE INDEX \"User_email_key\" ON \"User\"(\"email\");\n",
    );
    root
}

async fn create_database(
    client: &PostgresStatementClient,
    server: &EmbeddedPostgres,
    name: &str,
) -> Result<EndpointIdentity, DataApiError> {
    client
        .execute(
            &server.endpoint("postgres"),
            None,
            &format!("CREATE DATABASE {name}"),
            &[],
        )
        .await?;
    Ok(server.endpoint(name))
}

async fn public_tables(
    client: &PostgresStatementClient,
    endpoint: &EndpointIdentity,
) -> Result<Vec<String>, DataApiError> {
    let rows = client
        .execute(
            endpoint,
            None,
            "SELECT table_name::text AS table_name FROM information_schema.tables \
             WHERE table_schema = 'public' ORDER BY table_name",
            &[],
        )
        .await?;
    Ok(rows
        .results
        .iter()
        .filter_map(|row| row.get("table_name").and_then(RowValues::as_text))
        .map(String::from)
        .collect())
}

#[tokio::test]
async fn test7_postgres_failed_unit_leaves_no_trace() -> Result<(), Box<dyn std::error::Error>> {
    let _serial = SERIAL.lock().await;
    let server = setup_postgres_embedded().await?;
    let client = PostgresStatementClient::new();
    let endpoint = create_database(&client, &server, "atomic_db").await?;

    let migrations = tempfile::tempdir()?;
    write_unit(
        migrations.path(),
        "20240101000000_init",
        "CREATE TABLE a (id INT);\nINSERT INTO a (id) VALUES (1);\n",
    );
    write_unit(
        migrations.path(),
        "20240102000000_broken",
        "CREATE TABLE b (id INT);\nINSERT INTO missing_table VALUES (1);\n",
    );
    let plan = MigrationLoader::new(migrations.path()).discover()?;

    let mut session = TransactionSession::new(&client, endpoint.clone());
    let failure = MigrationRunner::new()
        .run(&plan, &mut session)
        .await
        .expect_err("second unit must fail");
    assert_eq!(failure.unit.as_deref(), Some("20240102000000_broken"));
    assert_eq!(failure.statement_index, Some(1));
    match &failure.error {
        DataApiError::StatementError { sql, cause, .. } => {
            assert_eq!(sql, "INSERT INTO missing_table VALUES (1)");
            assert!(cause.contains("42P01"), "{cause}");
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(client.open_transactions(), 0);
    assert!(public_tables(&client, &endpoint).await?.is_empty());

    // A rolled-back session leaves nothing behind either.
    client
        .execute(&endpoint, None, "CREATE TABLE t (v INT)", &[])
        .await?;
    let mut session = TransactionSession::new(&client, endpoint.clone());
    session.open().await?;
    session
        .run(&Statement::new("INSERT INTO t (v) VALUES ($1)").bind("v", RowValues::Int(1)))
        .await?;
    session.rollback()?;
    assert_eq!(client.open_transactions(), 0);
    let count = client
        .execute(&endpoint, None, "SELECT COUNT(*) AS n FROM t", &[])
        .await?;
    assert_eq!(count.results[0].get("n"), Some(&RowValues::Int(0)));

    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn test7_postgres_error_mapping() -> Result<(), Box<dyn std::error::Error>> {
    let _serial = SERIAL.lock().await;
    let server = setup_postgres_embedded().await?;
    let client = PostgresStatementClient::new();
    let endpoint = create_database(&client, &server, "errors_db").await?;

    // SQLSTATE 28P01: wrong password.
    let rejected = EndpointIdentity::new(server.resource(), "not-the-password", "errors_db");
    let err = client.begin(&rejected).await.unwrap_err();
    assert!(matches!(err, DataApiError::AuthError(_)), "{err:?}");
    assert!(!err.is_retryable());

    // A failed statement abandons the transaction; commit then has no handle.
    let handle = client.begin(&endpoint).await?;
    let err = client
        .execute(&endpoint, Some(&handle), "SELECT * FROM missing_table", &[])
        .await
        .unwrap_err();
    assert!(matches!(err, DataApiError::StatementError { .. }));
    assert_eq!(client.open_transactions(), 0);
    let err = client.commit(&endpoint, &handle).await.unwrap_err();
    assert!(matches!(err, DataApiError::TransactionError(_)));

    // Database DDL is refused inside a transaction and accepted outside one.
    let handle = client.begin(&endpoint).await?;
    let err = client
        .execute(&endpoint, Some(&handle), "CREATE DATABASE inner_db", &[])
        .await
        .unwrap_err();
    assert!(matches!(err, DataApiError::StatementError { .. }));
    let admin = server.endpoint("postgres");
    client
        .execute(&admin, None, "CREATE DATABASE inner_db", &[])
        .await?;
    client
        .execute(&admin, None, "DROP DATABASE IF EXISTS inner_db", &[])
        .await?;
    client
        .execute(&admin, None, "DROP DATABASE IF EXISTS inner_db", &[])
        .await?;

    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn test7_postgres_reset_is_repeatable() -> Result<(), Box<dyn std::error::Error>> {
    let _serial = SERIAL.lock().await;
    let server = setup_postgres_embedded().await?;
    let client = PostgresStatementClient::new();
    let migrations = user_migrations();
    let admin = server.endpoint("postgres");
    let target = server.endpoint("appdb");
    let options = ResetOptions {
        primary_table: Some("User".into()),
        migration_timeout: None,
    };
    let coordinator = DatabaseResetCoordinator::new(&client, options);

    let first = coordinator.reset(&admin, &target, migrations.path()).await?;
    assert_eq!(first.migrations.statements_applied, 2);
    client
        .execute(
            &target,
            None,
            "INSERT INTO \"User\" (\"name\", \"email\") VALUES ('a', 'a@test.com')",
            &[],
        )
        .await?;

    // A session left open on the target is terminated by the second reset.
    let mut session = TransactionSession::new(&client, target.clone());
    session.open().await?;

    let second = coordinator.reset(&admin, &target, migrations.path()).await?;
    assert_eq!(second.migrations.statements_applied, 2);
    let schema = second.schema.expect("schema check requested");
    assert!(schema.error.is_none(), "{:?}", schema.error);
    let columns: Vec<String> = schema
        .columns
        .expect("columns reported")
        .results
        .iter()
        .filter_map(|row| row.get("column_name").and_then(RowValues::as_text))
        .map(String::from)
        .collect();
    assert_eq!(columns, vec!["name".to_string(), "email".to_string()]);

    assert_eq!(public_tables(&client, &target).await?, vec!["User".to_string()]);
    let rows = client
        .execute(&target, None, "SELECT * FROM \"User\"", &[])
        .await?;
    assert!(rows.is_empty());

    assert!(session.run(&Statement::new("SELECT 1")).await.is_err());
    assert_eq!(session.state(), SessionState::RolledBack);
    assert_eq!(client.open_transactions(), 0);

    server.stop().await;
    Ok(())
}
