#![cfg(feature = "sqlite")]

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde_json::Value;
use sql_dataapi::config::{
    CREDENTIAL_ENV, DATABASE_ENV, MIGRATIONS_DIR_ENV, REGION_ENV, RESOURCE_ENV,
};
use sql_dataapi::handlers::{self, NewUser};
use sql_dataapi::prelude::*;

fn config(cluster: &Path, migrations: &Path) -> AppConfig {
    let vars: HashMap<&str, String> = [
        (RESOURCE_ENV, cluster.to_string_lossy().into_owned()),
        (CREDENTIAL_ENV, "unused".to_string()),
        (DATABASE_ENV, "appdb".to_string()),
        (REGION_ENV, "us-east-1".to_string()),
        (MIGRATIONS_DIR_ENV, migrations.to_string_lossy().into_owned()),
    ]
    .into_iter()
    .collect();
    AppConfig::from_lookup(|key| vars.get(key).cloned()).unwrap()
}

fn user_migrations() -> tempfile::TempDir {
    let root = tempfile::tempdir().unwrap();
    fs::write(root.path().join("migration_lock.toml"), "").unwrap();
    let unit = root.path().join("20240101000000_init");
    fs::create_dir(&unit).unwrap();
    fs::write(
        unit.join("migration.sql"),
        "-- CreateTable\n\
         CREATE TABLE \"User\" (\"name\" TEXT NOT NULL, \"email\" TEXT NOT NULL);\n\n\
         -- CreateIndex\n\
         CREATE UNIQUE INDEX \"User_email_key\" ON \"User\"(\"email\");\n",
    )
    .unwrap();
    root
}

fn body(resp: &handlers::HandlerResponse) -> Value {
    serde_json::from_str(&resp.body).unwrap()
}

#[tokio::test]
async fn test5_reset_create_list_and_duplicate_email() {
    let cluster = tempfile::tempdir().unwrap();
    let migrations = user_migrations();
    let cfg = config(cluster.path(), migrations.path());
    let client = SqliteStatementClient::new();

    let reset = handlers::reset_database(&client, &cfg).await;
    assert_eq!(reset.status_code, 200, "{}", reset.body);
    assert_eq!(body(&reset)["migrations"]["statements_applied"], 2);

    let alice = NewUser {
        name: "alice".into(),
        email: "alice@test.com".into(),
    };
    let created = handlers::create_user(&client, &cfg, Some(alice.clone())).await;
    assert_eq!(created.status_code, 200, "{}", created.body);
    assert_eq!(body(&created)["email"], "alice@test.com");

    let listed = handlers::get_all_users(&client, &cfg).await;
    assert_eq!(listed.status_code, 200);
    let users = body(&listed);
    assert_eq!(users.as_array().map(Vec::len), Some(1));
    assert_eq!(users[0]["name"], "alice");

    let duplicate = handlers::create_user(
        &client,
        &cfg,
        Some(NewUser {
            name: "impostor".into(),
            email: alice.email.clone(),
        }),
    )
    .await;
    assert_eq!(duplicate.status_code, 400);
    let err = body(&duplicate);
    assert_eq!(err["kind"], "StatementError");
    assert_eq!(err["params"][1]["value"], "alice@test.com");

    let listed = handlers::get_all_users(&client, &cfg).await;
    let users = body(&listed);
    assert_eq!(users.as_array().map(Vec::len), Some(1));
    assert_eq!(users[0]["name"], "alice");
}

#[tokio::test]
async fn test5_generated_users_and_transactional_update() {
    let cluster = tempfile::tempdir().unwrap();
    let migrations = user_migrations();
    let cfg = config(cluster.path(), migrations.path());
    let client = SqliteStatementClient::new();
    assert!(handlers::reset_database(&client, &cfg).await.is_success());

    assert!(handlers::create_user(&client, &cfg, None).await.is_success());
    assert!(handlers::create_user(&client, &cfg, None).await.is_success());

    let updated = handlers::create_update_get(&client, &cfg).await;
    assert_eq!(updated.status_code, 200, "{}", updated.body);
    let user = body(&updated);
    assert!(user["name"].as_str().unwrap().ends_with("- Updated"));

    let users = body(&handlers::get_all_users(&client, &cfg).await);
    assert_eq!(users.as_array().map(Vec::len), Some(3));
    assert_eq!(client.open_transactions(), 0);
}

#[tokio::test]
async fn test5_probe_and_migrate_without_reset() {
    let cluster = tempfile::tempdir().unwrap();
    let migrations = user_migrations();
    let cfg = config(cluster.path(), migrations.path());
    let client = SqliteStatementClient::new();

    // The database does not exist yet; nothing to connect to.
    let missing = handlers::run_migrations(&client, &cfg).await;
    assert_eq!(missing.status_code, 400);
    assert_eq!(body(&missing)["kind"], "ConnectionError");
    assert_eq!(body(&missing)["retryable"], true);

    let admin = cfg.admin_endpoint();
    client
        .execute(&admin, None, "CREATE DATABASE appdb", &[])
        .await
        .unwrap();

    let migrated = handlers::run_migrations(&client, &cfg).await;
    assert_eq!(migrated.status_code, 200, "{}", migrated.body);

    // Applying the same migrations twice fails on the existing table, atomically.
    let again = handlers::run_migrations(&client, &cfg).await;
    assert_eq!(again.status_code, 400);
    let err = body(&again);
    assert_eq!(err["stage"], "migrate");
    assert_eq!(err["unit"], "20240101000000_init");
    assert_eq!(err["statement_index"], 0);

    let probe = handlers::probe_data_api(&client, &cfg).await;
    assert_eq!(probe.status_code, 200, "{}", probe.body);
    assert_eq!(body(&probe)["status"], "Transaction Committed");

    let users = body(&handlers::get_all_users(&client, &cfg).await);
    assert_eq!(users.as_array().map(Vec::len), Some(1));
    assert_eq!(users[0]["name"], "test");
}

#[tokio::test]
async fn test5_reset_reports_the_failing_stage() {
    let cluster = tempfile::tempdir().unwrap();
    let migrations = user_migrations();
    let mut cfg = config(cluster.path(), migrations.path());
    cfg.migrations_dir = migrations.path().join("does_not_exist");
    let client = SqliteStatementClient::new();

    let resp = handlers::reset_database(&client, &cfg).await;
    assert_eq!(resp.status_code, 400);
    let err = body(&resp);
    assert_eq!(err["stage"], "preflight");
    assert_eq!(err["kind"], "MigrationIoError");
}
