mod cli;

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use sql_dataapi::StatementClient;
use sql_dataapi::config::AppConfig;
use sql_dataapi::handlers::{self, HandlerResponse, NewUser};

use crate::cli::args::{Args, BackendKind, Command};
use crate::cli::logging::LogWriter;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let writer = match LogWriter::new(args.log.clone()) {
        Ok(writer) => writer,
        Err(err) => {
            eprintln!("failed to open log file: {err}");
            return ExitCode::FAILURE;
        }
    };

    let filter = match &args.log_level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_writer(writer)
        .with_target(false)
        .with_env_filter(filter)
        .init();

    let response = match AppConfig::from_lookup(|key| args.lookup(key)) {
        Ok(config) => {
            let backend = args.backend.unwrap_or(BackendKind::DEFAULT);
            tracing::info!(?backend, ?config, "configuration loaded");
            dispatch(backend, &args.command, &config).await
        }
        Err(err) => HandlerResponse::failure(&err),
    };

    match serde_json::to_string(&response) {
        Ok(json) => println!("{json}"),
        Err(_) => println!("{}", response.body),
    }
    if response.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

async fn dispatch(backend: BackendKind, command: &Command, config: &AppConfig) -> HandlerResponse {
    match backend {
        #[cfg(feature = "postgres")]
        BackendKind::Postgres => {
            let client = sql_dataapi::PostgresStatementClient::new()
                .with_connect_timeout(config.timeout)
                .with_transaction_timeout(config.timeout);
            invoke(&client, command, config).await
        }
        #[cfg(feature = "sqlite")]
        BackendKind::Sqlite => {
            let client =
                sql_dataapi::SqliteStatementClient::new().with_transaction_timeout(config.timeout);
            invoke(&client, command, config).await
        }
    }
}

async fn invoke<C: StatementClient>(
    client: &C,
    command: &Command,
    config: &AppConfig,
) -> HandlerResponse {
    match command {
        Command::Reset => handlers::reset_database(client, config).await,
        Command::Migrate => handlers::run_migrations(client, config).await,
        Command::CreateUser { name, email } => {
            let user = match (name, email) {
                (Some(name), Some(email)) => Some(NewUser {
                    name: name.clone(),
                    email: email.clone(),
                }),
                _ => None,
            };
            handlers::create_user(client, config, user).await
        }
        Command::GetUsers => handlers::get_all_users(client, config).await,
        Command::CreateUpdateGet => handlers::create_update_get(client, config).await,
        Command::Probe => handlers::probe_data_api(client, config).await,
    }
}
