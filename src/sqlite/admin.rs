use std::sync::LazyLock;

use regex::Regex;

static DROP_DATABASE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*DROP\s+DATABASE\s+(IF\s+EXISTS\s+)?([A-Za-z_][A-Za-z0-9_]*)\s*;?\s*$")
        .expect("drop database regex is valid")
});

static CREATE_DATABASE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*CREATE\s+DATABASE\s+([A-Za-z_][A-Za-z0-9_]*)\s*;?\s*$")
        .expect("create database regex is valid")
});

static TERMINATE_BACKENDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bpg_terminate_backend\s*\(").expect("terminate regex is valid")
});

/// Cluster-level statements a file-per-database backend has to interpret itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum AdminCommand {
    /// Close every open transaction on the database named by the first text parameter.
    TerminateConnections,
    DropDatabase { name: String, if_exists: bool },
    CreateDatabase { name: String },
}

pub(super) fn parse(sql: &str) -> Option<AdminCommand> {
    if let Some(caps) = DROP_DATABASE.captures(sql) {
        return Some(AdminCommand::DropDatabase {
            name: caps[2].to_string(),
            if_exists: caps.get(1).is_some(),
        });
    }
    if let Some(caps) = CREATE_DATABASE.captures(sql) {
        return Some(AdminCommand::CreateDatabase {
            name: caps[1].to_string(),
        });
    }
    if TERMINATE_BACKENDS.is_match(sql) {
        return Some(AdminCommand::TerminateConnections);
    }
    None
}
