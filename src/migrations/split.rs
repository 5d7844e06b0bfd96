use crate::types::Statement;

/// Split a migration file into individually executable statements.
///
/// The endpoint runs one statement per call, so the text is cut at every `;`.
/// Fragments that are empty or hold only `--` comments are dropped, which also
/// discards whatever trails the final terminator.
///
/// This is a plain delimiter split. Migration authors must not put a literal `;`
/// inside a string, a comment, or a function/procedure body; such a migration is
/// cut mid-statement and the endpoint rejects the pieces.
#[must_use]
pub fn split_statements(sql: &str) -> Vec<Statement> {
    sql.split(';')
        .map(str::trim)
        .filter(|fragment| !is_blank(fragment))
        .map(Statement::new)
        .collect()
}

fn is_blank(fragment: &str) -> bool {
    fragment
        .lines()
        .map(str::trim)
        .all(|line| line.is_empty() || line.starts_with("--"))
}
