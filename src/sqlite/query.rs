use std::sync::Arc;

use rusqlite::types::Value;
use rusqlite::{Connection, Statement, params_from_iter};

use super::params::Params;
use crate::results::RowSet;
use crate::types::{RowValues, SqlParam};

/// Extract a `RowValues` from a `SQLite` row.
///
/// # Errors
/// Returns the driver error if the column cannot be read.
pub fn sqlite_extract_value_sync(
    row: &rusqlite::Row,
    idx: usize,
) -> Result<RowValues, rusqlite::Error> {
    let value: Value = row.get(idx)?;
    Ok(match value {
        Value::Null => RowValues::Null,
        Value::Integer(i) => RowValues::Int(i),
        Value::Real(f) => RowValues::Float(f),
        Value::Text(s) => RowValues::Text(s),
        Value::Blob(b) => RowValues::Blob(b),
    })
}

/// Build a result set from a prepared `SQLite` statement that returns rows.
///
/// # Errors
/// Returns the driver error if execution or extraction fails.
pub fn build_result_set(stmt: &mut Statement, params: &[Value]) -> Result<RowSet, rusqlite::Error> {
    let column_names: Vec<String> = stmt
        .column_names()
        .iter()
        .map(std::string::ToString::to_string)
        .collect();
    let col_count = column_names.len();

    let mut result_set = RowSet::with_capacity(10);
    result_set.set_column_names(Arc::new(column_names));

    let mut rows_iter = stmt.query(params_from_iter(params.iter()))?;
    while let Some(row) = rows_iter.next()? {
        let mut row_values = Vec::with_capacity(col_count);
        for i in 0..col_count {
            row_values.push(sqlite_extract_value_sync(row, i)?);
        }
        result_set.add_row_values(row_values);
    }

    Ok(result_set)
}

/// Prepare and run exactly one statement.
///
/// `prepare` rejects text holding more than one statement, which keeps the
/// one-statement-per-call rule of the protocol.
pub(crate) fn run_statement(
    conn: &Connection,
    sql: &str,
    params: &[SqlParam],
) -> Result<RowSet, rusqlite::Error> {
    let mut stmt = conn.prepare(sql)?;
    let values = Params::convert(params);
    if stmt.column_count() == 0 {
        let affected = stmt.execute(params_from_iter(values.as_values().iter()))?;
        Ok(RowSet::affected(affected))
    } else {
        build_result_set(&mut stmt, values.as_values())
    }
}
