use chrono::NaiveDateTime;
use serde_json::Value;
use tokio_postgres::{Client, Row, Statement};

use super::params::Params;
use crate::error::DataApiError;
use crate::results::RowSet;
use crate::types::{ParamConverter, RowValues, SqlParam};

/// Extracts a `RowValues` from a `tokio_postgres` Row at the given index.
///
/// # Errors
/// Returns the driver error if the column cannot be decoded.
pub fn postgres_extract_value(row: &Row, idx: usize) -> Result<RowValues, tokio_postgres::Error> {
    let type_info = row.columns()[idx].type_();

    // Match on the type name; anything unrecognised is read as text.
    match type_info.name() {
        "int2" => {
            let val: Option<i16> = row.try_get(idx)?;
            Ok(val.map_or(RowValues::Null, |v| RowValues::Int(i64::from(v))))
        }
        "int4" => {
            let val: Option<i32> = row.try_get(idx)?;
            Ok(val.map_or(RowValues::Null, |v| RowValues::Int(i64::from(v))))
        }
        "int8" => {
            let val: Option<i64> = row.try_get(idx)?;
            Ok(val.map_or(RowValues::Null, RowValues::Int))
        }
        "float4" => {
            let val: Option<f32> = row.try_get(idx)?;
            Ok(val.map_or(RowValues::Null, |v| RowValues::Float(f64::from(v))))
        }
        "float8" => {
            let val: Option<f64> = row.try_get(idx)?;
            Ok(val.map_or(RowValues::Null, RowValues::Float))
        }
        "bool" => {
            let val: Option<bool> = row.try_get(idx)?;
            Ok(val.map_or(RowValues::Null, RowValues::Bool))
        }
        "timestamp" => {
            let val: Option<NaiveDateTime> = row.try_get(idx)?;
            Ok(val.map_or(RowValues::Null, RowValues::Timestamp))
        }
        "timestamptz" => {
            let val: Option<chrono::DateTime<chrono::Utc>> = row.try_get(idx)?;
            Ok(val.map_or(RowValues::Null, |v| RowValues::Timestamp(v.naive_utc())))
        }
        "json" | "jsonb" => {
            let val: Option<Value> = row.try_get(idx)?;
            Ok(val.map_or(RowValues::Null, RowValues::JSON))
        }
        "bytea" => {
            let val: Option<Vec<u8>> = row.try_get(idx)?;
            Ok(val.map_or(RowValues::Null, RowValues::Blob))
        }
        _ => {
            let val: Option<String> = row.try_get(idx)?;
            Ok(val.map_or(RowValues::Null, RowValues::Text))
        }
    }
}

/// Build a result set using statement metadata for column names.
///
/// # Errors
/// Returns the driver error from row value extraction.
pub fn build_result_set(stmt: &Statement, rows: &[Row]) -> Result<RowSet, tokio_postgres::Error> {
    let column_names: Vec<String> = stmt
        .columns()
        .iter()
        .map(|col| col.name().to_string())
        .collect();
    let column_count = column_names.len();

    let mut result_set = RowSet::with_capacity(rows.len());
    result_set.set_column_names(std::sync::Arc::new(column_names));

    for row in rows {
        let mut row_values = Vec::with_capacity(column_count);
        for idx in 0..column_count {
            row_values.push(postgres_extract_value(row, idx)?);
        }
        result_set.add_row_values(row_values);
    }

    Ok(result_set)
}

/// Prepare and run one statement on `client`.
///
/// Statements that describe no result columns are executed for their affected-row
/// count; everything else is queried for rows.
pub(crate) async fn run_statement(
    client: &Client,
    sql: &str,
    params: &[SqlParam],
) -> Result<RowSet, StatementFailure> {
    let stmt = client.prepare(sql).await?;
    let converted = Params::convert_sql_params(params).map_err(StatementFailure::Local)?;

    if stmt.columns().is_empty() {
        let rows = client.execute(&stmt, converted.as_refs()).await?;
        let affected = usize::try_from(rows).map_err(|e| {
            StatementFailure::Local(DataApiError::ParameterError(format!(
                "invalid rows affected count: {e}"
            )))
        })?;
        Ok(RowSet::affected(affected))
    } else {
        let rows = client.query(&stmt, converted.as_refs()).await?;
        Ok(build_result_set(&stmt, &rows)?)
    }
}

/// Why a statement did not produce a result.
#[derive(Debug)]
pub(crate) enum StatementFailure {
    Driver(tokio_postgres::Error),
    Local(DataApiError),
}

impl From<tokio_postgres::Error> for StatementFailure {
    fn from(err: tokio_postgres::Error) -> Self {
        StatementFailure::Driver(err)
    }
}
