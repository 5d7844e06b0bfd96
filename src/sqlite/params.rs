use rusqlite::types::Value;

use crate::error::DataApiError;
use crate::types::{ParamConverter, RowValues, SqlParam};

/// Convert a single `RowValues` to a rusqlite `Value`.
#[must_use]
pub fn row_value_to_sqlite_value(value: &RowValues) -> Value {
    match value {
        RowValues::Int(i) => Value::Integer(*i),
        RowValues::Float(f) => Value::Real(*f),
        RowValues::Text(s) => Value::Text(s.clone()),
        RowValues::Bool(b) => Value::Integer(i64::from(*b)),
        RowValues::Timestamp(dt) => Value::Text(dt.format("%F %T%.f").to_string()),
        RowValues::Null => Value::Null,
        RowValues::JSON(jval) => Value::Text(jval.to_string()),
        RowValues::Blob(bytes) => Value::Blob(bytes.clone()),
    }
}

/// Unified `SQLite` parameter container, bound positionally in declaration order.
pub struct Params(pub Vec<Value>);

impl Params {
    /// Convert named parameters into `SQLite` values.
    #[must_use]
    pub fn convert(params: &[SqlParam]) -> Self {
        Params(
            params
                .iter()
                .map(|p| row_value_to_sqlite_value(&p.value))
                .collect(),
        )
    }

    /// Borrow the underlying values.
    #[must_use]
    pub fn as_values(&self) -> &[Value] {
        &self.0
    }
}

impl ParamConverter<'_> for Params {
    type Converted = Params;

    fn convert_sql_params(params: &[SqlParam]) -> Result<Self::Converted, DataApiError> {
        Ok(Self::convert(params))
    }
}
