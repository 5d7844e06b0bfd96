use chrono::NaiveDateTime;
use serde::ser::{Serialize, Serializer};
use serde_json::Value as JsonValue;

use crate::error::DataApiError;

/// Values that can be stored in a database row or used as statement parameters.
///
/// One enum is shared by every backend so callers never branch on driver types:
/// ```rust
/// use sql_dataapi::prelude::*;
///
/// let params = vec![
///     RowValues::Int(1),
///     RowValues::Text("alice".into()),
///     RowValues::Bool(true),
/// ];
/// # let _ = params;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum RowValues {
    /// Integer value (64-bit)
    Int(i64),
    /// Floating point value (64-bit)
    Float(f64),
    /// Text/string value
    Text(String),
    /// Boolean value
    Bool(bool),
    /// Timestamp value
    Timestamp(NaiveDateTime),
    /// NULL value
    Null,
    /// JSON value
    JSON(JsonValue),
    /// Binary data
    Blob(Vec<u8>),
}

impl RowValues {
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let RowValues::Text(value) = self {
            Some(value)
        } else {
            None
        }
    }
}

// 64-bit integers go out as strings so JSON consumers never lose precision.
impl Serialize for RowValues {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            RowValues::Int(i) => serializer.serialize_str(&i.to_string()),
            RowValues::Float(f) => serializer.serialize_f64(*f),
            RowValues::Text(s) => serializer.serialize_str(s),
            RowValues::Bool(b) => serializer.serialize_bool(*b),
            RowValues::Timestamp(dt) => {
                serializer.serialize_str(&dt.format("%F %T%.f").to_string())
            }
            RowValues::Null => serializer.serialize_none(),
            RowValues::JSON(value) => value.serialize(serializer),
            RowValues::Blob(bytes) => bytes.serialize(serializer),
        }
    }
}

/// A named statement parameter.
///
/// Parameters bind positionally in declaration order (`$1`, `$2`, ...; `SQLite`
/// numbers `$N` placeholders by first appearance, so keep them in order). The
/// name travels with the value for diagnostics.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct SqlParam {
    pub name: String,
    pub value: RowValues,
}

impl SqlParam {
    #[must_use]
    pub fn new(name: impl Into<String>, value: RowValues) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// One executable SQL command plus its parameters.
///
/// Must not contain more than one top-level statement: the endpoint executes
/// exactly one statement per call.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<SqlParam>,
}

impl Statement {
    #[must_use]
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_params(sql: impl Into<String>, params: Vec<SqlParam>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    /// Append a named parameter, bound at the next position.
    #[must_use]
    pub fn bind(mut self, name: impl Into<String>, value: RowValues) -> Self {
        self.params.push(SqlParam::new(name, value));
        self
    }
}

/// Convert a slice of `SqlParam` into backend-specific parameters.
pub trait ParamConverter<'a> {
    type Converted;

    /// Convert a slice of parameters into the backend's parameter type.
    ///
    /// # Errors
    ///
    /// Returns `DataApiError::ParameterError` if the conversion fails for any parameter.
    fn convert_sql_params(params: &'a [SqlParam]) -> Result<Self::Converted, DataApiError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ints_serialize_as_strings() {
        let json = serde_json::to_value(RowValues::Int(534_543_543_534)).unwrap();
        assert_eq!(json, JsonValue::String("534543543534".into()));
    }

    #[test]
    fn null_serializes_as_json_null() {
        assert_eq!(serde_json::to_value(RowValues::Null).unwrap(), JsonValue::Null);
    }
}
