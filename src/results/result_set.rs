use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use super::row::{DbRow, index_columns};
use crate::types::RowValues;

/// The rows and affected-row count produced by one executed statement.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RowSet {
    /// The rows returned by the statement
    #[serde(rename = "rows")]
    pub results: Vec<DbRow>,
    /// Rows affected for DML, rows returned for queries
    pub rows_affected: usize,
    #[serde(skip)]
    column_names: Option<Arc<Vec<String>>>,
    #[serde(skip)]
    column_index: Option<Arc<HashMap<String, usize>>>,
}

impl RowSet {
    /// Create a new result set with a known capacity
    #[must_use]
    pub fn with_capacity(capacity: usize) -> RowSet {
        RowSet {
            results: Vec::with_capacity(capacity),
            ..RowSet::default()
        }
    }

    /// Result of a statement that returns no rows.
    #[must_use]
    pub fn affected(rows_affected: usize) -> RowSet {
        RowSet {
            rows_affected,
            ..RowSet::default()
        }
    }

    /// Set the column names for this result set (to be shared by all rows)
    pub fn set_column_names(&mut self, column_names: Arc<Vec<String>>) {
        self.column_index = Some(Arc::new(index_columns(&column_names)));
        self.column_names = Some(column_names);
    }

    /// Add a row to the result set. Ignored until column names are set.
    pub fn add_row_values(&mut self, row_values: Vec<RowValues>) {
        if let (Some(names), Some(index)) = (&self.column_names, &self.column_index) {
            self.results
                .push(DbRow::with_index(names.clone(), index.clone(), row_values));
            self.rows_affected += 1;
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }
}
