//! Result sets returned by `Query` requests.

use std::net::IpAddr;
use std::sync::Arc;

use bytes::Bytes;

use super::value;
use crate::error::{CqlError, Result};

/// A result set: column names plus rows of raw cell values.
#[derive(Debug, Clone, PartialEq)]
pub struct Rows {
    columns: Arc<[String]>,
    rows: Vec<Row>,
}

impl Default for Rows {
    fn default() -> Self {
        Self::new(Vec::new(), Vec::new())
    }
}

impl Rows {
    /// Creates a result set from column names and raw row values.
    ///
    /// Rows shorter than the column list are padded with nulls; extra
    /// values are dropped.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Option<Bytes>>>) -> Self {
        let columns: Arc<[String]> = columns.into();
        let rows = rows
            .into_iter()
            .map(|mut values| {
                values.resize(columns.len(), None);
                Row {
                    columns: Arc::clone(&columns),
                    values,
                }
            })
            .collect();
        Self { columns, rows }
    }

    /// Returns the column names.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Returns the rows.
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Returns the number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns `true` if the result set has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Iterates over the rows.
    pub fn iter(&self) -> std::slice::Iter<'_, Row> {
        self.rows.iter()
    }
}

impl<'a> IntoIterator for &'a Rows {
    type Item = &'a Row;
    type IntoIter = std::slice::Iter<'a, Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

/// A single row of a result set.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<Option<Bytes>>,
}

impl Row {
    fn raw(&self, column: &str) -> Result<Option<&Bytes>> {
        let index = self
            .columns
            .iter()
            .position(|c| c == column)
            .ok_or_else(|| CqlError::Protocol(format!("no column named '{}'", column)))?;
        Ok(self.values[index].as_ref())
    }

    /// Returns `true` if the column is null or absent from the result set.
    pub fn is_null(&self, column: &str) -> bool {
        !matches!(self.raw(column), Ok(Some(_)))
    }

    /// Reads a `text` column.
    pub fn get_string(&self, column: &str) -> Result<Option<String>> {
        self.raw(column)?.map(value::decode_text).transpose()
    }

    /// Reads a `boolean` column.
    pub fn get_bool(&self, column: &str) -> Result<Option<bool>> {
        self.raw(column)?.map(value::decode_boolean).transpose()
    }

    /// Reads an `int` column.
    pub fn get_int(&self, column: &str) -> Result<Option<i32>> {
        self.raw(column)?.map(value::decode_int).transpose()
    }

    /// Reads an `inet` column.
    pub fn get_inet(&self, column: &str) -> Result<Option<IpAddr>> {
        self.raw(column)?.map(value::decode_inet).transpose()
    }
}
