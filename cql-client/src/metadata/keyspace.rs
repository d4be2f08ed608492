//! Schema model built from the `system.schema_*` survey rows.

use std::collections::BTreeMap;

use cql_core::{CqlError, Result, Row, Rows};

/// A keyspace and its tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyspaceMetadata {
    name: String,
    durable_writes: bool,
    strategy_class: Option<String>,
    strategy_options: Option<String>,
    tables: BTreeMap<String, TableMetadata>,
}

impl KeyspaceMetadata {
    /// Returns the keyspace name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns whether writes to this keyspace go through the commit log.
    pub fn durable_writes(&self) -> bool {
        self.durable_writes
    }

    /// Returns the replication strategy class, if reported.
    pub fn strategy_class(&self) -> Option<&str> {
        self.strategy_class.as_deref()
    }

    /// Returns the raw replication strategy options, if reported.
    pub fn strategy_options(&self) -> Option<&str> {
        self.strategy_options.as_deref()
    }

    /// Returns a table by name.
    pub fn table(&self, name: &str) -> Option<&TableMetadata> {
        self.tables.get(name)
    }

    /// Returns the tables ordered by name.
    pub fn tables(&self) -> impl Iterator<Item = &TableMetadata> {
        self.tables.values()
    }

    pub(crate) fn replace_table(&mut self, table: TableMetadata) {
        self.tables.insert(table.name.clone(), table);
    }

    pub(crate) fn remove_table(&mut self, name: &str) -> Option<TableMetadata> {
        self.tables.remove(name)
    }
}

/// A table and its columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableMetadata {
    keyspace: String,
    name: String,
    comment: Option<String>,
    columns: Vec<ColumnMetadata>,
}

impl TableMetadata {
    /// Returns the owning keyspace name.
    pub fn keyspace(&self) -> &str {
        &self.keyspace
    }

    /// Returns the table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the table comment, if any.
    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    /// Returns the columns ordered by component index, then name.
    pub fn columns(&self) -> &[ColumnMetadata] {
        &self.columns
    }

    /// Returns a column by name.
    pub fn column(&self, name: &str) -> Option<&ColumnMetadata> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// A column of a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMetadata {
    name: String,
    validator: String,
    component_index: Option<i32>,
}

impl ColumnMetadata {
    /// Returns the column name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the validator (type) class name.
    pub fn validator(&self) -> &str {
        &self.validator
    }

    /// Returns the position within a composite key, if any.
    pub fn component_index(&self) -> Option<i32> {
        self.component_index
    }
}

fn required_string(row: &Row, column: &str) -> Result<String> {
    row.get_string(column)?
        .ok_or_else(|| CqlError::Protocol(format!("column '{}' must not be null", column)))
}

fn optional_string(row: &Row, column: &str) -> Result<Option<String>> {
    if row.is_null(column) {
        return Ok(None);
    }
    row.get_string(column)
}

type TableKey = (String, String);

/// Builds tables grouped by keyspace from the column family and column rows.
pub(crate) fn build_tables(
    column_families: &Rows,
    columns: &Rows,
) -> Result<BTreeMap<String, BTreeMap<String, TableMetadata>>> {
    let mut columns_by_table: BTreeMap<TableKey, Vec<ColumnMetadata>> = BTreeMap::new();
    for row in columns {
        let keyspace = required_string(row, "keyspace_name")?;
        let table = required_string(row, "columnfamily_name")?;
        let column = ColumnMetadata {
            name: required_string(row, "column_name")?,
            validator: required_string(row, "validator")?,
            component_index: if row.is_null("component_index") {
                None
            } else {
                row.get_int("component_index")?
            },
        };
        columns_by_table
            .entry((keyspace, table))
            .or_default()
            .push(column);
    }

    let mut tables: BTreeMap<String, BTreeMap<String, TableMetadata>> = BTreeMap::new();
    for row in column_families {
        let keyspace = required_string(row, "keyspace_name")?;
        let name = required_string(row, "columnfamily_name")?;
        let mut table_columns = columns_by_table
            .remove(&(keyspace.clone(), name.clone()))
            .unwrap_or_default();
        table_columns.sort_by(|a, b| {
            (a.component_index.unwrap_or(i32::MAX), &a.name)
                .cmp(&(b.component_index.unwrap_or(i32::MAX), &b.name))
        });
        let table = TableMetadata {
            keyspace: keyspace.clone(),
            name: name.clone(),
            comment: optional_string(row, "comment")?,
            columns: table_columns,
        };
        tables.entry(keyspace).or_default().insert(name, table);
    }
    Ok(tables)
}

/// Builds keyspaces from the keyspace rows, attaching the given tables.
pub(crate) fn build_keyspaces(
    keyspaces: &Rows,
    mut tables: BTreeMap<String, BTreeMap<String, TableMetadata>>,
) -> Result<BTreeMap<String, KeyspaceMetadata>> {
    let mut built = BTreeMap::new();
    for row in keyspaces {
        let name = required_string(row, "keyspace_name")?;
        let keyspace = KeyspaceMetadata {
            tables: tables.remove(&name).unwrap_or_default(),
            durable_writes: if row.is_null("durable_writes") {
                true
            } else {
                row.get_bool("durable_writes")?.unwrap_or(true)
            },
            strategy_class: optional_string(row, "strategy_class")?,
            strategy_options: optional_string(row, "strategy_options")?,
            name: name.clone(),
        };
        built.insert(name, keyspace);
    }
    Ok(built)
}
