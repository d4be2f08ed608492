//! Schema refresh from the `system.schema_*` tables.

use cql_core::{CqlError, Request, Response, Result};
use tokio_util::sync::CancellationToken;
use tracing::{instrument, trace};

use crate::connection::{await_or_cancel, Awaited, Connection};
use crate::metadata::ClusterMetadata;

/// Surveys keyspace definitions.
pub const SELECT_KEYSPACES: &str = "SELECT * FROM system.schema_keyspaces";
/// Surveys table definitions.
pub const SELECT_COLUMN_FAMILIES: &str = "SELECT * FROM system.schema_columnfamilies";
/// Surveys column definitions.
pub const SELECT_COLUMNS: &str = "SELECT * FROM system.schema_columns";

/// The part of the schema a refresh covers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaScope {
    keyspace: Option<String>,
    table: Option<String>,
}

impl SchemaScope {
    /// Covers the whole schema.
    pub fn all() -> Self {
        Self::default()
    }

    /// Covers one keyspace and its tables.
    pub fn keyspace(keyspace: impl Into<String>) -> Self {
        Self {
            keyspace: Some(keyspace.into()),
            table: None,
        }
    }

    /// Covers one table.
    pub fn table(keyspace: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            keyspace: Some(keyspace.into()),
            table: Some(table.into()),
        }
    }

    /// Builds a scope from optional names.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if a table is given without its keyspace.
    pub fn new(keyspace: Option<&str>, table: Option<&str>) -> Result<Self> {
        match (keyspace, table) {
            (None, Some(table)) => Err(CqlError::InvalidArgument(format!(
                "table '{}' given without a keyspace",
                table
            ))),
            (keyspace, table) => Ok(Self {
                keyspace: keyspace.map(str::to_string),
                table: table.map(str::to_string),
            }),
        }
    }

    /// Returns the keyspace name, if scoped.
    pub fn keyspace_name(&self) -> Option<&str> {
        self.keyspace.as_deref()
    }

    /// Returns the table name, if scoped.
    pub fn table_name(&self) -> Option<&str> {
        self.table.as_deref()
    }

    /// Returns the `WHERE` clause restricting the surveys, or an empty string.
    pub fn where_clause(&self) -> String {
        let Some(keyspace) = &self.keyspace else {
            return String::new();
        };
        let mut clause = format!(" WHERE keyspace_name = {}", quote(keyspace));
        if let Some(table) = &self.table {
            clause.push_str(&format!(" AND columnfamily_name = {}", quote(table)));
        }
        clause
    }

    /// Returns the survey queries for this scope.
    ///
    /// The keyspaces survey is only issued when no table is given.
    pub fn queries(&self) -> SchemaQueries {
        let filter = self.where_clause();
        SchemaQueries {
            keyspaces: self
                .table
                .is_none()
                .then(|| format!("{}{}", SELECT_KEYSPACES, filter)),
            column_families: format!("{}{}", SELECT_COLUMN_FAMILIES, filter),
            columns: format!("{}{}", SELECT_COLUMNS, filter),
        }
    }
}

fn quote(name: &str) -> String {
    format!("'{}'", name.replace('\'', "''"))
}

/// The survey statements for one refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaQueries {
    /// Keyspaces survey, absent for table-scoped refreshes.
    pub keyspaces: Option<String>,
    /// Column families survey.
    pub column_families: String,
    /// Columns survey.
    pub columns: String,
}

/// Surveys the schema within `scope` and rebuilds the metadata store's view.
///
/// All surveys are in flight together; the store is only touched once every
/// survey has answered.
#[instrument(
    name = "control_connection.refresh_schema",
    skip_all,
    fields(
        address = %connection.address(),
        keyspace = scope.keyspace_name(),
        table = scope.table_name()
    )
)]
pub async fn refresh(
    connection: &dyn Connection,
    metadata: &dyn ClusterMetadata,
    scope: &SchemaScope,
    cancel: &CancellationToken,
) -> Result<Awaited<()>> {
    let queries = scope.queries();
    let keyspaces = async {
        match &queries.keyspaces {
            Some(cql) => connection.send(Request::query(cql.as_str())).await.map(Some),
            None => Ok(None),
        }
    };
    let column_families = connection.send(Request::query(queries.column_families.as_str()));
    let columns = connection.send(Request::query(queries.columns.as_str()));

    let surveys = async { tokio::try_join!(keyspaces, column_families, columns) };
    let (keyspaces, column_families, columns) = match await_or_cancel(cancel, surveys).await? {
        Awaited::Ready(responses) => responses,
        Awaited::Cancelled => return Ok(Awaited::Cancelled),
    };
    trace!("schema surveys complete");

    metadata
        .rebuild_schema(
            scope.keyspace_name(),
            scope.table_name(),
            keyspaces.map(Response::into_rows).transpose()?,
            column_families.into_rows()?,
            columns.into_rows()?,
        )
        .await?;
    Ok(Awaited::Ready(()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unscoped_queries_have_no_filter() {
        let queries = SchemaScope::all().queries();
        assert_eq!(queries.keyspaces.as_deref(), Some(SELECT_KEYSPACES));
        assert_eq!(queries.column_families, SELECT_COLUMN_FAMILIES);
        assert_eq!(queries.columns, SELECT_COLUMNS);
    }

    #[test]
    fn test_keyspace_scope_filters_all_three_surveys() {
        let queries = SchemaScope::keyspace("ks1").queries();
        let filter = " WHERE keyspace_name = 'ks1'";
        assert_eq!(queries.keyspaces, Some(format!("{}{}", SELECT_KEYSPACES, filter)));
        assert_eq!(queries.column_families, format!("{}{}", SELECT_COLUMN_FAMILIES, filter));
        assert_eq!(queries.columns, format!("{}{}", SELECT_COLUMNS, filter));
    }

    #[test]
    fn test_table_scope_skips_keyspaces_survey() {
        let queries = SchemaScope::table("ks1", "t1").queries();
        assert!(queries.keyspaces.is_none());
        assert!(queries
            .column_families
            .ends_with(" WHERE keyspace_name = 'ks1' AND columnfamily_name = 't1'"));
        assert!(queries
            .columns
            .ends_with(" WHERE keyspace_name = 'ks1' AND columnfamily_name = 't1'"));
    }

    #[test]
    fn test_names_are_quoted() {
        let scope = SchemaScope::keyspace("o'neil");
        assert_eq!(scope.where_clause(), " WHERE keyspace_name = 'o''neil'");
    }

    #[test]
    fn test_table_without_keyspace_is_rejected() {
        let err = SchemaScope::new(None, Some("t1")).unwrap_err();
        assert!(matches!(err, CqlError::InvalidArgument(_)));
        assert_eq!(SchemaScope::new(Some("ks1"), None).unwrap(), SchemaScope::keyspace("ks1"));
        assert_eq!(SchemaScope::new(None, None).unwrap(), SchemaScope::all());
    }
}
