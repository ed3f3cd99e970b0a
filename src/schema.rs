//! Read-only discovery of tables, columns and primary keys.

use tracing::debug;

use crate::error::Result;
use crate::traits::{DriverFactory, OpenConnection};
use crate::types::{
    table_names, ColumnInfo, DataTable, PrimaryKeyInfo, SchemaCollection, SchemaRestrictions,
};

/// Queries backend metadata through a driver's schema capability.
///
/// Each call opens its own connection and closes it before returning.
pub struct SchemaIntrospector<'a> {
    factory: &'a dyn DriverFactory,
    connection_string: &'a str,
}

impl<'a> SchemaIntrospector<'a> {
    pub fn new(factory: &'a dyn DriverFactory, connection_string: &'a str) -> Self {
        Self {
            factory,
            connection_string,
        }
    }

    /// Names of all user tables, in the backend's enumeration order.
    pub fn list_tables(&self) -> Result<Vec<String>> {
        let table = self.schema_table(SchemaCollection::Tables, &SchemaRestrictions::none())?;
        table_names(&table)
    }

    /// Column definitions of `table_name`. An unknown table yields an empty list.
    ///
    /// The name is passed to the backend unchanged; case rules are the backend's.
    pub fn describe_columns(&self, table_name: &str) -> Result<Vec<ColumnInfo>> {
        let table = self.schema_table(
            SchemaCollection::Columns,
            &SchemaRestrictions::table(table_name),
        )?;
        table.rows().iter().map(ColumnInfo::from_row).collect()
    }

    /// Primary key columns of `table_name`, in key order.
    pub fn list_primary_keys(&self, table_name: &str) -> Result<Vec<PrimaryKeyInfo>> {
        let table = self.schema_table(
            SchemaCollection::PrimaryKeys,
            &SchemaRestrictions::table(table_name),
        )?;
        table.rows().iter().map(PrimaryKeyInfo::from_row).collect()
    }

    /// The raw metadata table for `collection`.
    pub fn schema_table(
        &self,
        collection: SchemaCollection,
        restrictions: &SchemaRestrictions,
    ) -> Result<DataTable> {
        let connection = self.factory.create_connection(self.connection_string)?;
        let mut connection = OpenConnection::open(connection)?;
        let table = connection.schema(collection, restrictions)?;
        connection.close()?;
        debug!(
            backend = %self.factory.kind(),
            ?collection,
            rows = table.len(),
            "schema queried"
        );
        Ok(table)
    }
}
