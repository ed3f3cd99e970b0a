mod row;
mod schema;
mod sql_value;

pub use row::{DataTable, Row};
pub use schema::{columns as schema_columns, ColumnInfo, PrimaryKeyInfo, SchemaCollection, SchemaRestrictions};
pub use sql_value::SqlValue;

pub(crate) use schema::table_names;
