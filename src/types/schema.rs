//! Typed views over backend schema metadata.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{DataTable, Row, SqlValue};

/// Normalised column names of the metadata tables returned by
/// [`Connection::schema`](crate::traits::Connection::schema).
pub mod columns {
    pub const TABLE_CATALOG: &str = "TABLE_CATALOG";
    pub const TABLE_SCHEMA: &str = "TABLE_SCHEMA";
    pub const TABLE_NAME: &str = "TABLE_NAME";
    pub const TABLE_TYPE: &str = "TABLE_TYPE";
    pub const COLUMN_NAME: &str = "COLUMN_NAME";
    pub const ORDINAL_POSITION: &str = "ORDINAL_POSITION";
    pub const DATA_TYPE: &str = "DATA_TYPE";
    pub const IS_NULLABLE: &str = "IS_NULLABLE";
    pub const COLUMN_DEFAULT: &str = "COLUMN_DEFAULT";
    pub const KEY_SEQ: &str = "KEY_SEQ";
}

/// Which metadata catalog to query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaCollection {
    Tables,
    Columns,
    PrimaryKeys,
}

impl SchemaCollection {
    /// Column layout every driver uses for this collection.
    pub fn column_names(&self) -> Vec<String> {
        use columns::*;
        let names: &[&str] = match self {
            SchemaCollection::Tables => &[TABLE_CATALOG, TABLE_SCHEMA, TABLE_NAME, TABLE_TYPE],
            SchemaCollection::Columns => &[
                TABLE_CATALOG,
                TABLE_SCHEMA,
                TABLE_NAME,
                COLUMN_NAME,
                ORDINAL_POSITION,
                DATA_TYPE,
                IS_NULLABLE,
                COLUMN_DEFAULT,
            ],
            SchemaCollection::PrimaryKeys => &[
                TABLE_CATALOG,
                TABLE_SCHEMA,
                TABLE_NAME,
                COLUMN_NAME,
                KEY_SEQ,
            ],
        };
        names.iter().map(|s| s.to_string()).collect()
    }
}

/// Four positional filter slots: catalog, schema, table, and a
/// collection-specific fourth slot (table type or column name).
/// `None` means "no filter".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaRestrictions([Option<String>; 4]);

impl SchemaRestrictions {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn table(name: impl Into<String>) -> Self {
        Self([None, None, Some(name.into()), None])
    }

    pub fn from_slots(slots: [Option<String>; 4]) -> Self {
        Self(slots)
    }

    pub fn catalog(&self) -> Option<&str> {
        self.0[0].as_deref()
    }

    pub fn schema(&self) -> Option<&str> {
        self.0[1].as_deref()
    }

    pub fn table_name(&self) -> Option<&str> {
        self.0[2].as_deref()
    }

    pub fn fourth(&self) -> Option<&str> {
        self.0[3].as_deref()
    }

    pub fn slots(&self) -> &[Option<String>; 4] {
        &self.0
    }

    /// True when every set slot equals the corresponding value.
    pub fn matches(&self, values: [Option<&str>; 4]) -> bool {
        self.0
            .iter()
            .zip(values)
            .all(|(filter, value)| match filter {
                Some(f) => value == Some(f.as_str()),
                None => true,
            })
    }
}

/// A column definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub table_name: String,
    pub column_name: String,
    pub ordinal_position: i64,
    pub data_type: String,
    pub is_nullable: bool,
    #[serde(default)]
    pub column_default: Option<String>,
}

impl ColumnInfo {
    pub(crate) fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            table_name: text(row, columns::TABLE_NAME)?.unwrap_or_default(),
            column_name: text(row, columns::COLUMN_NAME)?.unwrap_or_default(),
            ordinal_position: row.get(columns::ORDINAL_POSITION)?.as_i64().unwrap_or(0),
            data_type: text(row, columns::DATA_TYPE)?.unwrap_or_default(),
            is_nullable: flag(row.get(columns::IS_NULLABLE)?),
            column_default: text(row, columns::COLUMN_DEFAULT)?,
        })
    }
}

/// One column of a table's primary key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryKeyInfo {
    pub table_name: String,
    pub column_name: String,
    /// 1-based position within a composite key.
    pub key_seq: i64,
}

impl PrimaryKeyInfo {
    pub(crate) fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            table_name: text(row, columns::TABLE_NAME)?.unwrap_or_default(),
            column_name: text(row, columns::COLUMN_NAME)?.unwrap_or_default(),
            key_seq: row.get(columns::KEY_SEQ)?.as_i64().unwrap_or(0),
        })
    }
}

pub(crate) fn table_names(table: &DataTable) -> Result<Vec<String>> {
    table
        .rows()
        .iter()
        .map(|row| Ok(text(row, columns::TABLE_NAME)?.unwrap_or_default()))
        .collect()
}

fn text(row: &Row, column: &str) -> Result<Option<String>> {
    Ok(match row.get(column)? {
        SqlValue::Null => None,
        other => Some(other.to_string()),
    })
}

fn flag(value: &SqlValue) -> bool {
    match value {
        SqlValue::Text(s) => matches!(s.to_ascii_uppercase().as_str(), "YES" | "TRUE" | "1"),
        other => other.as_bool().unwrap_or(false),
    }
}
