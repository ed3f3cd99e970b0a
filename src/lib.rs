//! dbexec - A provider-agnostic, synchronous SQL execution facade
//!
//! Pick a backend kind once, then run parameterized commands in one of four
//! modes without writing backend-specific connection code:
//!
//! | Mode | Returns | Connection |
//! |---|---|---|
//! | [`execute_non_query`](DbExecClient::execute_non_query) | affected rows | closed before return |
//! | [`execute_scalar`](DbExecClient::execute_scalar) | first column of first row | closed before return |
//! | [`execute_data_table`](DbExecClient::execute_data_table) | buffered [`DataTable`] | closed before return |
//! | [`execute_reader`](DbExecClient::execute_reader) | streaming [`DataReader`] | closed by the reader |
//!
//! # Example
//! ```
//! use dbexec::drivers::{InMemoryTestDriver, InMemoryTestResponseBuilder};
//! use dbexec::{BackendKind, DbExecClient, ProviderRegistry, SqlValue};
//!
//! let driver = InMemoryTestDriver::new()
//!     .with_affected_rows(1)
//!     .with_response(InMemoryTestResponseBuilder::new().columns(&["count"]).row([1]).build());
//! let shared = driver.clone();
//! let registry = ProviderRegistry::default()
//!     .with(BackendKind::TestMemory, move || std::sync::Arc::new(shared.clone()) as std::sync::Arc<dyn dbexec::DriverFactory>);
//!
//! let client = DbExecClient::with_registry("mem://test", BackendKind::TestMemory, &registry)?;
//! assert_eq!(client.execute_non_query("INSERT INTO t(x) VALUES(1)", &[])?, 1);
//! assert_eq!(client.execute_scalar("SELECT COUNT(*) FROM t", &[])?, Some(SqlValue::Int32(1)));
//! driver.assert_all_connections_closed();
//! # Ok::<(), dbexec::DbExecError>(())
//! ```

pub mod builders;
pub mod config;
pub mod drivers;
pub mod error;
pub mod provider;
pub mod reader;
pub mod schema;
pub mod traits;
pub mod types;

mod client;

// Re-export main types for convenient access
pub use builders::{CommandKind, CommandSpec, Parameter, ParameterDirection};
pub use client::DbExecClient;
pub use config::ConnectionConfig;
pub use error::{DbExecError, Result};
pub use provider::{BackendKind, ProviderRegistry};
pub use reader::DataReader;
pub use schema::SchemaIntrospector;
pub use traits::{Connection, DataAdapter, DriverFactory, RowCursor};
pub use types::{
    ColumnInfo, DataTable, PrimaryKeyInfo, Row, SchemaCollection, SchemaRestrictions, SqlValue,
};
