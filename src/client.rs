use std::sync::Arc;

use tracing::{debug, warn};

use crate::builders::{Command, CommandBuilder, CommandKind, CommandSpec, Parameter, ParameterDirection};
use crate::config::ConnectionConfig;
use crate::error::{DbExecError, Result};
use crate::provider::{BackendKind, ProviderRegistry};
use crate::reader::DataReader;
use crate::schema::SchemaIntrospector;
use crate::traits::{DriverFactory, OpenConnection};
use crate::types::{DataTable, SqlValue};

/// Main entry point for dbexec.
///
/// Holds a connection string and the driver factory for one backend, and
/// runs commands in one of four modes. Every call opens its own connection;
/// the non-streaming modes close it before returning, whether or not the
/// command succeeded.
///
/// # Example
/// ```ignore
/// let client = DbExecClient::new("host=localhost user=app", BackendKind::PostgreSql)?;
/// let id = client.create_parameter("id", 7);
/// let name = client.execute_scalar("SELECT name FROM users WHERE id = $1", &[id])?;
/// ```
pub struct DbExecClient {
    connection_string: String,
    factory: Arc<dyn DriverFactory>,
}

impl DbExecClient {
    /// Create a client for `kind` using the default provider registry.
    /// Fails with `UnsupportedBackend` if no driver is available for `kind`.
    pub fn new(connection_string: impl Into<String>, kind: BackendKind) -> Result<Self> {
        Self::with_registry(connection_string, kind, &ProviderRegistry::default())
    }

    pub fn with_registry(
        connection_string: impl Into<String>,
        kind: BackendKind,
        registry: &ProviderRegistry,
    ) -> Result<Self> {
        let factory = registry.resolve(kind)?;
        Ok(Self::with_factory(connection_string, factory))
    }

    /// Create a new client with a custom driver factory.
    /// Useful for testing or for backends outside the registry.
    pub fn with_factory(connection_string: impl Into<String>, factory: Arc<dyn DriverFactory>) -> Self {
        Self {
            connection_string: connection_string.into(),
            factory,
        }
    }

    pub fn from_config(config: &ConnectionConfig) -> Result<Self> {
        config.validate()?;
        Self::new(config.connection_string.clone(), config.backend)
    }

    pub fn backend(&self) -> BackendKind {
        self.factory.kind()
    }

    pub fn connection_string(&self) -> &str {
        &self.connection_string
    }

    /// Point later calls at a different target. Calls already running keep
    /// the connection they opened.
    pub fn set_connection_string(&mut self, connection_string: impl Into<String>) {
        self.connection_string = connection_string.into();
    }

    /// Build an input parameter.
    pub fn create_parameter(&self, name: &str, value: impl Into<SqlValue>) -> Parameter {
        self.create_parameter_with_direction(name, ParameterDirection::Input, value)
    }

    pub fn create_parameter_with_direction(
        &self,
        name: &str,
        direction: ParameterDirection,
        value: impl Into<SqlValue>,
    ) -> Parameter {
        self.factory.create_parameter(name, direction, value.into())
    }

    /// Run a statement and return the number of affected rows.
    pub fn execute_non_query(&self, sql: &str, parameters: &[Parameter]) -> Result<u64> {
        self.execute_non_query_with_kind(sql, parameters, CommandKind::Text)
    }

    pub fn execute_non_query_with_kind(
        &self,
        sql: &str,
        parameters: &[Parameter],
        kind: CommandKind,
    ) -> Result<u64> {
        let (spec, mut connection) = self.open_command(sql, parameters, kind)?;
        let affected = connection
            .execute(&spec)
            .inspect_err(|e| self.log_failure("non-query", e))?;
        connection.close()?;
        debug!(backend = %self.backend(), affected, "non-query executed");
        Ok(affected)
    }

    /// Run a query and return the first column of the first row.
    /// Returns `None` when the query produced no rows.
    pub fn execute_scalar(&self, sql: &str, parameters: &[Parameter]) -> Result<Option<SqlValue>> {
        self.execute_scalar_with_kind(sql, parameters, CommandKind::Text)
    }

    pub fn execute_scalar_with_kind(
        &self,
        sql: &str,
        parameters: &[Parameter],
        kind: CommandKind,
    ) -> Result<Option<SqlValue>> {
        let (spec, mut connection) = self.open_command(sql, parameters, kind)?;
        let value = connection
            .scalar(&spec)
            .inspect_err(|e| self.log_failure("scalar", e))?;
        connection.close()?;
        debug!(backend = %self.backend(), found = value.is_some(), "scalar executed");
        Ok(value)
    }

    /// Run a query and buffer the whole result in memory.
    pub fn execute_data_table(&self, sql: &str, parameters: &[Parameter]) -> Result<DataTable> {
        self.execute_data_table_with_kind(sql, parameters, CommandKind::Text)
    }

    pub fn execute_data_table_with_kind(
        &self,
        sql: &str,
        parameters: &[Parameter],
        kind: CommandKind,
    ) -> Result<DataTable> {
        let adapter = self.factory.create_data_adapter().ok_or_else(|| {
            DbExecError::CommandConstruction(format!("{} provides no data adapter", self.backend()))
        })?;
        let (spec, mut connection) = self.build_command(sql, parameters, kind)?.into_parts();

        // The adapter opens and closes the connection itself.
        let table = adapter
            .fill(connection.as_mut(), &spec)
            .inspect_err(|e| self.log_failure("data table", e))?;
        debug!(backend = %self.backend(), rows = table.len(), "data table filled");
        Ok(table)
    }

    /// Run a query and return a streaming reader over its rows.
    ///
    /// The connection stays open until the reader is drained, closed or
    /// dropped.
    pub fn execute_reader(&self, sql: &str, parameters: &[Parameter]) -> Result<DataReader> {
        self.execute_reader_with_kind(sql, parameters, CommandKind::Text)
    }

    pub fn execute_reader_with_kind(
        &self,
        sql: &str,
        parameters: &[Parameter],
        kind: CommandKind,
    ) -> Result<DataReader> {
        let (spec, mut connection) = self.build_command(sql, parameters, kind)?.into_parts();
        connection
            .open()
            .inspect_err(|e| self.log_failure("open", e))?;
        let cursor = connection
            .into_cursor(&spec)
            .inspect_err(|e| self.log_failure("reader", e))?;
        debug!(backend = %self.backend(), "reader opened");
        Ok(DataReader::new(cursor))
    }

    /// Schema metadata queries against this client's target.
    pub fn schema(&self) -> SchemaIntrospector<'_> {
        SchemaIntrospector::new(self.factory.as_ref(), &self.connection_string)
    }

    fn build_command(&self, sql: &str, parameters: &[Parameter], kind: CommandKind) -> Result<Command> {
        let spec = CommandSpec::new(sql, parameters.to_vec(), kind)?;
        CommandBuilder::new(self.factory.as_ref(), &self.connection_string).build(spec)
    }

    fn open_command(
        &self,
        sql: &str,
        parameters: &[Parameter],
        kind: CommandKind,
    ) -> Result<(CommandSpec, OpenConnection)> {
        let (spec, connection) = self.build_command(sql, parameters, kind)?.into_parts();
        let connection = OpenConnection::open(connection)
            .inspect_err(|e| self.log_failure("open", e))?;
        Ok((spec, connection))
    }

    fn log_failure(&self, mode: &str, error: &DbExecError) {
        warn!(backend = %self.backend(), mode, error = %error, "command failed");
    }
}

impl std::fmt::Debug for DbExecClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbExecClient")
            .field("backend", &self.backend())
            .finish_non_exhaustive()
    }
}
