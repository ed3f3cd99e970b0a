use std::ops::{Deref, DerefMut};

use tracing::{debug, warn};

use crate::builders::CommandSpec;
use crate::error::Result;
use crate::provider::BackendKind;
use crate::types::{DataTable, SchemaCollection, SchemaRestrictions, SqlValue};

/// A single connection to a backend.
///
/// Connections start closed. Every operation other than `open`, `close`
/// and `is_open` requires an open connection. `close` is idempotent.
pub trait Connection: Send {
    fn backend(&self) -> BackendKind;

    fn open(&mut self) -> Result<()>;

    fn close(&mut self) -> Result<()>;

    fn is_open(&self) -> bool;

    /// Run a statement and return the number of affected rows.
    fn execute(&mut self, command: &CommandSpec) -> Result<u64>;

    /// Run a query and buffer its entire result.
    fn query(&mut self, command: &CommandSpec) -> Result<DataTable>;

    /// First column of the first row, `None` if no rows came back.
    fn scalar(&mut self, command: &CommandSpec) -> Result<Option<SqlValue>> {
        Ok(self.query(command)?.first_value().cloned())
    }

    /// Run a query and hand this connection over to the returned cursor,
    /// which closes it once drained or closed. On failure the connection
    /// is closed before the error is returned.
    fn into_cursor(self: Box<Self>, command: &CommandSpec) -> Result<Box<dyn RowCursor>>;

    /// Query backend metadata for `collection`, filtered by `restrictions`.
    fn schema(
        &mut self,
        collection: SchemaCollection,
        restrictions: &SchemaRestrictions,
    ) -> Result<DataTable>;
}

/// A live, connection-owning row source.
pub trait RowCursor: Send {
    fn columns(&self) -> &[String];

    /// Next row in backend order, `None` once exhausted.
    fn next_row(&mut self) -> Result<Option<Vec<SqlValue>>>;

    /// Release the cursor and close its connection. Idempotent.
    fn close(&mut self) -> Result<()>;

    fn is_closed(&self) -> bool;
}

/// Fills an in-memory table from a command.
pub trait DataAdapter: Send {
    fn fill(&self, connection: &mut dyn Connection, command: &CommandSpec) -> Result<DataTable>;
}

/// Opens the connection only if it is closed, and closes it again only if
/// it was the one to open it.
#[derive(Debug, Default, Clone, Copy)]
pub struct FillAdapter;

impl DataAdapter for FillAdapter {
    fn fill(&self, connection: &mut dyn Connection, command: &CommandSpec) -> Result<DataTable> {
        if connection.is_open() {
            return connection.query(command);
        }

        connection.open()?;
        let result = connection.query(command);
        let closed = connection.close();
        let table = result?;
        closed?;
        Ok(table)
    }
}

/// An open connection that is closed when it goes out of scope.
///
/// Call [`close`](OpenConnection::close) on the success path so a failing
/// close is reported; the drop path can only log it.
pub(crate) struct OpenConnection {
    inner: Box<dyn Connection>,
    released: bool,
}

impl OpenConnection {
    pub(crate) fn open(mut connection: Box<dyn Connection>) -> Result<Self> {
        connection.open()?;
        debug!(backend = %connection.backend(), "connection opened");
        Ok(Self {
            inner: connection,
            released: false,
        })
    }

    pub(crate) fn close(mut self) -> Result<()> {
        self.released = true;
        self.inner.close()?;
        debug!(backend = %self.inner.backend(), "connection closed");
        Ok(())
    }
}

impl Deref for OpenConnection {
    type Target = dyn Connection;

    fn deref(&self) -> &Self::Target {
        self.inner.as_ref()
    }
}

impl DerefMut for OpenConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.inner.as_mut()
    }
}

impl Drop for OpenConnection {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let backend = self.inner.backend();
        match self.inner.close() {
            Ok(()) => debug!(%backend, "connection closed after failure"),
            Err(e) => warn!(%backend, error = %e, "failed to close connection"),
        }
    }
}
