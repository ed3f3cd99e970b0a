use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::Result;
use crate::traits::RowCursor;
use crate::types::Row;

/// A streaming, forward-only view over a query result.
///
/// The reader owns the connection the query ran on. The connection is
/// closed when the last row has been read, when a read fails, when
/// [`close`](DataReader::close) is called, or when the reader is dropped.
///
/// # Example
/// ```ignore
/// let mut reader = client.execute_reader("SELECT id FROM orders", &[])?;
/// for row in &mut reader {
///     let row = row?;
///     println!("{}", row.get("id")?);
/// }
/// assert!(reader.is_closed());
/// ```
pub struct DataReader {
    cursor: Box<dyn RowCursor>,
    columns: Arc<[String]>,
    rows_read: u64,
    finished: bool,
}

impl DataReader {
    pub(crate) fn new(cursor: Box<dyn RowCursor>) -> Self {
        let columns: Arc<[String]> = cursor.columns().to_vec().into();
        Self {
            cursor,
            columns,
            rows_read: 0,
            finished: false,
        }
    }

    /// Column names in projection order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Read the next row. Returns `Ok(None)` once exhausted, at which point
    /// the connection has been closed.
    pub fn read(&mut self) -> Result<Option<Row>> {
        if self.finished {
            return Ok(None);
        }

        match self.cursor.next_row() {
            Ok(Some(values)) => {
                self.rows_read += 1;
                Ok(Some(Row::new(Arc::clone(&self.columns), values)))
            }
            Ok(None) => {
                self.finished = true;
                debug!(rows = self.rows_read, "reader exhausted");
                self.cursor.close()?;
                Ok(None)
            }
            Err(e) => {
                self.finished = true;
                if let Err(close_err) = self.cursor.close() {
                    warn!(error = %close_err, "failed to close reader after read error");
                }
                Err(e)
            }
        }
    }

    /// Stop reading and close the connection.
    pub fn close(&mut self) -> Result<()> {
        self.finished = true;
        if self.cursor.is_closed() {
            return Ok(());
        }
        self.cursor.close()
    }

    pub fn is_closed(&self) -> bool {
        self.cursor.is_closed()
    }

    /// Number of rows handed out so far.
    pub fn rows_read(&self) -> u64 {
        self.rows_read
    }
}

impl Iterator for DataReader {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read().transpose()
    }
}

impl Drop for DataReader {
    fn drop(&mut self) {
        if self.cursor.is_closed() {
            return;
        }
        debug!(rows = self.rows_read, "reader released before exhaustion");
        if let Err(e) = self.cursor.close() {
            warn!(error = %e, "failed to close reader");
        }
    }
}

impl std::fmt::Debug for DataReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataReader")
            .field("columns", &self.columns)
            .field("rows_read", &self.rows_read)
            .field("closed", &self.cursor.is_closed())
            .finish()
    }
}
