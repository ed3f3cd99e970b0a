use std::sync::mpsc::{self, Receiver, SyncSender};
use std::thread::{self, JoinHandle};

use rusqlite::types::{Value, ValueRef};
use rusqlite::Statement;
use tracing::{debug, warn};

use crate::builders::{CommandKind, CommandSpec, Parameter};
use crate::error::{DbExecError, Result};
use crate::provider::BackendKind;
use crate::traits::{Connection, DriverFactory, RowCursor};
use crate::types::{DataTable, SchemaCollection, SchemaRestrictions, SqlValue};

const BACKEND: BackendKind = BackendKind::Sqlite;
const SCHEMA_NAME: &str = "main";

/// SQLite driver implementation using rusqlite.
///
/// The connection string is a file path, `:memory:`, or a `file:` URI.
/// Named parameters bind by name (`:id`, `@id` and `$id` are all tried for
/// a parameter named `id`). Unnamed parameters bind by position to `?`
/// placeholders.
#[derive(Debug, Default, Clone, Copy)]
pub struct RusqliteDriver;

impl RusqliteDriver {
    pub fn new() -> Self {
        Self
    }
}

impl DriverFactory for RusqliteDriver {
    fn kind(&self) -> BackendKind {
        BACKEND
    }

    fn create_connection(&self, connection_string: &str) -> Result<Box<dyn Connection>> {
        Ok(Box::new(SqliteConnection {
            path: connection_string.to_string(),
            conn: None,
        }))
    }

    fn supports_command_kind(&self, kind: CommandKind) -> bool {
        // SQLite has no stored procedures.
        kind != CommandKind::StoredProcedure
    }
}

struct SqliteConnection {
    path: String,
    conn: Option<rusqlite::Connection>,
}

impl SqliteConnection {
    fn conn(&self) -> Result<&rusqlite::Connection> {
        self.conn
            .as_ref()
            .ok_or_else(|| DbExecError::execution(BACKEND, "connection is not open"))
    }

    fn prepare_bound<'c>(
        conn: &'c rusqlite::Connection,
        command: &CommandSpec,
    ) -> Result<Statement<'c>> {
        let sql = render_sql(command);
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| DbExecError::execution(BACKEND, e))?;
        for (position, parameter) in command.bound_parameters().enumerate() {
            let index = parameter_index(&stmt, parameter, position)?;
            stmt.raw_bind_parameter(index, sql_value_to_sqlite(parameter.value()))
                .map_err(|e| DbExecError::execution(BACKEND, e))?;
        }
        Ok(stmt)
    }

    /// Run `sql` with positional values and buffer the result.
    fn query_values(&self, sql: &str, values: &[Value]) -> Result<DataTable> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| DbExecError::execution(BACKEND, e))?;
        for (i, value) in values.iter().enumerate() {
            stmt.raw_bind_parameter(i + 1, value)
                .map_err(|e| DbExecError::execution(BACKEND, e))?;
        }
        collect_rows(&mut stmt)
    }

    fn table_names(&self) -> Result<Vec<(String, String)>> {
        let table = self.query_values(
            "SELECT name, CASE type WHEN 'view' THEN 'VIEW' ELSE 'TABLE' END \
             FROM sqlite_master \
             WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%'",
            &[],
        )?;
        Ok(table
            .rows()
            .iter()
            .map(|row| {
                let text = |i: usize| row.get_index(i).map(|v| v.to_string()).unwrap_or_default();
                (text(0), text(1))
            })
            .collect())
    }

    fn schema_rows(
        &self,
        collection: SchemaCollection,
        restrictions: &SchemaRestrictions,
    ) -> Result<Vec<Vec<SqlValue>>> {
        let mut rows = Vec::new();
        for (name, table_type) in self.table_names()? {
            let table_slots = [None, Some(SCHEMA_NAME), Some(name.as_str())];
            match collection {
                SchemaCollection::Tables => {
                    let [catalog, schema, table] = table_slots;
                    if restrictions.matches([catalog, schema, table, Some(table_type.as_str())]) {
                        rows.push(vec![
                            SqlValue::Null,
                            SCHEMA_NAME.into(),
                            name.clone().into(),
                            table_type.into(),
                        ]);
                    }
                }
                SchemaCollection::Columns => {
                    let [catalog, schema, table] = table_slots;
                    if !restrictions.matches([catalog, schema, table, None]) {
                        continue;
                    }
                    let info = self.query_values(TABLE_INFO_SQL, &[Value::Text(name.clone())])?;
                    for column in info.rows() {
                        let column_name = column.get("name")?.to_string();
                        if !restrictions.matches([catalog, schema, table, Some(column_name.as_str())]) {
                            continue;
                        }
                        let cid = column.get("cid")?.as_i64().unwrap_or(0);
                        let not_null = column.get("notnull")?.as_bool().unwrap_or(false);
                        rows.push(vec![
                            SqlValue::Null,
                            SCHEMA_NAME.into(),
                            name.clone().into(),
                            column_name.into(),
                            SqlValue::Int64(cid + 1),
                            column.get("type")?.clone(),
                            (if not_null { "NO" } else { "YES" }).into(),
                            column.get("dflt_value")?.clone(),
                        ]);
                    }
                }
                SchemaCollection::PrimaryKeys => {
                    let [catalog, schema, table] = table_slots;
                    if !restrictions.matches([catalog, schema, table, None]) {
                        continue;
                    }
                    let info = self.query_values(TABLE_INFO_SQL, &[Value::Text(name.clone())])?;
                    let mut keys: Vec<(i64, String)> = Vec::new();
                    for column in info.rows() {
                        let seq = column.get("pk")?.as_i64().unwrap_or(0);
                        if seq > 0 {
                            keys.push((seq, column.get("name")?.to_string()));
                        }
                    }
                    keys.sort_by_key(|(seq, _)| *seq);
                    for (seq, column_name) in keys {
                        rows.push(vec![
                            SqlValue::Null,
                            SCHEMA_NAME.into(),
                            name.clone().into(),
                            column_name.into(),
                            SqlValue::Int64(seq),
                        ]);
                    }
                }
            }
        }
        Ok(rows)
    }
}

impl Connection for SqliteConnection {
    fn backend(&self) -> BackendKind {
        BACKEND
    }

    fn open(&mut self) -> Result<()> {
        if self.conn.is_none() {
            let conn = rusqlite::Connection::open(&self.path)
                .map_err(|e| DbExecError::connection(BACKEND, format!("{}: {e}", self.path)))?;
            debug!(path = %self.path, "SQLite connection opened");
            self.conn = Some(conn);
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(conn) = self.conn.take() {
            conn.close()
                .map_err(|(_, e)| DbExecError::connection(BACKEND, e))?;
            debug!(path = %self.path, "SQLite connection closed");
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    fn execute(&mut self, command: &CommandSpec) -> Result<u64> {
        let conn = self.conn()?;
        let mut stmt = Self::prepare_bound(conn, command)?;
        let affected = stmt
            .raw_execute()
            .map_err(|e| DbExecError::execution(BACKEND, e))?;
        Ok(affected as u64)
    }

    fn query(&mut self, command: &CommandSpec) -> Result<DataTable> {
        let conn = self.conn()?;
        let mut stmt = Self::prepare_bound(conn, command)?;
        collect_rows(&mut stmt)
    }

    // Steps once and stops; the rest of the result is never read.
    fn scalar(&mut self, command: &CommandSpec) -> Result<Option<SqlValue>> {
        let conn = self.conn()?;
        let mut stmt = Self::prepare_bound(conn, command)?;
        let width = stmt.column_count();
        let mut rows = stmt.raw_query();
        let first = rows
            .next()
            .map_err(|e| DbExecError::execution(BACKEND, e))?;
        let value = match first {
            Some(row) if width > 0 => Some(sqlite_to_sql_value(
                row.get_ref(0)
                    .map_err(|e| DbExecError::execution(BACKEND, e))?,
            )),
            _ => None,
        };
        Ok(value)
    }

    // A rusqlite statement borrows its connection, so the connection moves
    // to a worker thread that steps the statement one row per request.
    fn into_cursor(mut self: Box<Self>, command: &CommandSpec) -> Result<Box<dyn RowCursor>> {
        let conn = self
            .conn
            .take()
            .ok_or_else(|| DbExecError::execution(BACKEND, "connection is not open"))?;
        let (request_tx, request_rx) = mpsc::sync_channel(1);
        let (reply_tx, reply_rx) = mpsc::sync_channel(1);
        let command = command.clone();
        let handle = thread::Builder::new()
            .name("dbexec-sqlite-reader".to_string())
            .spawn(move || stream_rows(conn, command, request_rx, reply_tx))
            .map_err(|e| DbExecError::execution(BACKEND, e))?;

        let mut cursor = SqliteCursor {
            path: self.path.clone(),
            columns: Vec::new(),
            worker: Some(CursorWorker {
                requests: request_tx,
                replies: reply_rx,
                handle,
            }),
            exhausted: false,
        };
        let started = match cursor.receive() {
            Ok(CursorReply::Columns(columns)) => Ok(columns),
            Ok(CursorReply::Failed(e)) | Err(e) => Err(e),
            Ok(_) => Err(DbExecError::execution(BACKEND, "reader sent rows before columns")),
        };

        match started {
            Ok(columns) => {
                cursor.columns = columns;
                debug!(path = %self.path, "SQLite reader started");
                Ok(Box::new(cursor))
            }
            Err(e) => {
                if let Err(close_err) = cursor.close() {
                    warn!(error = %close_err, "failed to close connection after reader failure");
                }
                Err(e)
            }
        }
    }

    fn schema(
        &mut self,
        collection: SchemaCollection,
        restrictions: &SchemaRestrictions,
    ) -> Result<DataTable> {
        let rows = self.schema_rows(collection, restrictions)?;
        Ok(DataTable::new(collection.column_names(), rows))
    }
}

enum CursorRequest {
    Next,
    Close,
}

enum CursorReply {
    Columns(Vec<String>),
    Row(Vec<SqlValue>),
    Done,
    Failed(DbExecError),
}

struct CursorWorker {
    requests: SyncSender<CursorRequest>,
    replies: Receiver<CursorReply>,
    handle: JoinHandle<Result<()>>,
}

/// Reader over a statement stepped by a worker thread that owns the
/// connection. The worker closes the connection when it stops.
struct SqliteCursor {
    path: String,
    columns: Vec<String>,
    worker: Option<CursorWorker>,
    exhausted: bool,
}

impl SqliteCursor {
    fn worker(&self) -> Result<&CursorWorker> {
        self.worker
            .as_ref()
            .ok_or_else(|| DbExecError::execution(BACKEND, "connection is not open"))
    }

    fn receive(&self) -> Result<CursorReply> {
        self.worker()?
            .replies
            .recv()
            .map_err(|_| DbExecError::execution(BACKEND, "reader thread stopped"))
    }
}

impl RowCursor for SqliteCursor {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn next_row(&mut self) -> Result<Option<Vec<SqlValue>>> {
        let worker = self.worker()?;
        if self.exhausted {
            return Ok(None);
        }
        worker
            .requests
            .send(CursorRequest::Next)
            .map_err(|_| DbExecError::execution(BACKEND, "reader thread stopped"))?;

        match self.receive()? {
            CursorReply::Row(values) => Ok(Some(values)),
            CursorReply::Done => {
                self.exhausted = true;
                Ok(None)
            }
            CursorReply::Failed(e) => {
                self.exhausted = true;
                Err(e)
            }
            CursorReply::Columns(_) => {
                Err(DbExecError::execution(BACKEND, "reader sent columns twice"))
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        let Some(CursorWorker {
            requests,
            replies,
            handle,
        }) = self.worker.take()
        else {
            return Ok(());
        };
        // The worker may have stopped already; dropping both ends unblocks it either way.
        let _ = requests.try_send(CursorRequest::Close);
        drop(requests);
        drop(replies);

        let closed = handle
            .join()
            .map_err(|_| DbExecError::connection(BACKEND, "reader thread panicked"))?;
        debug!(path = %self.path, "SQLite reader closed");
        closed
    }

    fn is_closed(&self) -> bool {
        self.worker.is_none()
    }
}

impl Drop for SqliteCursor {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Worker body: owns the connection for the reader's lifetime.
fn stream_rows(
    conn: rusqlite::Connection,
    command: CommandSpec,
    requests: Receiver<CursorRequest>,
    replies: SyncSender<CursorReply>,
) -> Result<()> {
    step_rows(&conn, &command, &requests, &replies);
    conn.close()
        .map_err(|(_, e)| DbExecError::connection(BACKEND, e))
}

fn step_rows(
    conn: &rusqlite::Connection,
    command: &CommandSpec,
    requests: &Receiver<CursorRequest>,
    replies: &SyncSender<CursorReply>,
) {
    let mut stmt = match SqliteConnection::prepare_bound(conn, command) {
        Ok(stmt) => stmt,
        Err(e) => {
            let _ = replies.send(CursorReply::Failed(e));
            return;
        }
    };
    let columns = column_names(&stmt);
    let width = columns.len();
    if replies.send(CursorReply::Columns(columns)).is_err() {
        return;
    }

    let mut rows = stmt.raw_query();
    while let Ok(CursorRequest::Next) = requests.recv() {
        let reply = match rows.next() {
            Ok(Some(row)) => match row_values(row, width) {
                Ok(values) => CursorReply::Row(values),
                Err(e) => CursorReply::Failed(e),
            },
            Ok(None) => CursorReply::Done,
            Err(e) => CursorReply::Failed(DbExecError::execution(BACKEND, e)),
        };
        let finished = !matches!(reply, CursorReply::Row(_));
        if replies.send(reply).is_err() || finished {
            return;
        }
    }
}

const TABLE_INFO_SQL: &str =
    "SELECT cid, name, type, \"notnull\", dflt_value, pk FROM pragma_table_info(?1)";

fn render_sql(command: &CommandSpec) -> String {
    match command.kind() {
        CommandKind::TableDirect => format!("SELECT * FROM {}", command.quoted_name()),
        _ => command.sql().to_string(),
    }
}

/// Find the 1-based placeholder index for a parameter. Named parameters
/// must match a placeholder; unnamed ones take the next position.
fn parameter_index(stmt: &Statement<'_>, parameter: &Parameter, position: usize) -> Result<usize> {
    let bare = parameter.bare_name();
    if bare.is_empty() {
        let index = position + 1;
        if index > stmt.parameter_count() {
            return Err(DbExecError::execution(
                BACKEND,
                format!("no placeholder for positional parameter {index}"),
            ));
        }
        return Ok(index);
    }

    let candidates = [
        parameter.name().to_string(),
        format!(":{bare}"),
        format!("@{bare}"),
        format!("${bare}"),
    ];
    for candidate in &candidates {
        if let Some(index) = stmt
            .parameter_index(candidate)
            .map_err(|e| DbExecError::execution(BACKEND, e))?
        {
            return Ok(index);
        }
    }
    Err(DbExecError::execution(
        BACKEND,
        format!("no placeholder for parameter {}", parameter.name()),
    ))
}

fn column_names(stmt: &Statement<'_>) -> Vec<String> {
    stmt.column_names().iter().map(|c| c.to_string()).collect()
}

fn row_values(row: &rusqlite::Row<'_>, width: usize) -> Result<Vec<SqlValue>> {
    (0..width)
        .map(|i| {
            row.get_ref(i)
                .map(sqlite_to_sql_value)
                .map_err(|e| DbExecError::execution(BACKEND, e))
        })
        .collect()
}

fn collect_rows(stmt: &mut Statement<'_>) -> Result<DataTable> {
    let columns = column_names(stmt);
    let width = columns.len();
    let mut rows = Vec::new();
    let mut result = stmt.raw_query();
    while let Some(row) = result
        .next()
        .map_err(|e| DbExecError::execution(BACKEND, e))?
    {
        rows.push(row_values(row, width)?);
    }
    Ok(DataTable::new(columns, rows))
}

/// Convert a single `SqlValue` to a rusqlite `Value`.
fn sql_value_to_sqlite(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Bool(b) => Value::Integer(i64::from(*b)),
        SqlValue::Int32(i) => Value::Integer(i64::from(*i)),
        SqlValue::Int64(i) => Value::Integer(*i),
        SqlValue::Float64(f) => Value::Real(*f),
        SqlValue::Text(s) => Value::Text(s.clone()),
        SqlValue::Bytes(b) => Value::Blob(b.clone()),
    }
}

fn sqlite_to_sql_value(value: ValueRef<'_>) -> SqlValue {
    match value {
        ValueRef::Null => SqlValue::Null,
        ValueRef::Integer(i) => SqlValue::Int64(i),
        ValueRef::Real(f) => SqlValue::Float64(f),
        ValueRef::Text(t) => SqlValue::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => SqlValue::Bytes(b.to_vec()),
    }
}
