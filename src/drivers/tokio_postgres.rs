use std::error::Error;
use std::pin::Pin;

use bytes::BytesMut;
use futures_util::StreamExt;
use tokio::runtime::Runtime;
use tokio::task::JoinHandle;
use tokio_postgres::types::{to_sql_checked, IsNull, ToSql, Type};
use tokio_postgres::{Client, NoTls, RowStream, Statement};
use tracing::{debug, error, warn};

use crate::builders::{CommandKind, CommandSpec};
use crate::error::{DbExecError, Result};
use crate::provider::BackendKind;
use crate::traits::{Connection, DriverFactory, RowCursor};
use crate::types::{DataTable, SchemaCollection, SchemaRestrictions, SqlValue};

const BACKEND: BackendKind = BackendKind::PostgreSql;

type BoxedParam = Box<dyn ToSql + Sync + Send>;

/// PostgreSQL driver implementation using tokio-postgres.
///
/// Each connection owns a current-thread runtime and blocks on it, so
/// callers never see an async API.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioPostgresDriver;

impl TokioPostgresDriver {
    pub fn new() -> Self {
        Self
    }
}

impl DriverFactory for TokioPostgresDriver {
    fn kind(&self) -> BackendKind {
        BACKEND
    }

    fn create_connection(&self, connection_string: &str) -> Result<Box<dyn Connection>> {
        Ok(Box::new(PostgresConnection {
            connection_string: connection_string.to_string(),
            session: None,
        }))
    }

    fn supports_command_kind(&self, _kind: CommandKind) -> bool {
        true
    }
}

struct Session {
    runtime: Runtime,
    client: Client,
    driver_task: JoinHandle<()>,
}

struct PostgresConnection {
    connection_string: String,
    session: Option<Session>,
}

impl PostgresConnection {
    fn session(&self) -> Result<&Session> {
        self.session
            .as_ref()
            .ok_or_else(|| DbExecError::execution(BACKEND, "connection is not open"))
    }

    fn prepare(&self, sql: &str) -> Result<(&Session, Statement)> {
        let session = self.session()?;
        let statement = session
            .runtime
            .block_on(session.client.prepare(sql))
            .map_err(|e| DbExecError::execution(BACKEND, e))?;
        Ok((session, statement))
    }

    fn query_params(&self, sql: &str, params: &[BoxedParam]) -> Result<DataTable> {
        let (session, statement) = self.prepare(sql)?;
        let refs = param_refs(params);
        let rows = session
            .runtime
            .block_on(session.client.query(&statement, &refs))
            .map_err(|e| DbExecError::execution(BACKEND, e))?;

        let columns = column_names(&statement);
        let rows = rows.iter().map(row_values).collect();
        Ok(DataTable::new(columns, rows))
    }
}

impl Connection for PostgresConnection {
    fn backend(&self) -> BackendKind {
        BACKEND
    }

    fn open(&mut self) -> Result<()> {
        if self.session.is_some() {
            return Ok(());
        }

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| DbExecError::connection(BACKEND, e))?;

        let (client, connection) = runtime
            .block_on(tokio_postgres::connect(&self.connection_string, NoTls))
            .map_err(|e| DbExecError::connection(BACKEND, e))?;

        // Driven whenever the runtime blocks on a client call.
        let driver_task = runtime.spawn(async move {
            if let Err(e) = connection.await {
                error!(error = %e, "PostgreSQL connection error");
            }
        });

        debug!("PostgreSQL session started");
        self.session = Some(Session {
            runtime,
            client,
            driver_task,
        });
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(session) = self.session.take() {
            let Session {
                runtime,
                client,
                driver_task,
            } = session;
            // Dropping the last client lets the connection task terminate.
            drop(client);
            if let Err(e) = runtime.block_on(driver_task) {
                return Err(DbExecError::connection(BACKEND, e));
            }
            debug!("PostgreSQL session ended");
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.session.is_some()
    }

    fn execute(&mut self, command: &CommandSpec) -> Result<u64> {
        let sql = render_sql(command);
        let params = bind_params(command);
        let (session, statement) = self.prepare(&sql)?;
        let refs = param_refs(&params);
        session
            .runtime
            .block_on(session.client.execute(&statement, &refs))
            .map_err(|e| DbExecError::execution(BACKEND, e))
    }

    fn query(&mut self, command: &CommandSpec) -> Result<DataTable> {
        let sql = render_sql(command);
        let params = bind_params(command);
        self.query_params(&sql, &params)
    }

    // Takes the first row off the stream and drops the rest unread.
    fn scalar(&mut self, command: &CommandSpec) -> Result<Option<SqlValue>> {
        let sql = render_sql(command);
        let params = bind_params(command);
        let (session, statement) = self.prepare(&sql)?;
        let refs = params.iter().map(|p| p.as_ref() as &dyn ToSql);
        let first = session
            .runtime
            .block_on(async {
                let mut stream = Box::pin(session.client.query_raw(&statement, refs).await?);
                stream.next().await.transpose()
            })
            .map_err(|e| DbExecError::execution(BACKEND, e))?;

        Ok(first.and_then(|row| {
            row.columns()
                .first()
                .map(|column| column_value(&row, 0, column.type_()))
        }))
    }

    fn into_cursor(mut self: Box<Self>, command: &CommandSpec) -> Result<Box<dyn RowCursor>> {
        let sql = render_sql(command);
        let params = bind_params(command);

        let started = self.prepare(&sql).and_then(|(session, statement)| {
            let refs = params.iter().map(|p| p.as_ref() as &dyn ToSql);
            let stream = session
                .runtime
                .block_on(session.client.query_raw(&statement, refs))
                .map_err(|e| DbExecError::execution(BACKEND, e))?;
            Ok((column_names(&statement), stream))
        });

        match started {
            Ok((columns, stream)) => Ok(Box::new(PostgresCursor {
                connection: *self,
                columns,
                stream: Some(Box::pin(stream)),
            })),
            Err(e) => {
                if let Err(close_err) = self.close() {
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
        let (sql, slots) = match collection {
            SchemaCollection::Tables => (TABLES_SQL, 4),
            SchemaCollection::Columns => (COLUMNS_SQL, 4),
            SchemaCollection::PrimaryKeys => (PRIMARY_KEYS_SQL, 3),
        };
        let params: Vec<BoxedParam> = restrictions
            .slots()
            .iter()
            .take(slots)
            .map(|slot| sql_value_to_tosql(&SqlValue::from(slot.clone())))
            .collect();
        self.query_params(sql, &params)
    }
}

impl Drop for PostgresConnection {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

struct PostgresCursor {
    connection: PostgresConnection,
    columns: Vec<String>,
    stream: Option<Pin<Box<RowStream>>>,
}

impl RowCursor for PostgresCursor {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn next_row(&mut self) -> Result<Option<Vec<SqlValue>>> {
        let session = self.connection.session()?;
        let Some(stream) = self.stream.as_mut() else {
            return Ok(None);
        };
        match session.runtime.block_on(stream.next()) {
            Some(Ok(row)) => Ok(Some(row_values(&row))),
            Some(Err(e)) => Err(DbExecError::execution(BACKEND, e)),
            None => {
                self.stream = None;
                Ok(None)
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        self.stream = None;
        self.connection.close()
    }

    fn is_closed(&self) -> bool {
        !self.connection.is_open()
    }
}

/// Rewrite the command text for its kind. Plain text uses `$n` placeholders
/// in bound-parameter order.
fn render_sql(command: &CommandSpec) -> String {
    match command.kind() {
        CommandKind::Text => command.sql().to_string(),
        CommandKind::StoredProcedure => {
            let placeholders: Vec<String> = (1..=command.bound_parameters().count())
                .map(|i| format!("${i}"))
                .collect();
            format!("CALL {}({})", command.sql(), placeholders.join(", "))
        }
        CommandKind::TableDirect => format!("SELECT * FROM {}", command.quoted_name()),
    }
}

fn bind_params(command: &CommandSpec) -> Vec<BoxedParam> {
    command
        .bound_parameters()
        .map(|p| sql_value_to_tosql(p.value()))
        .collect()
}

fn param_refs(params: &[BoxedParam]) -> Vec<&(dyn ToSql + Sync)> {
    params
        .iter()
        .map(|b| b.as_ref() as &(dyn ToSql + Sync))
        .collect()
}

fn column_names(statement: &Statement) -> Vec<String> {
    statement
        .columns()
        .iter()
        .map(|c| c.name().to_string())
        .collect()
}

/// NULL that binds to a parameter of any type.
#[derive(Debug)]
struct PgNull;

impl ToSql for PgNull {
    fn to_sql(
        &self,
        _ty: &Type,
        _out: &mut BytesMut,
    ) -> std::result::Result<IsNull, Box<dyn Error + Sync + Send>> {
        Ok(IsNull::Yes)
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

/// Convert a SqlValue to a boxed ToSql trait object.
fn sql_value_to_tosql(value: &SqlValue) -> BoxedParam {
    match value {
        SqlValue::Null => Box::new(PgNull),
        SqlValue::Bool(b) => Box::new(*b),
        SqlValue::Int32(i) => Box::new(*i),
        SqlValue::Int64(i) => Box::new(*i),
        SqlValue::Float64(f) => Box::new(*f),
        SqlValue::Text(s) => Box::new(s.clone()),
        SqlValue::Bytes(b) => Box::new(b.clone()),
    }
}

fn row_values(row: &tokio_postgres::Row) -> Vec<SqlValue> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, col)| column_value(row, i, col.type_()))
        .collect()
}

/// Decode one column by its declared type.
fn column_value(row: &tokio_postgres::Row, index: usize, ty: &Type) -> SqlValue {
    let decoded = match *ty {
        Type::BOOL => row.try_get::<_, Option<bool>>(index).map(SqlValue::from),
        Type::INT2 => row
            .try_get::<_, Option<i16>>(index)
            .map(|v| SqlValue::from(v.map(i32::from))),
        Type::INT4 => row.try_get::<_, Option<i32>>(index).map(SqlValue::from),
        Type::INT8 => row.try_get::<_, Option<i64>>(index).map(SqlValue::from),
        Type::OID => row
            .try_get::<_, Option<u32>>(index)
            .map(|v| SqlValue::from(v.map(i64::from))),
        Type::FLOAT4 => row
            .try_get::<_, Option<f32>>(index)
            .map(|v| SqlValue::from(v.map(f64::from))),
        Type::FLOAT8 => row.try_get::<_, Option<f64>>(index).map(SqlValue::from),
        Type::BYTEA => row.try_get::<_, Option<Vec<u8>>>(index).map(SqlValue::from),
        _ => row.try_get::<_, Option<String>>(index).map(SqlValue::from),
    };

    decoded.unwrap_or_else(|e| {
        // Numeric, temporal and json columns end up here.
        debug!(column = index, %ty, error = %e, "undecodable column read as NULL");
        SqlValue::Null
    })
}

const TABLES_SQL: &str = r#"
SELECT table_catalog::text AS "TABLE_CATALOG",
       table_schema::text  AS "TABLE_SCHEMA",
       table_name::text    AS "TABLE_NAME",
       table_type::text    AS "TABLE_TYPE"
FROM information_schema.tables
WHERE table_schema NOT IN ('pg_catalog', 'information_schema')
  AND ($1::text IS NULL OR table_catalog = $1)
  AND ($2::text IS NULL OR table_schema = $2)
  AND ($3::text IS NULL OR table_name = $3)
  AND ($4::text IS NULL OR table_type = $4)
ORDER BY table_schema, table_name
"#;

const COLUMNS_SQL: &str = r#"
SELECT table_catalog::text     AS "TABLE_CATALOG",
       table_schema::text      AS "TABLE_SCHEMA",
       table_name::text        AS "TABLE_NAME",
       column_name::text       AS "COLUMN_NAME",
       ordinal_position::int4  AS "ORDINAL_POSITION",
       data_type::text         AS "DATA_TYPE",
       is_nullable::text       AS "IS_NULLABLE",
       column_default::text    AS "COLUMN_DEFAULT"
FROM information_schema.columns
WHERE table_schema NOT IN ('pg_catalog', 'information_schema')
  AND ($1::text IS NULL OR table_catalog = $1)
  AND ($2::text IS NULL OR table_schema = $2)
  AND ($3::text IS NULL OR table_name = $3)
  AND ($4::text IS NULL OR column_name = $4)
ORDER BY table_schema, table_name, ordinal_position
"#;

// Keys have no fourth restriction slot.
const PRIMARY_KEYS_SQL: &str = r#"
SELECT kcu.table_catalog::text     AS "TABLE_CATALOG",
       kcu.table_schema::text      AS "TABLE_SCHEMA",
       kcu.table_name::text        AS "TABLE_NAME",
       kcu.column_name::text       AS "COLUMN_NAME",
       kcu.ordinal_position::int4  AS "KEY_SEQ"
FROM information_schema.table_constraints tc
JOIN information_schema.key_column_usage kcu
  ON tc.constraint_schema = kcu.constraint_schema
 AND tc.constraint_name = kcu.constraint_name
 AND tc.table_name = kcu.table_name
WHERE tc.constraint_type = 'PRIMARY KEY'
  AND ($1::text IS NULL OR kcu.table_catalog = $1)
  AND ($2::text IS NULL OR kcu.table_schema = $2)
  AND ($3::text IS NULL OR kcu.table_name = $3)
ORDER BY kcu.table_schema, kcu.table_name, kcu.ordinal_position
"#;
