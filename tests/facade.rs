use std::sync::Arc;

use dbexec::drivers::{InMemoryTestDriver, InMemoryTestResponseBuilder, TestTable};
use dbexec::error::DbExecError;
use dbexec::traits::DriverFactory;
use dbexec::types::SqlValue;
use dbexec::{BackendKind, CommandKind, DbExecClient, ParameterDirection, ProviderRegistry};

fn client_for(driver: &InMemoryTestDriver) -> DbExecClient {
    let shared = driver.clone();
    let registry = ProviderRegistry::default().with(BackendKind::TestMemory, move || {
        Arc::new(shared.clone()) as Arc<dyn DriverFactory>
    });
    DbExecClient::with_registry("mem://test", BackendKind::TestMemory, &registry).unwrap()
}

#[test]
fn test_insert_then_count() {
    let in_memory_test_driver = InMemoryTestDriver::new()
        .with_table(TestTable::new("t").column("x", "INTEGER", true))
        .with_affected_rows(1)
        .with_response(
            InMemoryTestResponseBuilder::new()
                .columns(&["COUNT(*)"])
                .row([1])
                .build(),
        );
    let client = client_for(&in_memory_test_driver);
    assert_eq!(client.backend(), BackendKind::TestMemory);
    assert_eq!(client.connection_string(), "mem://test");

    let affected = client
        .execute_non_query("INSERT INTO t(x) VALUES(1)", &[])
        .unwrap();
    assert_eq!(affected, 1);
    in_memory_test_driver.assert_all_connections_closed();

    let count = client.execute_scalar("SELECT COUNT(*) FROM t", &[]).unwrap();
    assert_eq!(count.and_then(|v| v.as_i64()), Some(1));

    in_memory_test_driver.assert_command_count(2);
    in_memory_test_driver.assert_all_connections_closed();
    assert_eq!(in_memory_test_driver.connections_opened(), 2);
}

#[test]
fn test_parameters_reach_the_driver() {
    let in_memory_test_driver = InMemoryTestDriver::new().with_affected_rows(1);
    let client = client_for(&in_memory_test_driver);

    let params = vec![
        client.create_parameter("@name", "Bob"),
        client.create_parameter("@age", 30),
    ];
    client
        .execute_non_query("UPDATE users SET age = @age WHERE name = @name", &params)
        .unwrap();

    in_memory_test_driver.assert_last_command(
        "UPDATE users SET age = @age WHERE name = @name",
        &[SqlValue::Text("Bob".to_string()), SqlValue::Int32(30)],
    );
}

#[test]
fn test_command_kind_and_direction_are_recorded() {
    let in_memory_test_driver = InMemoryTestDriver::new();
    let client = client_for(&in_memory_test_driver);

    let params = vec![
        client.create_parameter("cutoff", 30),
        client.create_parameter_with_direction("archived", ParameterDirection::Output, None::<i64>),
    ];
    client
        .execute_non_query_with_kind("archive_orders", &params, CommandKind::StoredProcedure)
        .unwrap();

    let last = in_memory_test_driver.last_command().unwrap();
    assert_eq!(last.kind, CommandKind::StoredProcedure);
    assert_eq!(last.params[1].direction(), ParameterDirection::Output);
}

#[test]
fn test_scalar_on_empty_result_is_none() {
    let in_memory_test_driver = InMemoryTestDriver::new().with_response(
        InMemoryTestResponseBuilder::new().columns(&["id"]).build(), // No rows
    );
    let client = client_for(&in_memory_test_driver);

    let value = client
        .execute_scalar("SELECT id FROM users WHERE id = 999", &[])
        .unwrap();
    assert_eq!(value, None);
    in_memory_test_driver.assert_all_connections_closed();
}

#[test]
fn test_scalar_null_cell_is_some_null() {
    let in_memory_test_driver = InMemoryTestDriver::new().with_response(
        InMemoryTestResponseBuilder::new()
            .columns(&["name"])
            .row([SqlValue::Null])
            .build(),
    );
    let client = client_for(&in_memory_test_driver);

    let value = client.execute_scalar("SELECT name FROM users", &[]).unwrap();
    assert_eq!(value, Some(SqlValue::Null));
}

#[test]
fn test_data_table_preserves_order_and_is_repeatable() {
    let response = InMemoryTestResponseBuilder::new()
        .columns(&["id", "name"])
        .row([SqlValue::from(2), SqlValue::from("Bob")])
        .row([SqlValue::from(1), SqlValue::from("Alice")])
        .build();
    let in_memory_test_driver = InMemoryTestDriver::new()
        .with_response(response.clone())
        .with_response(response);
    let client = client_for(&in_memory_test_driver);

    let first = client.execute_data_table("SELECT id, name FROM users", &[]).unwrap();
    let second = client.execute_data_table("SELECT id, name FROM users", &[]).unwrap();

    assert_eq!(first.columns(), ["id", "name"]);
    assert_eq!(first.rows()[0].get("name").unwrap(), &SqlValue::from("Bob"));
    assert_eq!(first.rows()[1].get("name").unwrap(), &SqlValue::from("Alice"));
    assert_eq!(first, second);
    in_memory_test_driver.assert_all_connections_closed();
}

#[test]
fn test_reader_keeps_connection_open_until_drained() {
    let in_memory_test_driver = InMemoryTestDriver::new().with_response(
        InMemoryTestResponseBuilder::new()
            .columns(&["id"])
            .row([1])
            .row([2])
            .row([3])
            .build(),
    );
    let client = client_for(&in_memory_test_driver);

    let mut reader = client.execute_reader("SELECT id FROM users", &[]).unwrap();
    assert_eq!(reader.columns(), ["id"]);
    assert_eq!(in_memory_test_driver.open_connections(), 1);

    let first = reader.read().unwrap().unwrap();
    assert_eq!(first.get("id").unwrap(), &SqlValue::Int32(1));
    assert_eq!(in_memory_test_driver.open_connections(), 1);

    let rest: Vec<_> = (&mut reader).collect::<Result<_, _>>().unwrap();
    assert_eq!(rest.len(), 2);
    assert!(reader.is_closed());
    assert_eq!(reader.rows_read(), 3);
    in_memory_test_driver.assert_all_connections_closed();

    // Reading past the end stays quiet.
    assert!(reader.read().unwrap().is_none());
}

#[test]
fn test_reader_explicit_close_and_drop() {
    let rows = InMemoryTestResponseBuilder::new()
        .columns(&["id"])
        .row([1])
        .row([2])
        .build();
    let in_memory_test_driver = InMemoryTestDriver::new()
        .with_response(rows.clone())
        .with_response(rows);
    let client = client_for(&in_memory_test_driver);

    let mut reader = client.execute_reader("SELECT id FROM users", &[]).unwrap();
    reader.read().unwrap();
    reader.close().unwrap();
    assert!(reader.is_closed());
    in_memory_test_driver.assert_all_connections_closed();

    {
        let reader = client.execute_reader("SELECT id FROM users", &[]).unwrap();
        assert!(!reader.is_closed());
        assert_eq!(in_memory_test_driver.open_connections(), 1);
    }
    in_memory_test_driver.assert_all_connections_closed();
}

#[test]
fn test_forgotten_reader_leaks_its_connection() {
    let in_memory_test_driver = InMemoryTestDriver::new().with_response(
        InMemoryTestResponseBuilder::new().columns(&["id"]).row([1]).build(),
    );
    let client = client_for(&in_memory_test_driver);

    let reader = client.execute_reader("SELECT id FROM users", &[]).unwrap();
    std::mem::forget(reader);

    assert_eq!(in_memory_test_driver.open_connections(), 1);
}

#[test]
fn test_execution_failure_closes_connection_in_every_buffered_mode() {
    let in_memory_test_driver = InMemoryTestDriver::new()
        .with_execution_error("syntax error at or near \"SELEC\"")
        .with_execution_error("syntax error at or near \"SELEC\"")
        .with_execution_error("syntax error at or near \"SELEC\"");
    let client = client_for(&in_memory_test_driver);

    let non_query = client.execute_non_query("SELEC 1", &[]).unwrap_err();
    let scalar = client.execute_scalar("SELEC 1", &[]).unwrap_err();
    let table = client.execute_data_table("SELEC 1", &[]).unwrap_err();

    for err in [non_query, scalar, table] {
        match err {
            DbExecError::ExecutionFailed { backend, message } => {
                assert_eq!(backend, BackendKind::TestMemory);
                assert!(message.contains("SELEC"));
            }
            other => panic!("Expected ExecutionFailed error, got {other:?}"),
        }
    }
    assert_eq!(in_memory_test_driver.connections_opened(), 3);
    in_memory_test_driver.assert_all_connections_closed();
}

#[test]
fn test_reader_execution_failure_closes_connection() {
    let in_memory_test_driver = InMemoryTestDriver::new().with_execution_error("no such table");
    let client = client_for(&in_memory_test_driver);

    let err = client.execute_reader("SELECT * FROM missing", &[]).unwrap_err();
    assert!(matches!(err, DbExecError::ExecutionFailed { .. }));
    in_memory_test_driver.assert_all_connections_closed();
}

#[test]
fn test_reader_failure_keeps_execution_error_when_close_fails() {
    let in_memory_test_driver = InMemoryTestDriver::new()
        .with_execution_error("no such table: missing")
        .with_close_failure("socket already gone");
    let client = client_for(&in_memory_test_driver);

    let err = client.execute_reader("SELECT * FROM missing", &[]).unwrap_err();
    match err {
        DbExecError::ExecutionFailed { message, .. } => assert!(message.contains("missing")),
        other => panic!("Expected ExecutionFailed error, got {other:?}"),
    }
    in_memory_test_driver.assert_all_connections_closed();
}

#[test]
fn test_open_failure_is_connection_error() {
    let in_memory_test_driver = InMemoryTestDriver::new()
        .with_open_failure("connection refused")
        .with_open_failure("connection refused");
    let client = client_for(&in_memory_test_driver);

    let err = client.execute_non_query("DELETE FROM t", &[]).unwrap_err();
    assert!(matches!(err, DbExecError::ConnectionFailed { .. }));
    let err = client.execute_reader("SELECT 1", &[]).unwrap_err();
    assert!(matches!(err, DbExecError::ConnectionFailed { .. }));

    in_memory_test_driver.assert_command_count(0);
    assert_eq!(in_memory_test_driver.connections_opened(), 0);
}

#[test]
fn test_command_construction_errors() {
    let in_memory_test_driver = InMemoryTestDriver::new().without_data_adapter();
    let client = client_for(&in_memory_test_driver);

    let err = client.execute_data_table("SELECT 1", &[]).unwrap_err();
    assert!(matches!(err, DbExecError::CommandConstruction(_)));

    let err = client.execute_scalar("", &[]).unwrap_err();
    assert!(matches!(err, DbExecError::CommandConstruction(_)));

    let params = vec![client.create_parameter("id", 1), client.create_parameter("id", 2)];
    let err = client.execute_non_query("SELECT @id", &params).unwrap_err();
    assert!(matches!(err, DbExecError::CommandConstruction(_)));

    assert_eq!(in_memory_test_driver.connections_created(), 0);
}

#[test]
fn test_connection_string_can_change() {
    let in_memory_test_driver = InMemoryTestDriver::new();
    let mut client = client_for(&in_memory_test_driver);
    client.execute_non_query("DELETE FROM t", &[]).unwrap();
    assert_eq!(in_memory_test_driver.last_connection_string().as_deref(), Some("mem://test"));

    client.set_connection_string("mem://other");
    assert_eq!(client.connection_string(), "mem://other");
    client.execute_non_query("DELETE FROM t", &[]).unwrap();
    client.execute_reader("SELECT 1", &[]).unwrap().close().unwrap();
    client.schema().list_tables().unwrap();

    assert_eq!(
        in_memory_test_driver.opened_connection_strings(),
        vec!["mem://test", "mem://other", "mem://other", "mem://other"]
    );
}

#[test]
fn test_unsupported_backend_fails_at_construction() {
    let err = DbExecClient::new("Data Source=orcl", BackendKind::Oracle).unwrap_err();
    assert!(matches!(err, DbExecError::UnsupportedBackend(_)));
}

#[test]
fn test_list_tables_scenario() {
    let in_memory_test_driver = InMemoryTestDriver::new()
        .with_table(TestTable::new("orders").column("id", "INTEGER", false).primary_key(&["id"]))
        .with_table(TestTable::new("customers").column("id", "INTEGER", false).primary_key(&["id"]));
    let client = client_for(&in_memory_test_driver);

    let tables = client.schema().list_tables().unwrap();
    assert_eq!(tables, vec!["orders".to_string(), "customers".to_string()]);

    let keys = client.schema().list_primary_keys("orders").unwrap();
    assert_eq!(keys.len(), 1);
    assert_eq!(keys[0].column_name, "id");

    in_memory_test_driver.assert_all_connections_closed();
}
