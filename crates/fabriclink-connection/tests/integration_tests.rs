//! Integration tests for the connection manager
//!
//! Drivers are `MockDriver`s, the control plane is a `ScriptedTransport`, and
//! retry sleeps are recorded instead of taken.
//!
//! ```bash
//! cargo test -p fabriclink-connection --test integration_tests
//! ```

mod fixtures;

use chrono::NaiveDate;
use fabriclink_connection::{Connection, ConnectionError, ConnectionState, RETRY_INTERVAL};
use fabriclink_core::{AuthenticationMode, DriverPreference};
use fabriclink_driver::{
    DriverError, MockDriver, SqlValue, SQL_COPT_SS_ACCESS_TOKEN, SQL_SS_TIMESTAMPOFFSET,
};
use fabriclink_snapshots::{HttpMethod, OperationType, ScriptedTransport};
use fixtures::*;
use pretty_assertions::assert_eq;
use std::time::Duration;

// =============================================================================
// Opening connections
// =============================================================================

#[test]
fn test_open_connects_with_profile_settings() {
    let h = native_harness(MockDriver::new("native"));
    let mut conn = Connection::new("master");

    h.manager.open(&mut conn).unwrap();

    assert_eq!(conn.state(), ConnectionState::Open);
    let calls = h.native.connect_calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].autocommit);
    assert_eq!(calls[0].timeout, Duration::from_secs(15));
    assert!(calls[0].attrs_before.is_empty());

    let conn_str = &calls[0].connection_string;
    assert!(conn_str.contains("Authentication=ActiveDirectoryServicePrincipal"));
    assert!(conn_str.contains("UID=app-id"));
    assert!(conn_str.contains("PWD=sp-secret"));
    assert!(conn_str.contains("APP=fabriclink/test"));
    assert!(!conn_str.contains("DRIVER="));

    assert_eq!(h.native.query_timeouts(), vec![Duration::from_secs(60)]);
    assert!(h.odbc.connect_calls().is_empty());
}

#[test]
fn test_open_is_noop_when_already_open() {
    let h = native_harness(MockDriver::new("native"));
    let mut conn = Connection::new("master");

    h.manager.open(&mut conn).unwrap();
    h.manager.open(&mut conn).unwrap();

    assert_eq!(h.native.connect_calls().len(), 1);
}

#[test]
fn test_open_retries_transient_errors() {
    let native = MockDriver::new("native").with_connect_failures(vec![
        DriverError::operational("login timeout expired"),
        DriverError::interface("TCP provider error"),
    ]);
    let h = native_harness(native);
    let mut conn = Connection::new("master");

    h.manager.open(&mut conn).unwrap();

    assert_eq!(h.native.connect_calls().len(), 3);
    assert_eq!(h.sleeper.sleeps(), vec![RETRY_INTERVAL; 2]);
    assert!(conn.is_open());
}

#[test]
fn test_open_gives_up_after_retries() {
    let failure = DriverError::operational("login timeout expired");
    let native = MockDriver::new("native").with_connect_failures(vec![failure.clone(); 5]);
    let h = native_harness(native);
    let mut conn = Connection::new("master");

    let err = h.manager.open(&mut conn).unwrap_err();

    assert_eq!(err.as_driver_error(), Some(&failure));
    assert_eq!(h.native.connect_calls().len(), 3);
    assert_eq!(h.sleeper.count(), 2);
    assert_eq!(conn.state(), ConnectionState::Failed);
}

#[test]
fn test_open_does_not_retry_hard_errors() {
    let native = MockDriver::new("native")
        .with_connect_failures(vec![DriverError::programming("Login failed for user")]);
    let h = native_harness(native);
    let mut conn = Connection::new("master");

    assert!(h.manager.open(&mut conn).is_err());
    assert_eq!(h.native.connect_calls().len(), 1);
    assert_eq!(h.sleeper.count(), 0);
}

#[test]
fn test_sql_authentication_fails_before_connecting() {
    let creds = service_principal(DriverPreference::Native)
        .with_authentication(AuthenticationMode::Sql);
    let h = harness(creds, MockDriver::new("native"), MockDriver::new("odbc"));
    let mut conn = Connection::new("master");

    let err = h.manager.open(&mut conn).unwrap_err();

    assert!(err.to_string().contains("SQL Authentication is not supported"));
    assert!(h.native.connect_calls().is_empty());
    assert_eq!(conn.state(), ConnectionState::Failed);
}

#[test]
fn test_odbc_sends_static_token_out_of_band() {
    let mut creds = service_principal(DriverPreference::Odbc)
        .with_authentication(AuthenticationMode::ActiveDirectoryAccessToken);
    creds.access_token = Some("abc".to_string());
    let h = harness(creds, MockDriver::new("native"), MockDriver::new("odbc"));
    let mut conn = Connection::new("master");

    h.manager.open(&mut conn).unwrap();

    let calls = h.odbc.connect_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(
        calls[0].attrs_before.get(SQL_COPT_SS_ACCESS_TOKEN),
        Some(&[6u8, 0, 0, 0, b'a', 0, b'b', 0, b'c', 0][..])
    );
    assert!(calls[0].connection_string.starts_with("DRIVER={ODBC Driver 18 for SQL Server}"));
    assert!(!calls[0].connection_string.contains("Authentication="));
}

#[test]
fn test_display_connection_string_masks_secret() {
    let h = native_harness(MockDriver::new("native"));

    let display = h.manager.display_connection_string().unwrap();

    assert!(display.contains("PWD=***"));
    assert!(!display.contains("sp-secret"));
}

#[test]
fn test_native_backend_warns_but_ignores_driver_setting() {
    let mut creds = service_principal(DriverPreference::Native);
    creds.driver = Some("ODBC Driver 17 for SQL Server".to_string());
    let h = harness(creds, MockDriver::new("native"), MockDriver::new("odbc"));
    let mut conn = Connection::new("master");

    h.manager.open(&mut conn).unwrap();

    assert!(!h.native.connect_calls()[0].connection_string.contains("Driver 17"));
}

// =============================================================================
// Statement execution
// =============================================================================

#[test]
fn test_execute_fetches_first_result_set() {
    let native = MockDriver::new("native")
        .with_statement_set()
        .with_result_set(vec![
            vec![SqlValue::Int(1)],
            vec![SqlValue::Int(2)],
            vec![SqlValue::Int(3)],
        ])
        .with_statement_set()
        .with_rowcount(3);
    let h = native_harness(native);
    let mut conn = Connection::new("model.sales.orders");
    h.manager.open(&mut conn).unwrap();

    let (response, rows) = h
        .manager
        .execute(&mut conn, "select id from orders", true, Some(2))
        .unwrap();

    assert_eq!(response.message, "OK");
    assert_eq!(response.rows_affected, 3);
    assert_eq!(rows, vec![vec![SqlValue::Int(1)], vec![SqlValue::Int(2)]]);
    assert_eq!(h.native.sets_visited(), 2);
    assert_eq!(h.native.registered_converters(), vec![SQL_SS_TIMESTAMPOFFSET]);
}

#[test]
fn test_execute_without_fetch_returns_no_rows() {
    let native = MockDriver::new("native").with_result_set(vec![vec![SqlValue::Int(1)]]);
    let h = native_harness(native);
    let mut conn = Connection::new("model.sales.orders");
    h.manager.open(&mut conn).unwrap();

    let (_, rows) = h
        .manager
        .execute(&mut conn, "select 1", false, None)
        .unwrap();

    assert!(rows.is_empty());
}

#[test]
fn test_datetime_bindings_are_sent_as_text() {
    let h = native_harness(MockDriver::new("native"));
    let mut conn = Connection::new("model.sales.orders");
    h.manager.open(&mut conn).unwrap();
    let at = NaiveDate::from_ymd_opt(2024, 2, 29)
        .unwrap()
        .and_hms_opt(23, 59, 59)
        .unwrap();

    h.manager
        .add_query(
            &mut conn,
            "delete from orders where loaded_at < ?",
            Some(&[SqlValue::DateTime(at)]),
        )
        .unwrap();

    let executed = h.native.executed();
    assert_eq!(
        executed[0].bindings,
        Some(vec![SqlValue::Text("2024-02-29T23:59:59".to_string())])
    );
}

#[test]
fn test_transient_query_errors_are_retried() {
    let native = MockDriver::new("native")
        .with_execute_failures(vec![DriverError::operational("connection reset")]);
    let h = native_harness(native);
    let mut conn = Connection::new("model.sales.orders");
    h.manager.open(&mut conn).unwrap();

    h.manager.execute(&mut conn, "select 1", false, None).unwrap();

    assert_eq!(h.native.execute_attempts(), 2);
    assert_eq!(h.sleeper.sleeps(), vec![Duration::from_secs(1)]);
}

#[test]
fn test_retries_reuse_one_cursor() {
    let native = MockDriver::new("native").with_execute_failures(vec![
        DriverError::operational("connection reset"),
        DriverError::operational("connection reset"),
    ]);
    let h = native_harness(native);
    let mut conn = Connection::new("model.sales.orders");
    h.manager.open(&mut conn).unwrap();

    h.manager.add_query(&mut conn, "select 1", None).unwrap();

    assert_eq!(h.native.execute_attempts(), 3);
    assert_eq!(h.native.cursors_opened(), 1);
    assert_eq!(h.native.executed().len(), 1);
}

#[test]
fn test_persistent_transient_error_uses_whole_retry_limit() {
    let mut creds = service_principal(DriverPreference::Native);
    creds.retries = 5;
    let native =
        MockDriver::new("native").with_failing_execute(DriverError::operational("connection reset"));
    let h = harness(creds, native, MockDriver::new("odbc"));
    let mut conn = Connection::new("model.sales.orders");
    h.manager.open(&mut conn).unwrap();

    let err = h
        .manager
        .execute(&mut conn, "select 1", false, None)
        .unwrap_err();

    assert_eq!(h.native.execute_attempts(), 5);
    assert_eq!(h.sleeper.count(), 4);
    match err {
        ConnectionError::Database(message) => {
            assert_eq!(message, "OperationalError: connection reset")
        }
        other => panic!("expected a database error, got {:?}", other),
    }
}

#[test]
fn test_database_error_releases_connection() {
    let native = MockDriver::new("native")
        .with_failing_execute(DriverError::programming("Invalid object name 'nope'"));
    let h = native_harness(native);
    let mut conn = Connection::new("model.sales.orders");
    h.manager.open(&mut conn).unwrap();

    let err = h
        .manager
        .add_query(&mut conn, "select * from nope", None)
        .err().unwrap();

    assert_eq!(
        err.to_string(),
        "Database Error\n  ProgrammingError: Invalid object name 'nope'"
    );
    assert_eq!(h.native.execute_attempts(), 1);
    assert_eq!(h.native.closes(), 1);
    assert_eq!(h.native.rollbacks(), 0);
    assert_eq!(conn.state(), ConnectionState::Closed);
}

#[test]
fn test_release_failure_during_database_error_is_swallowed() {
    let native = MockDriver::new("native")
        .with_failing_execute(DriverError::programming("syntax error"))
        .with_close_failure(DriverError::operational("already closed"));
    let h = native_harness(native);
    let mut conn = Connection::new("model.sales.orders");
    h.manager.open(&mut conn).unwrap();

    let err = h
        .manager
        .add_query(&mut conn, "selec 1", None)
        .err().unwrap();

    assert!(matches!(err, ConnectionError::Database(_)));
}

#[test]
fn test_interface_error_propagates_unchanged() {
    let failure = DriverError::interface("invalid cursor state");
    let native = MockDriver::new("native").with_failing_execute(failure.clone());
    let h = native_harness(native);
    let mut conn = Connection::new("model.sales.orders");
    h.manager.open(&mut conn).unwrap();

    let err = h
        .manager
        .add_query(&mut conn, "select 1", None)
        .err().unwrap();

    assert_eq!(err.as_driver_error(), Some(&failure));
    // Interface errors are transient for every backend
    assert_eq!(h.native.execute_attempts(), 3);
    assert_eq!(h.native.closes(), 0);
    assert!(conn.is_open());
}

#[test]
fn test_explicit_release_rolls_back_and_closes() {
    let h = native_harness(MockDriver::new("native"));
    let mut conn = Connection::new("model.sales.orders");
    h.manager.open(&mut conn).unwrap();

    h.manager.release(&mut conn).unwrap();

    assert_eq!(h.native.rollbacks(), 1);
    assert_eq!(h.native.closes(), 1);
    assert_eq!(conn.state(), ConnectionState::Closed);
}

#[test]
fn test_unopened_connection_error_passes_through() {
    let h = native_harness(MockDriver::new("native"));
    let mut conn = Connection::new("never-opened");

    let err = h
        .manager
        .add_query(&mut conn, "select 1", None)
        .err().unwrap();

    assert_eq!(
        err.to_string(),
        "Runtime Error\n  Connection 'never-opened' is not open"
    );
}

// =============================================================================
// Run lifecycle
// =============================================================================

fn snapshot_transport() -> ScriptedTransport {
    ScriptedTransport::new()
        .respond_json(200, warehouses())
        .respond_json(200, existing_snapshot())
        .respond_json(200, updated_snapshot())
}

#[test]
fn test_first_open_orchestrates_snapshot_once() {
    let transport = snapshot_transport();
    let creds = service_principal(DriverPreference::Native).with_snapshot("ws-1", "nightly");
    let lifecycle = lifecycle("run", &transport);
    let h = harness(creds, MockDriver::new("native"), MockDriver::new("odbc"));
    let manager = h.manager.with_lifecycle(lifecycle.clone());

    let mut first = Connection::new("model.a");
    let mut second = Connection::new("model.b");
    manager.open(&mut first).unwrap();
    manager.open(&mut second).unwrap();

    assert!(lifecycle.has_started());
    assert_eq!(transport.requests().len(), 3);

    let hook = lifecycle.take_post_run_hook().unwrap();
    let record = hook.record().unwrap();
    assert_eq!(record.operation_type, OperationType::Update);
    assert_eq!(record.snapshot_id.as_deref(), Some("snap-1"));
}

#[test]
fn test_other_commands_skip_orchestration() {
    let transport = snapshot_transport();
    let creds = service_principal(DriverPreference::Native).with_snapshot("ws-1", "nightly");
    let lifecycle = lifecycle("compile", &transport);
    let h = harness(creds, MockDriver::new("native"), MockDriver::new("odbc"));
    let manager = h.manager.with_lifecycle(lifecycle.clone());

    manager.open(&mut Connection::new("model.a")).unwrap();

    assert!(transport.requests().is_empty());
    assert!(lifecycle.take_post_run_hook().is_none());
}

#[test]
fn test_orchestration_failure_does_not_block_connection() {
    let transport = ScriptedTransport::new().respond_json(500, serde_json::json!({"error": "boom"}));
    let creds = service_principal(DriverPreference::Native).with_snapshot("ws-1", "nightly");
    let lifecycle = lifecycle("build", &transport);
    let h = harness(creds, MockDriver::new("native"), MockDriver::new("odbc"));
    let manager = h.manager.with_lifecycle(lifecycle.clone());
    let mut conn = Connection::new("model.a");

    manager.open(&mut conn).unwrap();

    assert!(conn.is_open());
    assert!(lifecycle.take_post_run_hook().is_none());
}

#[test]
fn test_successful_run_refreshes_snapshot() {
    let transport = snapshot_transport().respond_json(200, updated_snapshot());
    let creds = service_principal(DriverPreference::Native).with_snapshot("ws-1", "nightly");
    let lifecycle = lifecycle("run", &transport);
    let h = harness(creds, MockDriver::new("native"), MockDriver::new("odbc"));
    let manager = h.manager.with_lifecycle(lifecycle.clone());
    manager.open(&mut Connection::new("model.a")).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let run_results = dir.path().join("run_results.json");
    std::fs::write(
        &run_results,
        r#"{"results": [{"status": "success"}, {"status": "pass"}]}"#,
    )
    .unwrap();

    let refreshed = lifecycle.finish(&run_results).unwrap();

    assert_eq!(refreshed.snapshot_id.as_deref(), Some("snap-1"));
    let requests = transport.requests();
    assert_eq!(requests.len(), 4);
    assert_eq!(requests[3].method, HttpMethod::Patch);
}

#[test]
fn test_failed_run_skips_refresh() {
    let transport = snapshot_transport();
    let creds = service_principal(DriverPreference::Native).with_snapshot("ws-1", "nightly");
    let lifecycle = lifecycle("run", &transport);
    let h = harness(creds, MockDriver::new("native"), MockDriver::new("odbc"));
    let manager = h.manager.with_lifecycle(lifecycle.clone());
    manager.open(&mut Connection::new("model.a")).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let run_results = dir.path().join("run_results.json");
    std::fs::write(
        &run_results,
        r#"{"results": [{"status": "success"}, {"status": "error"}]}"#,
    )
    .unwrap();

    assert!(lifecycle.finish(&run_results).is_none());
    assert_eq!(transport.requests().len(), 3);
}

#[test]
fn test_missing_run_results_skips_refresh() {
    let transport = snapshot_transport();
    let creds = service_principal(DriverPreference::Native).with_snapshot("ws-1", "nightly");
    let lifecycle = lifecycle("run", &transport);
    let h = harness(creds, MockDriver::new("native"), MockDriver::new("odbc"));
    let manager = h.manager.with_lifecycle(lifecycle.clone());
    manager.open(&mut Connection::new("model.a")).unwrap();

    let dir = tempfile::tempdir().unwrap();
    assert!(lifecycle.finish(&dir.path().join("run_results.json")).is_none());
    assert_eq!(transport.requests().len(), 3);
}
