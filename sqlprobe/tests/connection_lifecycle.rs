//! Live-database lifecycle tests.
//!
//! These need a reachable SQL Server and an installed ODBC driver, so they
//! are ignored by default. Run them explicitly against a local instance:
//!
//! ```text
//! cargo test -p sqlprobe -- --ignored
//! ```

use sqlprobe::connection::{ConnectionManager, ConnectionParams};

fn local_params() -> ConnectionParams {
    ConnectionParams {
        server: "localhost".to_string(),
        database: "master".to_string(),
        trusted_connection: "yes".to_string(),
    }
}

#[test]
#[ignore]
fn test_connection_lifecycle() {
    let mut manager = ConnectionManager::new(local_params());
    assert!(!manager.is_connected());

    assert!(manager.verify_connection().expect("failed to connect"));
    assert!(manager.is_connected());

    manager.test_connection().expect("self-test failed");

    manager.close_connection();
    assert!(!manager.is_connected());
}

#[test]
#[ignore]
fn test_failed_self_test_forces_reopen() {
    let mut manager = ConnectionManager::new(local_params());
    manager.verify_connection().expect("failed to connect");

    // a statement fault must not leak the cursor or wedge the connection
    let err = manager.run_query("SELECT * FROM table_that_does_not_exist");
    assert!(err.is_err());

    // the manager is still usable for the next scoped operation
    manager.test_connection().expect("self-test failed");
}

#[test]
#[ignore]
fn test_metadata_miss_is_not_a_fault() {
    let mut manager = ConnectionManager::new(local_params());

    let tables = manager
        .list_tables(Some("NoSuchTableAnywhere"))
        .expect("metadata call failed");
    assert!(tables.is_empty());

    let filter = sqlprobe_core::models::ColumnFilter {
        table: Some("Person".to_string()),
        column: Some("Banana".to_string()),
        ..Default::default()
    };
    let columns = manager.list_columns(&filter).expect("metadata call failed");
    assert!(columns.is_empty());
}

#[test]
#[ignore]
fn test_invalid_server_is_a_connection_fault() {
    let mut manager = ConnectionManager::new(ConnectionParams {
        server: "no-such-host.invalid".to_string(),
        ..local_params()
    });

    let err = manager.verify_connection().unwrap_err();
    assert_eq!(err.category(), "Connection");
    assert!(!manager.is_connected());
}
