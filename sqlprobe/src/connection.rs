//! ODBC connection manager and scoped cursor lifecycle.
//!
//! One manager owns at most one lazily-opened connection. Every data-access
//! operation acquires a fresh statement handle, runs against it, and releases
//! it before returning or propagating; the release happens on every exit
//! path, including fault and panic. Faults are logged once with their
//! category and message, then re-raised unchanged. No retries, no masking.
//!
//! The driver manager environment is process-wide and write-once, so
//! connection handles borrow it for `'static`.

use std::sync::OnceLock;

use odbc_api::buffers::TextRowSet;
use odbc_api::{
    Connection, ConnectionOptions, Cursor, Environment, Preallocated,
};
use tracing::{debug, error, info};

use sqlprobe_core::{
    ColumnDescription, ColumnFilter, ConfigStore, MetadataField, QueryOutcome, Result,
    SqlProbeError, TableInfo,
};

/// Fixed driver name used in every connection string. Trusted-connection
/// only: no credential field is ever assembled.
const DRIVER_NAME: &str = "ODBC Driver 17 for SQL Server";

/// Rows fetched per driver round trip.
const BATCH_SIZE: usize = 256;

/// Upper bound for a single text cell; longer values are truncated by the
/// fetch buffers.
const MAX_TEXT_SIZE: usize = 4096;

static ODBC_ENV: OnceLock<Environment> = OnceLock::new();

/// Returns the process-wide ODBC environment, creating it on first use.
fn odbc_environment() -> Result<&'static Environment> {
    if let Some(env) = ODBC_ENV.get() {
        return Ok(env);
    }
    let env = Environment::new()
        .map_err(|e| SqlProbeError::connection("initialize ODBC environment", e))?;
    Ok(ODBC_ENV.get_or_init(move || env))
}

/// Logs a structural fault with its category, then hands it back unchanged.
fn log_fault(error: SqlProbeError) -> SqlProbeError {
    error!("{}: {error}", error.category());
    error
}

/// Optional per-field replacements for the configured connection parameters.
#[derive(Debug, Clone, Default)]
pub struct ConnectionOverrides {
    /// Replaces the configured server name.
    pub server: Option<String>,
    /// Replaces the configured database name.
    pub database: Option<String>,
    /// Replaces the configured trusted-connection flag.
    pub trusted_connection: Option<String>,
}

/// Resolved connection target: server, database, and the trusted-connection
/// flag passed through to the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    /// Server host (optionally `host\instance`).
    pub server: String,
    /// Database to open.
    pub database: String,
    /// Trusted-connection flag, passed through verbatim (`yes`/`no`).
    pub trusted_connection: String,
}

impl ConnectionParams {
    /// Resolves parameters from the configuration store's `DEFAULT` section,
    /// with `overrides` taking precedence per field.
    ///
    /// # Errors
    ///
    /// Returns a `Configuration` error naming the first parameter that is
    /// present in neither the overrides nor the configuration.
    pub fn from_config(config: &ConfigStore, overrides: &ConnectionOverrides) -> Result<Self> {
        let resolve = |override_value: &Option<String>, key: &str| -> Result<String> {
            override_value
                .clone()
                .or_else(|| config.get("DEFAULT", key))
                .ok_or_else(|| {
                    SqlProbeError::configuration(format!(
                        "connection parameter '{key}' missing from overrides and config"
                    ))
                })
        };

        Ok(Self {
            server: resolve(&overrides.server, "server")?,
            database: resolve(&overrides.database, "database")?,
            trusted_connection: resolve(&overrides.trusted_connection, "trusted_connection")?,
        })
    }

    /// Assembles the ODBC connection string. No credential field is ever
    /// included.
    #[must_use]
    pub fn connection_string(&self) -> String {
        format!(
            "DRIVER={DRIVER_NAME};SERVER={};DATABASE={};Trusted_Connection={}",
            self.server, self.database, self.trusted_connection
        )
    }
}

/// A cursor-like resource whose release can be observed. The blanket
/// implementation for driver statements is empty (the handle is freed by
/// the statement's own drop immediately afterwards), but the indirection
/// lets tests count releases with a mock.
pub trait ReleaseCursor {
    /// Releases the underlying handle. Invoked exactly once, on every exit
    /// path of the operation that owns the cursor.
    fn release(&mut self);
}

impl ReleaseCursor for Preallocated<'_> {
    fn release(&mut self) {
        // handle freed by the driver when the statement drops
    }
}

/// Scope guard tying a cursor to one logical operation. Dropping the guard
/// releases the cursor, unwinding included.
pub struct CursorGuard<C: ReleaseCursor> {
    inner: C,
}

impl<C: ReleaseCursor> CursorGuard<C> {
    /// Takes ownership of `cursor` for the remainder of the scope.
    pub fn new(cursor: C) -> Self {
        Self { inner: cursor }
    }

    /// The guarded cursor.
    pub fn get_mut(&mut self) -> &mut C {
        &mut self.inner
    }
}

impl<C: ReleaseCursor> Drop for CursorGuard<C> {
    fn drop(&mut self) {
        self.inner.release();
    }
}

/// Runs `op` against `cursor`, logging any fault with its category and
/// re-raising it unchanged. The cursor is released when the guard leaves
/// scope, regardless of the outcome.
pub fn run_scoped<C, T, F>(cursor: C, op: F) -> Result<T>
where
    C: ReleaseCursor,
    F: FnOnce(&mut C) -> Result<T>,
{
    let mut guard = CursorGuard::new(cursor);
    let result = op(guard.get_mut());
    if let Err(error) = &result {
        error!("{}: {error}", error.category());
    }
    result
}

/// Owns connection parameters and the lazily-opened connection handle.
///
/// State machine: `Unopened → Connected → Closed`. A failed self-test or an
/// explicit close moves to `Closed`; re-opening happens through
/// [`verify_connection`](Self::verify_connection) on the next use. The
/// `connected` flag is true iff a live handle exists and has not been
/// explicitly closed.
pub struct ConnectionManager {
    params: ConnectionParams,
    conn: Option<Connection<'static>>,
    connected: bool,
}

impl ConnectionManager {
    /// Creates an unopened manager for `params`.
    #[must_use]
    pub fn new(params: ConnectionParams) -> Self {
        Self {
            params,
            conn: None,
            connected: false,
        }
    }

    /// Creates an unopened manager with parameters resolved from the
    /// configuration store and `overrides`.
    ///
    /// # Errors
    ///
    /// Returns a `Configuration` error if a connection parameter cannot be
    /// resolved.
    pub fn from_config(config: &ConfigStore, overrides: &ConnectionOverrides) -> Result<Self> {
        Ok(Self::new(ConnectionParams::from_config(config, overrides)?))
    }

    /// Resolved connection parameters.
    #[must_use]
    pub fn params(&self) -> &ConnectionParams {
        &self.params
    }

    /// Whether a live connection handle is held.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Unconditionally establishes a new connection from the stored
    /// parameters.
    ///
    /// # Errors
    ///
    /// Returns a `Connection` fault if the driver rejects the parameters.
    pub fn open_connection(&mut self) -> Result<()> {
        let env = odbc_environment()?;
        let conn = env
            .connect_with_connection_string(
                &self.params.connection_string(),
                ConnectionOptions::default(),
            )
            .map_err(|e| {
                log_fault(SqlProbeError::connection(
                    format!("open connection to server '{}'", self.params.server),
                    e,
                ))
            })?;

        self.conn = Some(conn);
        self.connected = true;
        debug!(
            "connection opened: server '{}', database '{}'",
            self.params.server, self.params.database
        );
        Ok(())
    }

    /// Opens the connection if it is not already open. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns a `Connection` fault if a fresh open is needed and fails.
    pub fn verify_connection(&mut self) -> Result<bool> {
        if !self.connected {
            self.open_connection()?;
        }
        Ok(self.connected)
    }

    /// Ensures a connection and returns one fresh statement handle. The
    /// caller owns it for exactly one logical operation. Prefer
    /// [`with_cursor`](Self::with_cursor), which also guarantees the release
    /// and the fault logging.
    ///
    /// # Errors
    ///
    /// Returns a `Connection` fault if the lazy open fails, or a `Cursor`
    /// fault if the statement handle cannot be allocated.
    pub fn cursor(&mut self) -> Result<Preallocated<'_>> {
        self.verify_connection()?;
        let conn = self.live_connection()?;
        conn.preallocate()
            .map_err(|e| log_fault(SqlProbeError::cursor("allocate statement handle", e)))
    }

    /// Acquires one fresh statement handle and runs `op` against it. The
    /// handle belongs to exactly this operation and is released on every
    /// exit path; a fault inside `op` is logged with its category and
    /// propagated unchanged.
    ///
    /// # Errors
    ///
    /// Returns a `Connection` fault if the lazy open fails, a `Cursor` fault
    /// if the statement handle cannot be allocated, or whatever `op` raised.
    pub fn with_cursor<T, F>(&mut self, op: F) -> Result<T>
    where
        F: FnOnce(&mut Preallocated<'_>) -> Result<T>,
    {
        let stmt = self.cursor()?;
        run_scoped(stmt, op)
    }

    /// Runs a trivial `SELECT 1` round trip. On fault the whole connection
    /// is force-closed and marked disconnected; the next use must re-open.
    ///
    /// # Errors
    ///
    /// Propagates the underlying fault after closing the connection.
    pub fn test_connection(&mut self) -> Result<()> {
        let result = self.with_cursor(|stmt| {
            let cursor = stmt
                .execute("SELECT 1", ())
                .map_err(|e| SqlProbeError::query("connection self-test", e))?;
            if let Some(cursor) = cursor {
                collect_outcome(cursor)?;
            }
            Ok(())
        });

        match result {
            Ok(()) => {
                info!("connection test succeeded");
                Ok(())
            }
            Err(error) => {
                error!(
                    "connection test failed, closing connection: {}: {error}",
                    error.category()
                );
                self.close_connection();
                Err(error)
            }
        }
    }

    /// Executes one ad-hoc statement and fetches every row as text.
    ///
    /// # Errors
    ///
    /// Propagates driver faults from execution or fetch.
    pub fn run_query(&mut self, sql: &str) -> Result<QueryOutcome> {
        let outcome = self.with_cursor(|stmt| {
            let cursor = stmt
                .execute(sql, ())
                .map_err(|e| SqlProbeError::query("execute ad-hoc statement", e))?;
            match cursor {
                Some(cursor) => collect_outcome(cursor),
                None => Ok(QueryOutcome::default()),
            }
        })?;

        info!("query round trip succeeded ({} row(s))", outcome.row_count());
        Ok(outcome)
    }

    /// Creates a session temp table, inserts two rows, reads them back, and
    /// drops the table, all on one cursor. Returns the fetched ids.
    ///
    /// # Errors
    ///
    /// Returns a `Configuration` error for an invalid table name, or
    /// propagates driver faults.
    pub fn temp_table_round_trip(&mut self, name: &str) -> Result<Vec<String>> {
        let table = normalize_temp_name(name)?;

        let outcome = self.with_cursor(|stmt| {
            stmt.execute(&format!("DROP TABLE IF EXISTS {table};"), ())
                .map_err(|e| SqlProbeError::query("drop leftover temp table", e))?;
            stmt.execute(&format!("CREATE TABLE {table} (id VARCHAR(30));"), ())
                .map_err(|e| SqlProbeError::query("create temp table", e))?;
            stmt.execute(
                &format!(
                    "INSERT INTO {table} SELECT ('Hello Temp Table') UNION SELECT ('Still Hello');"
                ),
                (),
            )
            .map_err(|e| SqlProbeError::query("insert temp rows", e))?;

            let outcome = match stmt
                .execute(&format!("SELECT * FROM {table};"), ())
                .map_err(|e| SqlProbeError::query("select temp rows", e))?
            {
                Some(cursor) => collect_outcome(cursor)?,
                None => QueryOutcome::default(),
            };

            stmt.execute(&format!("DROP TABLE IF EXISTS {table};"), ())
                .map_err(|e| SqlProbeError::query("drop temp table", e))?;
            Ok(outcome)
        })?;

        for (index, row) in outcome.rows.iter().enumerate() {
            if let Some(Some(id)) = row.first() {
                info!("temp table row {index}: {id}");
            }
        }
        info!("temp table column names: {:?}", outcome.columns);
        info!("temp table round trip succeeded");

        Ok(outcome
            .rows
            .into_iter()
            .filter_map(|row| row.into_iter().next().flatten())
            .collect())
    }

    /// Lists tables through the driver's catalog call, optionally filtered
    /// by table name. Logs one line per result row; an empty result logs an
    /// explicit not-found line and is not a fault.
    ///
    /// # Errors
    ///
    /// Propagates driver faults from the catalog call or fetch.
    pub fn list_tables(&mut self, table: Option<&str>) -> Result<Vec<TableInfo>> {
        if table.is_none() {
            info!("no table filter provided, listing all tables");
        }

        self.verify_connection()?;
        let conn = self.live_connection()?;
        let outcome = {
            let cursor = conn
                .tables("", "", table.unwrap_or(""), "")
                .map_err(|e| log_fault(SqlProbeError::query("list tables", e)))?;
            collect_outcome(cursor).map_err(log_fault)?
        };

        let tables: Vec<TableInfo> = outcome
            .rows
            .iter()
            .map(|row| TableInfo {
                catalog: cell(row, 0),
                schema: cell(row, 1),
                name: cell(row, 2).unwrap_or_default(),
                table_type: cell(row, 3),
            })
            .collect();

        if tables.is_empty() {
            match table {
                Some(name) => info!("table '{name}' does not exist"),
                None => info!("no tables found"),
            }
        } else {
            for table_info in &tables {
                info!("table name: {}", table_info.qualified_name());
            }
        }

        Ok(tables)
    }

    /// Describes columns through the driver's catalog call, with optional
    /// catalog/schema/table/column filters. Logs every non-null field per
    /// column; an empty result logs an explicit not-found line and is not a
    /// fault.
    ///
    /// # Errors
    ///
    /// Propagates driver faults from the catalog call or fetch.
    pub fn list_columns(&mut self, filter: &ColumnFilter) -> Result<Vec<ColumnDescription>> {
        self.verify_connection()?;
        let conn = self.live_connection()?;
        let outcome = {
            let cursor = conn
                .columns(
                    filter.catalog.as_deref().unwrap_or(""),
                    filter.schema.as_deref().unwrap_or(""),
                    filter.table.as_deref().unwrap_or(""),
                    filter.column.as_deref().unwrap_or(""),
                )
                .map_err(|e| log_fault(SqlProbeError::query("list columns", e)))?;
            collect_outcome(cursor).map_err(log_fault)?
        };

        let name_index = outcome
            .columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case("column_name"))
            .unwrap_or(3);

        let mut described = Vec::new();
        for row in &outcome.rows {
            let column_name = row
                .get(name_index)
                .cloned()
                .flatten()
                .unwrap_or_default();
            let fields: Vec<MetadataField> = outcome
                .columns
                .iter()
                .zip(row.iter())
                .filter_map(|(field, value)| {
                    value.as_ref().map(|value| MetadataField {
                        name: field.clone(),
                        value: value.clone(),
                    })
                })
                .collect();
            for field in &fields {
                info!("column {column_name}: {}: {}", field.name, field.value);
            }
            described.push(ColumnDescription {
                column_name,
                fields,
            });
        }

        if described.is_empty() {
            info!("no columns found for parameters: {filter}");
        }

        Ok(described)
    }

    /// Closes the live connection if one is held. Idempotent.
    pub fn close_connection(&mut self) {
        if self.connected {
            self.conn = None;
            self.connected = false;
            debug!("connection closed");
        }
    }

    fn live_connection(&self) -> Result<&Connection<'static>> {
        self.conn
            .as_ref()
            .ok_or_else(|| SqlProbeError::configuration("no live connection handle"))
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.close_connection();
    }
}

/// Normalizes a temp table name to a single leading `#`, rejecting anything
/// that is not a plain identifier.
fn normalize_temp_name(name: &str) -> Result<String> {
    let bare = name.strip_prefix('#').unwrap_or(name);
    if bare.is_empty()
        || !bare
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(SqlProbeError::configuration(format!(
            "invalid temp table name '{name}'"
        )));
    }
    Ok(format!("#{bare}"))
}

/// Reads result-set metadata and every row of `cursor` into text cells.
fn collect_outcome(mut cursor: impl Cursor) -> Result<QueryOutcome> {
    let columns = cursor
        .column_names()
        .map_err(|e| SqlProbeError::query("read result-set metadata", e))?
        .collect::<std::result::Result<Vec<String>, _>>()
        .map_err(|e| SqlProbeError::query("read column names", e))?;

    let mut buffers = TextRowSet::for_cursor(BATCH_SIZE, &mut cursor, Some(MAX_TEXT_SIZE))
        .map_err(|e| SqlProbeError::query("allocate fetch buffers", e))?;
    let mut block_cursor = cursor
        .bind_buffer(&mut buffers)
        .map_err(|e| SqlProbeError::query("bind fetch buffers", e))?;

    let mut rows = Vec::new();
    while let Some(batch) = block_cursor
        .fetch()
        .map_err(|e| SqlProbeError::query("fetch rows", e))?
    {
        for row_index in 0..batch.num_rows() {
            let row = (0..batch.num_cols())
                .map(|col| {
                    batch
                        .at(col, row_index)
                        .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
                })
                .collect();
            rows.push(row);
        }
    }

    Ok(QueryOutcome { columns, rows })
}

/// Clones one text cell out of a row, `None` when the cell is NULL or the
/// row is shorter than expected.
fn cell(row: &[Option<String>], index: usize) -> Option<String> {
    row.get(index).cloned().flatten()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{AssertUnwindSafe, catch_unwind};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Cursor stand-in counting how often it is released.
    struct MockCursor {
        releases: Arc<AtomicU32>,
    }

    impl ReleaseCursor for MockCursor {
        fn release(&mut self) {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn mock() -> (MockCursor, Arc<AtomicU32>) {
        let releases = Arc::new(AtomicU32::new(0));
        (
            MockCursor {
                releases: Arc::clone(&releases),
            },
            releases,
        )
    }

    #[test]
    fn test_scoped_cursor_released_once_on_success() {
        let (cursor, releases) = mock();
        let result = run_scoped(cursor, |_| Ok(42));
        assert_eq!(result.unwrap(), 42);
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_scoped_cursor_released_once_on_fault() {
        let (cursor, releases) = mock();
        let result: Result<()> = run_scoped(cursor, |_| {
            Err(SqlProbeError::configuration("mid-operation fault"))
        });
        assert!(result.is_err());
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_scoped_cursor_released_once_on_panic() {
        let (cursor, releases) = mock();
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            let _: Result<()> = run_scoped(cursor, |_| panic!("mid-operation panic"));
        }));
        assert!(outcome.is_err());
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_connection_string_shape() {
        let params = ConnectionParams {
            server: "localhost".to_string(),
            database: "AdventureWorks2022".to_string(),
            trusted_connection: "yes".to_string(),
        };
        assert_eq!(
            params.connection_string(),
            "DRIVER=ODBC Driver 17 for SQL Server;SERVER=localhost;\
             DATABASE=AdventureWorks2022;Trusted_Connection=yes"
        );
        assert!(!params.connection_string().contains("PWD"));
        assert!(!params.connection_string().contains("UID"));
    }

    #[test]
    fn test_params_resolution_prefers_overrides() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.ini");
        std::fs::write(
            &path,
            "[DEFAULT]\nserver = configured\ndatabase = master\ntrusted_connection = yes\n",
        )
        .unwrap();
        let config = ConfigStore::load(&path).unwrap();

        let overrides = ConnectionOverrides {
            server: Some("overridden".to_string()),
            ..Default::default()
        };
        let params = ConnectionParams::from_config(&config, &overrides).unwrap();
        assert_eq!(params.server, "overridden");
        assert_eq!(params.database, "master");
        assert_eq!(params.trusted_connection, "yes");
    }

    #[test]
    fn test_params_resolution_faults_on_missing_parameter() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.ini");
        std::fs::write(&path, "[DEFAULT]\nserver = localhost\n").unwrap();
        let config = ConfigStore::load(&path).unwrap();

        let err =
            ConnectionParams::from_config(&config, &ConnectionOverrides::default()).unwrap_err();
        assert_eq!(err.category(), "Configuration");
        assert!(err.to_string().contains("database"));
    }

    #[test]
    fn test_manager_starts_unopened_and_close_is_idempotent() {
        let params = ConnectionParams {
            server: "localhost".to_string(),
            database: "master".to_string(),
            trusted_connection: "yes".to_string(),
        };
        let mut manager = ConnectionManager::new(params);
        assert!(!manager.is_connected());

        manager.close_connection();
        manager.close_connection();
        assert!(!manager.is_connected());
    }

    #[test]
    fn test_temp_name_normalization() {
        assert_eq!(normalize_temp_name("HelloTable").unwrap(), "#HelloTable");
        assert_eq!(normalize_temp_name("#HelloTable").unwrap(), "#HelloTable");
        assert_eq!(normalize_temp_name("hello_1").unwrap(), "#hello_1");

        assert!(normalize_temp_name("").is_err());
        assert!(normalize_temp_name("#").is_err());
        assert!(normalize_temp_name("bad name").is_err());
        assert!(normalize_temp_name("drop;--").is_err());
    }

    #[test]
    fn test_cell_tolerates_short_rows() {
        let row = vec![Some("a".to_string()), None];
        assert_eq!(cell(&row, 0).as_deref(), Some("a"));
        assert_eq!(cell(&row, 1), None);
        assert_eq!(cell(&row, 9), None);
    }
}
