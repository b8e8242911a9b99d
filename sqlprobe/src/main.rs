//! ODBC connection diagnostics tool.
//!
//! Opens a trusted (integrated-auth) connection to a SQL Server through the
//! ODBC driver manager and runs one diagnostic per invocation: a
//! connectivity self-test, an ad-hoc query, driver metadata listings, or a
//! temp-table round trip. Connection parameters come from an INI
//! configuration file, overridable per flag or environment variable.

use std::path::PathBuf;

use anyhow::bail;
use clap::{Parser, Subcommand};
use tracing::{debug, info};

use sqlprobe::connection::{ConnectionManager, ConnectionOverrides};
use sqlprobe_core::models::ColumnFilter;
use sqlprobe_core::{ConfigStore, config, init_root_logger, logger_initialized, scripts};

#[derive(Parser)]
#[command(name = "sqlprobe")]
#[command(about = "ODBC connection diagnostics for SQL Server")]
#[command(version)]
#[command(long_about = "
sqlprobe - ODBC connection diagnostics for SQL Server

Opens a trusted connection through the ODBC driver manager and runs a single
diagnostic per invocation. Connection parameters are read from the DEFAULT
section of an INI configuration file (created with fixed defaults when
missing) and can be overridden per flag.

Only integrated authentication is supported: the assembled connection string
never carries a username or password.

EXAMPLES:
  sqlprobe test
  sqlprobe --server localhost query 'SELECT 1'
  sqlprobe tables Person
  sqlprobe columns --catalog AdventureWorks2022 --schema Person --table Person
  sqlprobe temp-table HelloTable
")]
struct Cli {
    /// Configuration file path
    #[arg(
        long,
        default_value = "config.ini",
        help = "INI configuration file (created with defaults if missing)"
    )]
    config: PathBuf,

    /// Server override
    #[arg(long, env = "SQLPROBE_SERVER", help = "Override the configured server")]
    server: Option<String>,

    /// Database override
    #[arg(
        long,
        env = "SQLPROBE_DATABASE",
        help = "Override the configured database"
    )]
    database: Option<String>,

    /// Trusted-connection flag override
    #[arg(
        long,
        env = "SQLPROBE_TRUSTED_CONNECTION",
        help = "Override the configured trusted-connection flag (yes/no)"
    )]
    trusted_connection: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Open a connection and run a SELECT 1 round trip
    Test,
    /// Execute one ad-hoc statement and print the fetched rows
    Query {
        /// Statement text (omit when reading from --file)
        sql: Option<String>,
        /// Read the statement from a .sql file instead
        #[arg(long, conflicts_with = "sql")]
        file: Option<PathBuf>,
    },
    /// List tables visible to the driver, optionally filtered by name
    Tables {
        /// Table name filter
        table: Option<String>,
    },
    /// Describe columns through driver metadata, with optional filters
    Columns {
        /// Catalog filter
        #[arg(long)]
        catalog: Option<String>,
        /// Schema filter
        #[arg(long)]
        schema: Option<String>,
        /// Table name filter
        #[arg(long)]
        table: Option<String>,
        /// Column name filter
        #[arg(long)]
        column: Option<String>,
    },
    /// Create, fill, read back, and drop a session temp table
    TempTable {
        /// Temp table name; a leading '#' is added when missing
        #[arg(default_value = "HelloTable")]
        name: String,
    },
    /// List .sql scripts under the scripts folder
    Scripts {
        /// Folder to search instead of ./scripts
        path: Option<PathBuf>,
    },
    /// Rewrite the configuration file with fixed defaults
    ResetConfig,
}

fn main() -> anyhow::Result<()> {
    init_root_logger()?;
    let cli = Cli::parse();
    debug!("logger initialized: {}", logger_initialized());

    match &cli.command {
        Command::Test => {
            let mut manager = manager_from(&cli)?;
            manager.test_connection()?;
            println!("Connection to server '{}' successful", manager.params().server);
        }
        Command::Query { sql, file } => {
            let statement = match (sql, file) {
                (Some(sql), None) => sql.clone(),
                (None, Some(path)) => scripts::read_script(path)?,
                _ => bail!("provide a statement or --file <script.sql>"),
            };
            let mut manager = manager_from(&cli)?;
            let outcome = manager.run_query(&statement)?;
            print_rows(&outcome.columns, &outcome.rows);
            println!("{} row(s)", outcome.row_count());
        }
        Command::Tables { table } => {
            let mut manager = manager_from(&cli)?;
            let tables = manager.list_tables(table.as_deref())?;
            for table_info in &tables {
                println!("{}", table_info.qualified_name());
            }
            println!("{} table(s)", tables.len());
        }
        Command::Columns {
            catalog,
            schema,
            table,
            column,
        } => {
            let filter = ColumnFilter {
                catalog: catalog.clone(),
                schema: schema.clone(),
                table: table.clone(),
                column: column.clone(),
            };
            let mut manager = manager_from(&cli)?;
            let described = manager.list_columns(&filter)?;
            for description in &described {
                println!("{}:", description.column_name);
                for field in &description.fields {
                    println!("  {} = {}", field.name, field.value);
                }
            }
            println!("{} column(s)", described.len());
        }
        Command::TempTable { name } => {
            let mut manager = manager_from(&cli)?;
            let ids = manager.temp_table_round_trip(name)?;
            for id in &ids {
                println!("{id}");
            }
            println!("temp table round trip completed ({} row(s))", ids.len());
        }
        Command::Scripts { path } => {
            let located = scripts::locate_scripts(path.as_deref())?;
            for name in scripts::script_names(&located) {
                println!("{name}");
            }
            println!("{} script(s)", located.len());
        }
        Command::ResetConfig => {
            config::reset_defaults(&cli.config)?;
            info!("configuration reset to defaults");
            println!("Wrote default configuration to {}", cli.config.display());
        }
    }

    Ok(())
}

/// Loads configuration and builds an unopened manager with the CLI
/// overrides applied.
fn manager_from(cli: &Cli) -> anyhow::Result<ConnectionManager> {
    let store = ConfigStore::load(&cli.config)?;
    let overrides = ConnectionOverrides {
        server: cli.server.clone(),
        database: cli.database.clone(),
        trusted_connection: cli.trusted_connection.clone(),
    };
    Ok(ConnectionManager::from_config(&store, &overrides)?)
}

/// Prints a fetched result set, rendering NULL cells explicitly.
fn print_rows(columns: &[String], rows: &[Vec<Option<String>>]) {
    if !columns.is_empty() {
        println!("{}", columns.join(" | "));
    }
    for row in rows {
        let line: Vec<String> = row
            .iter()
            .map(|value| value.clone().unwrap_or_else(|| "NULL".to_string()))
            .collect();
        println!("{}", line.join(" | "));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_declaration_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_parses_overrides_and_subcommand() {
        let cli = Cli::try_parse_from([
            "sqlprobe",
            "--server",
            "localhost",
            "--database",
            "master",
            "columns",
            "--table",
            "Person",
            "--column",
            "Banana",
        ])
        .unwrap();

        assert_eq!(cli.server.as_deref(), Some("localhost"));
        assert_eq!(cli.database.as_deref(), Some("master"));
        match cli.command {
            Command::Columns { table, column, .. } => {
                assert_eq!(table.as_deref(), Some("Person"));
                assert_eq!(column.as_deref(), Some("Banana"));
            }
            _ => unreachable!("expected columns subcommand"),
        }
    }
}
