//! Named pipeline operations over the warehouse.
//!
//! These are the units the CLI, the task runner and the scheduler invoke.
//! Each opens its own connection, runs to completion on the calling thread
//! and reports progress through a [`Progress`] sink.

use super::catalog::process_song_file;
use super::error::EtlError;
use super::events::process_log_file;
use super::progress::Progress;
use super::walker::walk;
use crate::warehouse::{
    ensure_schema, reset_schema, validate_schema, SchemaAction, SqliteWarehouse, TableCounts,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::info;

/// Where an ETL invocation reads from and writes to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EtlSettings {
    pub db_path: PathBuf,
    pub song_data: PathBuf,
    pub log_data: PathBuf,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct EtlReport {
    pub song_files: usize,
    pub log_files: usize,
    pub catalog_records: usize,
    pub events: usize,
    pub songplays: usize,
    pub resolved_songplays: usize,
    pub counts: TableCounts,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Drop and recreate every table.
    CreateTables,
    /// Load both data trees into an existing schema.
    Etl,
    /// `CreateTables` followed by `Etl`.
    ResetAndLoad,
    /// Create the schema if missing, then load. Never drops data.
    Pipeline,
}

impl Operation {
    pub const ALL: [Operation; 4] = [
        Operation::CreateTables,
        Operation::Etl,
        Operation::ResetAndLoad,
        Operation::Pipeline,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Operation::CreateTables => "create_tables",
            Operation::Etl => "etl",
            Operation::ResetAndLoad => "reset_and_load",
            Operation::Pipeline => "pipeline",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operation::ALL
            .into_iter()
            .find(|op| op.name() == s)
            .ok_or_else(|| format!("Unknown operation '{}'", s))
    }
}

/// What an operation did. `report` is absent for schema-only operations.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct OperationOutcome {
    pub schema: Option<SchemaAction>,
    pub report: Option<EtlReport>,
}

pub fn open_warehouse(db_path: &Path) -> Result<SqliteWarehouse, EtlError> {
    SqliteWarehouse::open(db_path).map_err(|source| EtlError::Connection {
        path: db_path.to_path_buf(),
        source,
    })
}

pub fn create_tables(warehouse: &mut SqliteWarehouse) -> Result<SchemaAction, EtlError> {
    reset_schema(warehouse.connection_mut()).map_err(EtlError::Schema)?;
    Ok(SchemaAction::Created)
}

pub fn ensure_tables(warehouse: &mut SqliteWarehouse) -> Result<SchemaAction, EtlError> {
    ensure_schema(warehouse.connection_mut()).map_err(EtlError::Schema)
}

/// Load the catalog tree, then the event tree.
///
/// The schema is validated first so that nothing is written into a store
/// whose tables do not match the declared ones.
pub fn run_etl(
    warehouse: &mut SqliteWarehouse,
    song_data: &Path,
    log_data: &Path,
    progress: &Progress,
) -> Result<EtlReport, EtlError> {
    validate_schema(warehouse.connection()).map_err(EtlError::Schema)?;

    progress.report(format!("Loading song data from {}", song_data.display()));
    let songs = walk(
        warehouse.connection_mut(),
        song_data,
        progress,
        process_song_file,
    )?;
    progress.report(format!("Loading log data from {}", log_data.display()));
    let logs = walk(warehouse.connection_mut(), log_data, progress, process_log_file)?;

    let counts = warehouse.counts().map_err(EtlError::Schema)?;
    let report = EtlReport {
        song_files: songs.files,
        log_files: logs.files,
        catalog_records: songs.stats.records,
        events: logs.stats.records,
        songplays: logs.stats.songplays,
        resolved_songplays: logs.stats.resolved,
        counts,
    };
    info!(
        "ETL finished: {} song files, {} log files, {} songplays ({} resolved)",
        report.song_files, report.log_files, report.songplays, report.resolved_songplays
    );
    Ok(report)
}

/// Run a named operation against the configured warehouse.
pub fn execute(
    operation: Operation,
    settings: &EtlSettings,
    progress: &Progress,
) -> Result<OperationOutcome, EtlError> {
    info!("Running operation {}", operation);
    let mut warehouse = open_warehouse(&settings.db_path)?;
    let load = |warehouse: &mut SqliteWarehouse| {
        run_etl(warehouse, &settings.song_data, &settings.log_data, progress)
    };

    let outcome = match operation {
        Operation::CreateTables => OperationOutcome {
            schema: Some(create_tables(&mut warehouse)?),
            report: None,
        },
        Operation::Etl => OperationOutcome {
            schema: None,
            report: Some(load(&mut warehouse)?),
        },
        Operation::ResetAndLoad => {
            let schema = create_tables(&mut warehouse)?;
            progress.report("Tables created");
            OperationOutcome {
                schema: Some(schema),
                report: Some(load(&mut warehouse)?),
            }
        }
        Operation::Pipeline => {
            let schema = ensure_tables(&mut warehouse)?;
            progress.report(match schema {
                SchemaAction::Created => "Tables created",
                SchemaAction::AlreadyPresent => "Tables already exist",
            });
            OperationOutcome {
                schema: Some(schema),
                report: Some(load(&mut warehouse)?),
            }
        }
    };
    Ok(outcome)
}

/// Validate the live schema and return the current row counts.
pub fn check_schema(db_path: &Path) -> Result<TableCounts, EtlError> {
    let warehouse = open_warehouse(db_path)?;
    validate_schema(warehouse.connection()).map_err(EtlError::Schema)?;
    warehouse.counts().map_err(EtlError::Schema)
}
