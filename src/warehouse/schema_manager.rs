//! Creation, reset and validation of the warehouse tables.
//!
//! `reset_schema` is the clean-slate entry point used by manual runs;
//! `ensure_schema` is what the scheduled pipeline calls, and never drops a
//! schema that already has its fact table.

use super::schema::{SONGPLAYS, WAREHOUSE_SCHEMA};
use anyhow::{Context, Result};
use rusqlite::Connection;
use serde::Serialize;
use tracing::info;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaAction {
    Created,
    AlreadyPresent,
}

/// Drop every warehouse table (if present) and recreate all of them empty.
///
/// Runs as a single transaction: on failure nothing is dropped.
pub fn reset_schema(conn: &mut Connection) -> Result<()> {
    let tx = conn.transaction()?;
    WAREHOUSE_SCHEMA
        .drop_all(&tx)
        .context("Failed to drop warehouse tables")?;
    WAREHOUSE_SCHEMA
        .create(&tx)
        .context("Failed to create warehouse tables")?;
    tx.commit()?;
    info!(
        "Warehouse schema reset: {} tables created",
        WAREHOUSE_SCHEMA.tables.len()
    );
    Ok(())
}

/// Create the schema only when the fact table is missing.
///
/// Partial leftovers (dimension tables without a fact table) are dropped
/// before the create sequence.
pub fn ensure_schema(conn: &mut Connection) -> Result<SchemaAction> {
    if fact_table_exists(conn)? {
        info!("Tables already exist, skipping creation");
        return Ok(SchemaAction::AlreadyPresent);
    }
    reset_schema(conn)?;
    Ok(SchemaAction::Created)
}

pub fn fact_table_exists(conn: &Connection) -> Result<bool> {
    let table = WAREHOUSE_SCHEMA
        .table(SONGPLAYS)
        .context("Fact table missing from schema declaration")?;
    table.exists(conn)
}

/// Compare the live tables with the declared ones and report the first mismatch.
pub fn validate_schema(conn: &Connection) -> Result<()> {
    WAREHOUSE_SCHEMA
        .validate(conn)
        .context("Warehouse schema does not match its declaration")
}
