//! Read-only access to the warehouse for the dashboard.
//!
//! Table names arriving from HTTP are only ever interpolated into SQL after
//! they have been matched against the live table list.

use super::schema::{ARTISTS, SONGPLAYS, SONGS, TIME, USERS};
use anyhow::{Context, Result};
use rusqlite::{params, types::ValueRef, Connection, OpenFlags};
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub sql_type: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct TablePage {
    pub columns: Vec<ColumnInfo>,
    pub data: Vec<Map<String, JsonValue>>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
    pub pages: i64,
}

pub struct WarehouseReader {
    db_path: PathBuf,
    conn: Mutex<Option<Connection>>,
}

impl WarehouseReader {
    /// The database file may not exist yet; the connection is opened lazily
    /// on first use and reused afterwards.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Self {
        WarehouseReader {
            db_path: db_path.as_ref().to_path_buf(),
            conn: Mutex::new(None),
        }
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let mut guard = self
            .conn
            .lock()
            .map_err(|_| anyhow::anyhow!("Warehouse reader lock poisoned"))?;
        let conn = match guard.take() {
            Some(conn) => conn,
            None => Connection::open_with_flags(
                &self.db_path,
                OpenFlags::SQLITE_OPEN_READ_ONLY
                    | OpenFlags::SQLITE_OPEN_URI
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )
            .with_context(|| format!("Database connection failed: {:?}", self.db_path))?,
        };
        f(guard.insert(conn))
    }

    pub fn list_tables(&self) -> Result<Vec<String>> {
        self.with_conn(list_tables)
    }

    /// Returns `None` when `table_name` is not a table of the database.
    pub fn table_page(&self, table_name: &str, page: u32, per_page: u32) -> Result<Option<TablePage>> {
        self.with_conn(|conn| {
            if !list_tables(conn)?.iter().any(|t| t == table_name) {
                return Ok(None);
            }
            read_table_page(conn, table_name, page, per_page).map(Some)
        })
    }

    /// Row count per warehouse table; a missing table counts as 0.
    pub fn stats(&self) -> Result<BTreeMap<String, i64>> {
        self.with_conn(|conn| {
            let existing = list_tables(conn)?;
            let mut stats = BTreeMap::new();
            for table in [SONGPLAYS, USERS, SONGS, ARTISTS, TIME] {
                let count = if existing.iter().any(|t| t == table) {
                    conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| {
                        r.get(0)
                    })?
                } else {
                    0
                };
                stats.insert(table.to_string(), count);
            }
            Ok(stats)
        })
    }
}

fn list_tables(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )?;
    let tables = stmt
        .query_map([], |r| r.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(tables)
}

fn table_columns(conn: &Connection, table_name: &str) -> Result<Vec<ColumnInfo>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table_name))?;
    let columns = stmt
        .query_map([], |r| {
            Ok(ColumnInfo {
                name: r.get(1)?,
                sql_type: r.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(columns)
}

/// Cell values are rendered as strings, except NULL which stays null.
fn cell_to_json(value: ValueRef<'_>) -> JsonValue {
    match value {
        ValueRef::Null => JsonValue::Null,
        ValueRef::Integer(i) => JsonValue::String(i.to_string()),
        ValueRef::Real(f) => JsonValue::String(f.to_string()),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            JsonValue::String(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

fn read_table_page(conn: &Connection, table_name: &str, page: u32, per_page: u32) -> Result<TablePage> {
    let columns = table_columns(conn, table_name)?;
    let total: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table_name), [], |r| {
        r.get(0)
    })?;
    let offset = (page as i64 - 1) * per_page as i64;

    let mut stmt = conn.prepare(&format!(
        "SELECT * FROM {} ORDER BY rowid LIMIT ?1 OFFSET ?2",
        table_name
    ))?;
    let mut rows = stmt.query(params![per_page, offset])?;
    let mut data = Vec::new();
    while let Some(row) = rows.next()? {
        let mut record = Map::new();
        for (index, column) in columns.iter().enumerate() {
            record.insert(column.name.clone(), cell_to_json(row.get_ref(index)?));
        }
        data.push(record);
    }

    let per_page_i64 = per_page as i64;
    Ok(TablePage {
        columns,
        data,
        total,
        page,
        per_page,
        pages: (total + per_page_i64 - 1) / per_page_i64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warehouse::schema_manager::reset_schema;
    use crate::warehouse::store::SqliteWarehouse;
    use tempfile::TempDir;

    fn seeded_reader(users: i64) -> (TempDir, WarehouseReader) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("warehouse.db");
        let mut warehouse = SqliteWarehouse::open(&path).unwrap();
        reset_schema(warehouse.connection_mut()).unwrap();
        for id in 1..=users {
            warehouse
                .connection()
                .execute(
                    "INSERT INTO users VALUES (?1, 'First', NULL, 'M', 'free')",
                    params![id],
                )
                .unwrap();
        }
        (dir, WarehouseReader::new(&path))
    }

    #[test]
    fn test_list_tables_sorted() {
        let (_dir, reader) = seeded_reader(0);
        assert_eq!(
            reader.list_tables().unwrap(),
            vec!["artists", "songplays", "songs", "time", "users"]
        );
    }

    #[test]
    fn test_table_page_paginates_and_stringifies() {
        let (_dir, reader) = seeded_reader(5);
        let page = reader.table_page("users", 2, 2).unwrap().unwrap();

        assert_eq!(page.total, 5);
        assert_eq!(page.pages, 3);
        assert_eq!(page.data.len(), 2);
        assert_eq!(page.columns[0].name, "user_id");
        assert_eq!(page.columns[0].sql_type, "INTEGER");
        assert_eq!(page.data[0]["user_id"], JsonValue::String("3".to_string()));
        assert_eq!(page.data[0]["last_name"], JsonValue::Null);
    }

    #[test]
    fn test_table_page_unknown_table() {
        let (_dir, reader) = seeded_reader(0);
        assert!(reader
            .table_page("users; DROP TABLE users", 1, 10)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_stats_on_missing_tables() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.db");
        SqliteWarehouse::open(&path).unwrap();

        let stats = WarehouseReader::new(&path).stats().unwrap();
        assert_eq!(stats.len(), 5);
        assert!(stats.values().all(|count| *count == 0));
    }

    #[test]
    fn test_reader_fails_without_database() {
        let dir = TempDir::new().unwrap();
        let reader = WarehouseReader::new(dir.path().join("missing.db"));
        assert!(reader.list_tables().is_err());
    }
}
