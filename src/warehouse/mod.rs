mod models;
mod reader;
mod schema;
mod schema_manager;
mod store;

pub use models::*;
pub use reader::{ColumnInfo, TablePage, WarehouseReader};
pub use schema::{ARTISTS, SONGPLAYS, SONGS, TIME, USERS, WAREHOUSE_SCHEMA};
pub use schema_manager::{
    ensure_schema, fact_table_exists, reset_schema, validate_schema, SchemaAction,
};
pub use store::{
    find_song_reference, insert_songplay, table_counts, upsert_artist, upsert_song, upsert_time,
    upsert_user, SqliteWarehouse, TableCounts,
};
