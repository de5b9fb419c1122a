//! SQLite schema definitions for the Sparkify star schema.
//!
//! Four dimension tables (`users`, `songs`, `artists`, `time`) and one fact
//! table (`songplays`). Table and column names are part of the public surface:
//! the dashboard introspects them by name.

use crate::sqlite_column;
use crate::sqlite_persistence::{ForeignKey, ForeignKeyOnChange, SqlType, Table, VersionedSchema};

pub const SONGPLAYS: &str = "songplays";
pub const USERS: &str = "users";
pub const SONGS: &str = "songs";
pub const ARTISTS: &str = "artists";
pub const TIME: &str = "time";

// =============================================================================
// Dimension Tables
// =============================================================================

const ARTISTS_TABLE: Table = Table {
    name: ARTISTS,
    columns: &[
        sqlite_column!(
            "artist_id",
            &SqlType::Text,
            is_primary_key = true,
            non_null = true
        ),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!("location", &SqlType::Text),
        sqlite_column!("latitude", &SqlType::Real),
        sqlite_column!("longitude", &SqlType::Real),
    ],
    indices: &[("idx_artists_name", "name")],
};

/// `artist_id` is intentionally not a foreign key: catalog coverage of
/// artists is not guaranteed to be complete.
const SONGS_TABLE: Table = Table {
    name: SONGS,
    columns: &[
        sqlite_column!(
            "song_id",
            &SqlType::Text,
            is_primary_key = true,
            non_null = true
        ),
        sqlite_column!("title", &SqlType::Text, non_null = true),
        sqlite_column!("artist_id", &SqlType::Text, non_null = true),
        sqlite_column!("year", &SqlType::Integer),
        sqlite_column!("duration", &SqlType::Real),
    ],
    indices: &[
        ("idx_songs_title", "title"),
        ("idx_songs_artist", "artist_id"),
    ],
};

const USERS_TABLE: Table = Table {
    name: USERS,
    columns: &[
        sqlite_column!(
            "user_id",
            &SqlType::Integer,
            is_primary_key = true,
            non_null = true
        ),
        sqlite_column!("first_name", &SqlType::Text),
        sqlite_column!("last_name", &SqlType::Text),
        sqlite_column!("gender", &SqlType::Text),
        sqlite_column!("level", &SqlType::Text, non_null = true),
    ],
    indices: &[],
};

const TIME_TABLE: Table = Table {
    name: TIME,
    columns: &[
        sqlite_column!(
            "start_time",
            &SqlType::Text,
            is_primary_key = true,
            non_null = true
        ),
        sqlite_column!("hour", &SqlType::Integer, non_null = true),
        sqlite_column!("day", &SqlType::Integer, non_null = true),
        sqlite_column!("week", &SqlType::Integer, non_null = true),
        sqlite_column!("month", &SqlType::Integer, non_null = true),
        sqlite_column!("year", &SqlType::Integer, non_null = true),
        sqlite_column!("weekday", &SqlType::Integer, non_null = true),
    ],
    indices: &[],
};

// =============================================================================
// Fact Table
// =============================================================================

const TIME_FK: ForeignKey = ForeignKey {
    foreign_table: TIME,
    foreign_column: "start_time",
    on_delete: ForeignKeyOnChange::NoAction,
};

const USER_FK: ForeignKey = ForeignKey {
    foreign_table: USERS,
    foreign_column: "user_id",
    on_delete: ForeignKeyOnChange::NoAction,
};

const SONG_FK: ForeignKey = ForeignKey {
    foreign_table: SONGS,
    foreign_column: "song_id",
    on_delete: ForeignKeyOnChange::SetNull,
};

const ARTIST_FK: ForeignKey = ForeignKey {
    foreign_table: ARTISTS,
    foreign_column: "artist_id",
    on_delete: ForeignKeyOnChange::SetNull,
};

/// Append-only; there is no natural key, so reprocessing the same log file
/// without a reset appends duplicate rows.
const SONGPLAYS_TABLE: Table = Table {
    name: SONGPLAYS,
    columns: &[
        sqlite_column!(
            "start_time",
            &SqlType::Text,
            non_null = true,
            foreign_key = Some(&TIME_FK)
        ),
        sqlite_column!(
            "user_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&USER_FK)
        ),
        sqlite_column!("level", &SqlType::Text, non_null = true),
        sqlite_column!("song_id", &SqlType::Text, foreign_key = Some(&SONG_FK)),
        sqlite_column!(
            "artist_id",
            &SqlType::Text,
            foreign_key = Some(&ARTIST_FK)
        ),
        sqlite_column!("session_id", &SqlType::Integer, non_null = true),
        sqlite_column!("location", &SqlType::Text),
        sqlite_column!("user_agent", &SqlType::Text),
    ],
    indices: &[
        ("idx_songplays_start_time", "start_time"),
        ("idx_songplays_user", "user_id"),
    ],
};

// =============================================================================
// Versioned Schema Definition
// =============================================================================

pub const WAREHOUSE_SCHEMA: VersionedSchema = VersionedSchema {
    version: 0,
    tables: &[
        ARTISTS_TABLE,
        SONGS_TABLE,
        USERS_TABLE,
        TIME_TABLE,
        SONGPLAYS_TABLE,
    ],
};

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::{params, Connection};

    #[test]
    fn test_schema_creates_successfully() {
        let conn = Connection::open_in_memory().unwrap();
        WAREHOUSE_SCHEMA.create(&conn).unwrap();
        WAREHOUSE_SCHEMA.validate(&conn).unwrap();
    }

    #[test]
    fn test_table_names() {
        let names: Vec<&str> = WAREHOUSE_SCHEMA.tables.iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["artists", "songs", "users", "time", "songplays"]);
    }

    #[test]
    fn test_songplay_accepts_null_song_reference() {
        let conn = Connection::open_in_memory().unwrap();
        WAREHOUSE_SCHEMA.create(&conn).unwrap();

        conn.execute(
            "INSERT INTO time VALUES ('2018-11-02 01:25:34.796', 1, 2, 44, 11, 2018, 4)",
            [],
        )
        .unwrap();
        conn.execute("INSERT INTO users VALUES (10, 'A', 'B', 'F', 'free')", [])
            .unwrap();
        conn.execute(
            "INSERT INTO songplays VALUES (?1, 10, 'free', NULL, NULL, 7, NULL, NULL)",
            params!["2018-11-02 01:25:34.796"],
        )
        .unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM songplays", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_songplay_rejects_unknown_user() {
        let conn = Connection::open_in_memory().unwrap();
        WAREHOUSE_SCHEMA.create(&conn).unwrap();

        conn.execute(
            "INSERT INTO time VALUES ('2018-11-02 01:25:34.796', 1, 2, 44, 11, 2018, 4)",
            [],
        )
        .unwrap();
        let result = conn.execute(
            "INSERT INTO songplays VALUES ('2018-11-02 01:25:34.796', 99, 'free', NULL, NULL, 7, NULL, NULL)",
            [],
        );
        assert!(result.is_err());
    }
}
