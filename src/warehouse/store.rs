//! Write side of the warehouse: the single connection the ETL runs on and the
//! row-level statements the extractors issue through it.
//!
//! Dimension writes are `INSERT ... ON CONFLICT DO UPDATE`: one conditional
//! statement per row, never delete-and-insert (which would trip the foreign
//! keys `songplays` holds on the dimensions).

use super::models::{Artist, Song, SongReference, Songplay, TimeRow, User};
use super::schema::{ARTISTS, SONGPLAYS, SONGS, TIME, USERS};
use anyhow::{Context, Result};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Row counts of the five warehouse tables.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TableCounts {
    pub songplays: i64,
    pub users: i64,
    pub songs: i64,
    pub artists: i64,
    pub time: i64,
}

/// Owner of the one read-write connection an ETL invocation uses.
pub struct SqliteWarehouse {
    conn: Connection,
    path: Option<PathBuf>,
}

impl SqliteWarehouse {
    /// Open (creating if needed) the warehouse database file.
    ///
    /// The parent directory is created when missing, which is the embedded
    /// equivalent of creating the target database on a server.
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create database directory {:?}", parent)
                })?;
                info!("Created database directory {:?}", parent);
            }
        }

        let conn = Connection::open_with_flags(
            db_path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("Failed to open warehouse database {:?}", db_path))?;
        Self::configure(&conn)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        info!("Opened warehouse database at {:?}", db_path);
        Ok(SqliteWarehouse {
            conn,
            path: Some(db_path.to_path_buf()),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::configure(&conn)?;
        Ok(SqliteWarehouse { conn, path: None })
    }

    fn configure(conn: &Connection) -> Result<()> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(())
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    pub fn counts(&self) -> Result<TableCounts> {
        table_counts(&self.conn)
    }
}

pub fn table_counts(conn: &Connection) -> Result<TableCounts> {
    let count = |table: &str| -> Result<i64> {
        conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| {
            r.get(0)
        })
        .with_context(|| format!("Failed to count rows of {}", table))
    };
    Ok(TableCounts {
        songplays: count(SONGPLAYS)?,
        users: count(USERS)?,
        songs: count(SONGS)?,
        artists: count(ARTISTS)?,
        time: count(TIME)?,
    })
}

// =============================================================================
// Dimension Upserts
// =============================================================================

pub fn upsert_artist(conn: &Connection, artist: &Artist) -> rusqlite::Result<()> {
    conn.prepare_cached(
        "INSERT INTO artists (artist_id, name, location, latitude, longitude)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(artist_id) DO UPDATE SET
            name = excluded.name,
            location = excluded.location,
            latitude = excluded.latitude,
            longitude = excluded.longitude",
    )?
    .execute(params![
        &artist.artist_id,
        &artist.name,
        &artist.location,
        artist.latitude,
        artist.longitude
    ])?;
    Ok(())
}

pub fn upsert_song(conn: &Connection, song: &Song) -> rusqlite::Result<()> {
    conn.prepare_cached(
        "INSERT INTO songs (song_id, title, artist_id, year, duration)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(song_id) DO UPDATE SET
            title = excluded.title,
            artist_id = excluded.artist_id,
            year = excluded.year,
            duration = excluded.duration",
    )?
    .execute(params![
        &song.song_id,
        &song.title,
        &song.artist_id,
        song.year,
        song.duration
    ])?;
    Ok(())
}

/// Last write wins: a later event for the same user overwrites the stored level.
pub fn upsert_user(conn: &Connection, user: &User) -> rusqlite::Result<()> {
    conn.prepare_cached(
        "INSERT INTO users (user_id, first_name, last_name, gender, level)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(user_id) DO UPDATE SET
            first_name = excluded.first_name,
            last_name = excluded.last_name,
            gender = excluded.gender,
            level = excluded.level",
    )?
    .execute(params![
        user.user_id,
        &user.first_name,
        &user.last_name,
        &user.gender,
        &user.level
    ])?;
    Ok(())
}

pub fn upsert_time(conn: &Connection, time: &TimeRow) -> rusqlite::Result<()> {
    conn.prepare_cached(
        "INSERT INTO time (start_time, hour, day, week, month, year, weekday)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(start_time) DO UPDATE SET
            hour = excluded.hour,
            day = excluded.day,
            week = excluded.week,
            month = excluded.month,
            year = excluded.year,
            weekday = excluded.weekday",
    )?
    .execute(params![
        &time.start_time,
        time.hour,
        time.day,
        time.week,
        time.month,
        time.year,
        time.weekday
    ])?;
    Ok(())
}

// =============================================================================
// Reference Lookup
// =============================================================================

/// Exact-match lookup of the (song, artist) pair a play refers to.
///
/// Title, artist name and duration must all be equal. Among several matches
/// the smallest `song_id` wins so repeated runs resolve identically.
pub fn find_song_reference(
    conn: &Connection,
    title: &str,
    artist_name: &str,
    duration: f64,
) -> rusqlite::Result<SongReference> {
    let found = conn
        .prepare_cached(
            "SELECT songs.song_id, artists.artist_id
             FROM songs
             JOIN artists ON songs.artist_id = artists.artist_id
             WHERE songs.title = ?1 AND artists.name = ?2 AND songs.duration = ?3
             ORDER BY songs.song_id
             LIMIT 1",
        )?
        .query_row(params![title, artist_name, duration], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })
        .optional()?;

    Ok(match found {
        Some((song_id, artist_id)) => SongReference {
            song_id: Some(song_id),
            artist_id: Some(artist_id),
        },
        None => {
            debug!(
                "No catalog match for '{}' by '{}' ({})",
                title, artist_name, duration
            );
            SongReference::unresolved()
        }
    })
}

// =============================================================================
// Fact Insert
// =============================================================================

pub fn insert_songplay(conn: &Connection, songplay: &Songplay) -> rusqlite::Result<()> {
    conn.prepare_cached(
        "INSERT INTO songplays
            (start_time, user_id, level, song_id, artist_id, session_id, location, user_agent)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    )?
    .execute(params![
        &songplay.start_time,
        songplay.user_id,
        &songplay.level,
        &songplay.song_id,
        &songplay.artist_id,
        songplay.session_id,
        &songplay.location,
        &songplay.user_agent
    ])?;
    Ok(())
}
