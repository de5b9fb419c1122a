//! Catalog extraction: one song and its artist per record.

use super::error::EtlError;
use super::FileStats;
use crate::warehouse::{upsert_artist, upsert_song, Artist, Song};
use rusqlite::Connection;
use serde::Deserialize;
use std::path::Path;
use tracing::debug;

/// A song catalog record as found in the source files.
///
/// Required fields are modelled as `Option` so that a missing one can be
/// reported by name instead of as a generic decode failure.
#[derive(Debug, Deserialize)]
pub struct CatalogRecord {
    pub song_id: Option<String>,
    pub title: Option<String>,
    pub artist_id: Option<String>,
    pub artist_name: Option<String>,
    pub artist_location: Option<String>,
    pub artist_latitude: Option<f64>,
    pub artist_longitude: Option<f64>,
    pub year: Option<i32>,
    pub duration: Option<f64>,
}

fn required(value: Option<String>, field: &str) -> Result<String, String> {
    value.ok_or_else(|| format!("missing required field '{}'", field))
}

impl CatalogRecord {
    /// Project the record onto its artist and song rows.
    pub fn into_rows(self) -> Result<(Artist, Song), String> {
        let artist_id = required(self.artist_id, "artist_id")?;
        let artist = Artist {
            artist_id: artist_id.clone(),
            name: required(self.artist_name, "artist_name")?,
            location: self.artist_location,
            latitude: self.artist_latitude,
            longitude: self.artist_longitude,
        };
        let song = Song {
            song_id: required(self.song_id, "song_id")?,
            title: required(self.title, "title")?,
            artist_id,
            year: self.year,
            duration: self.duration,
        };
        Ok((artist, song))
    }
}

/// Parse every record of a catalog document.
///
/// A document is a single JSON object or several newline-delimited ones.
pub fn parse_catalog(content: &str) -> Result<Vec<CatalogRecord>, String> {
    let records = serde_json::Deserializer::from_str(content)
        .into_iter::<CatalogRecord>()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| e.to_string())?;
    if records.is_empty() {
        return Err("no catalog record found".to_string());
    }
    Ok(records)
}

/// Load one catalog file: one artist and one song upsert per record.
pub fn process_song_file(conn: &Connection, path: &Path) -> Result<FileStats, EtlError> {
    let content = std::fs::read_to_string(path).map_err(|source| EtlError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let records = parse_catalog(&content).map_err(|reason| EtlError::malformed(path, reason))?;

    let mut stats = FileStats::default();
    for record in records {
        let (artist, song) = record
            .into_rows()
            .map_err(|reason| EtlError::malformed(path, reason))?;
        upsert_artist(conn, &artist)?;
        upsert_song(conn, &song)?;
        stats.records += 1;
    }
    debug!("{:?}: {} catalog records", path, stats.records);
    Ok(stats)
}
