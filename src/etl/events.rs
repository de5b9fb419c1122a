//! Event extraction: user activity logs to time, user and songplay rows.

use super::error::EtlError;
use super::facts::{record_songplay, PlayContext};
use super::resolver::resolve_song;
use super::FileStats;
use crate::warehouse::{upsert_time, upsert_user, TimeRow, User};
use rusqlite::Connection;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::path::Path;
use tracing::debug;

/// Value of `page` for events that represent a song play.
pub const SONG_PLAY_PAGE: &str = "NextSong";

/// One user-activity event. Fields not needed by the warehouse are ignored.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEvent {
    pub artist: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub gender: Option<String>,
    pub length: Option<f64>,
    pub level: Option<String>,
    pub location: Option<String>,
    pub page: Option<String>,
    pub session_id: Option<i64>,
    pub song: Option<String>,
    pub ts: Option<i64>,
    pub user_agent: Option<String>,
    /// Logs carry this as a number or as a (possibly empty) string.
    pub user_id: Option<JsonValue>,
}

impl LogEvent {
    pub fn is_song_play(&self) -> bool {
        self.page.as_deref() == Some(SONG_PLAY_PAGE)
    }

    pub fn parsed_user_id(&self) -> Result<i64, String> {
        match &self.user_id {
            Some(JsonValue::Number(n)) => n
                .as_i64()
                .ok_or_else(|| format!("userId {} is not an integer", n)),
            Some(JsonValue::String(s)) if !s.trim().is_empty() => s
                .trim()
                .parse()
                .map_err(|_| format!("userId '{}' is not numeric", s)),
            _ => Err("missing userId".to_string()),
        }
    }
}

/// The normalized rows a song-play event produces before reference resolution.
#[derive(Debug, PartialEq)]
pub struct SongPlayRows {
    pub time: TimeRow,
    pub user: User,
    pub context: PlayContext,
}

impl TryFrom<LogEvent> for SongPlayRows {
    type Error = String;

    fn try_from(event: LogEvent) -> Result<Self, Self::Error> {
        let user_id = event.parsed_user_id()?;
        let ts = event.ts.ok_or("missing ts")?;
        let time =
            TimeRow::from_epoch_millis(ts).ok_or_else(|| format!("ts {} out of range", ts))?;
        let session_id = event.session_id.ok_or("missing sessionId")?;
        let level = event.level.ok_or("missing level")?;

        Ok(SongPlayRows {
            time,
            user: User {
                user_id,
                first_name: event.first_name,
                last_name: event.last_name,
                gender: event.gender,
                level,
            },
            context: PlayContext {
                session_id,
                location: event.location,
                user_agent: event.user_agent,
            },
        })
    }
}

/// Parse a log document: a JSON array of events or newline-delimited events.
pub fn parse_events(content: &str) -> Result<Vec<LogEvent>, String> {
    if content.trim_start().starts_with('[') {
        return serde_json::from_str(content).map_err(|e| e.to_string());
    }
    serde_json::Deserializer::from_str(content)
        .into_iter::<LogEvent>()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| e.to_string())
}

/// Load one log file.
///
/// For every song-play event, in file order: upsert its time row, upsert its
/// user (last write wins for `level`), resolve the song and append the fact.
pub fn process_log_file(conn: &Connection, path: &Path) -> Result<FileStats, EtlError> {
    let content = std::fs::read_to_string(path).map_err(|source| EtlError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let events = parse_events(&content).map_err(|reason| EtlError::malformed(path, reason))?;

    let mut stats = FileStats::default();
    for (index, event) in events.into_iter().enumerate() {
        stats.records += 1;
        if !event.is_song_play() {
            continue;
        }

        let song = event.song.clone();
        let artist = event.artist.clone();
        let length = event.length;
        let rows = SongPlayRows::try_from(event)
            .map_err(|reason| EtlError::malformed(path, format!("event {}: {}", index, reason)))?;

        upsert_time(conn, &rows.time)?;
        upsert_user(conn, &rows.user)?;
        let reference = resolve_song(conn, song.as_deref(), artist.as_deref(), length)?;
        if reference.is_resolved() {
            stats.resolved += 1;
        }
        record_songplay(conn, &rows.time, &rows.user, reference, rows.context)?;
        stats.songplays += 1;
    }
    debug!(
        "{:?}: {} events, {} song plays ({} resolved)",
        path, stats.records, stats.songplays, stats.resolved
    );
    Ok(stats)
}
