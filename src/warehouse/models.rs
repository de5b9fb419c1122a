//! Row models for the star schema.
//!
//! These are the already-normalized rows the extractors emit; they map one to
//! one onto the tables declared in `schema.rs`.

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::Serialize;

/// Format used for `time.start_time` and `songplays.start_time`.
///
/// Fixed width and UTC, so text ordering equals chronological ordering.
pub const START_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Artist {
    pub artist_id: String,
    pub name: String,
    pub location: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Song {
    pub song_id: String,
    pub title: String,
    pub artist_id: String,
    pub year: Option<i32>,
    pub duration: Option<f64>,
}

/// Subscription tier is kept as the raw string the logs carry ("free", "paid").
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct User {
    pub user_id: i64,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub gender: Option<String>,
    pub level: String,
}

/// Calendar breakdown of a single play timestamp.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TimeRow {
    pub start_time: String,
    pub hour: u32,
    pub day: u32,
    /// ISO-8601 week of year.
    pub week: u32,
    pub month: u32,
    pub year: i32,
    /// Monday is 0.
    pub weekday: u32,
}

impl TimeRow {
    /// Decompose a millisecond epoch timestamp.
    ///
    /// Returns `None` when the timestamp is outside chrono's representable range.
    pub fn from_epoch_millis(ts: i64) -> Option<Self> {
        let dt = DateTime::<Utc>::from_timestamp_millis(ts)?;
        Some(Self::from_datetime(&dt))
    }

    pub fn from_datetime(dt: &DateTime<Utc>) -> Self {
        TimeRow {
            start_time: dt.format(START_TIME_FORMAT).to_string(),
            hour: dt.hour(),
            day: dt.day(),
            week: dt.iso_week().week(),
            month: dt.month(),
            year: dt.year(),
            weekday: dt.weekday().num_days_from_monday(),
        }
    }
}

/// Outcome of looking a play up in the catalog.
///
/// Both fields are `None` when the catalog has no exact match.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SongReference {
    pub song_id: Option<String>,
    pub artist_id: Option<String>,
}

impl SongReference {
    pub fn unresolved() -> Self {
        Self::default()
    }

    pub fn is_resolved(&self) -> bool {
        self.song_id.is_some()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Songplay {
    pub start_time: String,
    pub user_id: i64,
    pub level: String,
    pub song_id: Option<String>,
    pub artist_id: Option<String>,
    pub session_id: i64,
    pub location: Option<String>,
    pub user_agent: Option<String>,
}
