//! Shared constants for end-to-end tests
//!
//! When the fixture data changes, update only this file.

// ============================================================================
// Catalog
// ============================================================================

pub const ARTIST_1_ID: &str = "A1";
pub const ARTIST_1_NAME: &str = "Artist One";
pub const SONG_1_ID: &str = "S1";
pub const SONG_1_TITLE: &str = "Song X";
pub const SONG_1_DURATION: f64 = 200.5;

/// Catalog record defining artist A1 and its song S1.
pub const SONG_X_RECORD: &str = r#"{"num_songs": 1, "artist_id": "A1", "artist_latitude": 35.14968, "artist_longitude": -90.04892, "artist_location": "Memphis, TN", "artist_name": "Artist One", "song_id": "S1", "title": "Song X", "duration": 200.5, "year": 1999}"#;

// ============================================================================
// Events
// ============================================================================

pub const USER_1_ID: i64 = 10;

/// 2018-11-02 01:25:34.796 UTC
pub const PLAY_TS: i64 = 1_541_121_934_796;
pub const PLAY_START_TIME: &str = "2018-11-02 01:25:34.796";
