//! Data tree and warehouse fixtures

use super::constants::*;
use rusqlite::Connection;
use serde_json::json;
use sparkify_etl::etl::EtlSettings;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A temporary song/log data tree plus a warehouse path next to it.
pub struct TestWarehouse {
    pub dir: TempDir,
    pub settings: EtlSettings,
}

impl TestWarehouse {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let settings = EtlSettings {
            db_path: dir.path().join("db").join("sparkifydb.db"),
            song_data: dir.path().join("data").join("song_data"),
            log_data: dir.path().join("data").join("log_data"),
        };
        Self { dir, settings }
    }

    fn write(root: &Path, relative: &str, content: &str) -> PathBuf {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    pub fn write_song(&self, relative: &str, content: &str) -> PathBuf {
        Self::write(&self.settings.song_data, relative, content)
    }

    pub fn write_log(&self, relative: &str, content: &str) -> PathBuf {
        Self::write(&self.settings.log_data, relative, content)
    }

    /// Opens a plain connection for assertions.
    pub fn connect(&self) -> Connection {
        Connection::open(&self.settings.db_path).unwrap()
    }

    pub fn count(&self, table: &str) -> i64 {
        self.connect()
            .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| {
                r.get(0)
            })
            .unwrap()
    }
}

/// A log event as the activity logs carry it.
pub fn log_event(page: &str, song: &str, artist: &str, length: f64, user_id: i64, ts: i64) -> String {
    json!({
        "artist": artist,
        "auth": "Logged In",
        "firstName": "Lily",
        "gender": "F",
        "itemInSession": 0,
        "lastName": "Koch",
        "length": length,
        "level": "paid",
        "location": "Chicago-Naperville-Elgin, IL-IN-WI",
        "method": "PUT",
        "page": page,
        "registration": 1_541_048_010_796.0,
        "sessionId": 172,
        "song": song,
        "status": 200,
        "ts": ts,
        "userAgent": "Mozilla/5.0 (X11; Linux x86_64)",
        "userId": user_id.to_string(),
    })
    .to_string()
}

/// One song play of "Song X" by user 10 at `PLAY_TS`, plus one home page view.
pub fn song_x_log() -> String {
    format!(
        "{}\n{}\n",
        log_event(
            "NextSong",
            SONG_1_TITLE,
            ARTIST_1_NAME,
            SONG_1_DURATION,
            USER_1_ID,
            PLAY_TS
        ),
        log_event("Home", "", "", 0.0, USER_1_ID, PLAY_TS + 1000)
    )
}
