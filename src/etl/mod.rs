//! Source files to star schema.
//!
//! The walker hands each file to an extractor inside its own transaction;
//! the event extractor resolves song references and appends fact rows.

mod catalog;
mod error;
mod events;
mod facts;
mod pipeline;
mod progress;
mod resolver;
mod walker;

use std::ops::AddAssign;

pub use catalog::{parse_catalog, process_song_file, CatalogRecord};
pub use error::EtlError;
pub use events::{parse_events, process_log_file, LogEvent, SongPlayRows, SONG_PLAY_PAGE};
pub use facts::{assemble_songplay, record_songplay, PlayContext};
pub use pipeline::{
    check_schema, create_tables, ensure_tables, execute, open_warehouse, run_etl, EtlReport,
    EtlSettings, Operation, OperationOutcome,
};
pub use progress::Progress;
pub use resolver::resolve_song;
pub use walker::{discover_files, walk, WalkReport};

/// What one extractor did with one file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FileStats {
    /// Records read from the file, song plays or not.
    pub records: usize,
    pub songplays: usize,
    pub resolved: usize,
}

impl AddAssign for FileStats {
    fn add_assign(&mut self, other: Self) {
        self.records += other.records;
        self.songplays += other.songplays;
        self.resolved += other.resolved;
    }
}
