use super::error::EtlError;
use super::progress::Progress;
use super::FileStats;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use tracing::{error, warn};
use walkdir::WalkDir;

/// Totals of one walk over a data tree.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WalkReport {
    pub files: usize,
    pub stats: FileStats,
}

/// All `*.json` files below `root`, sorted by full path.
///
/// A missing root is not an error: there is simply nothing to load.
pub fn discover_files(root: &Path) -> Result<Vec<PathBuf>, EtlError> {
    if !root.exists() {
        warn!("Data directory {:?} does not exist, nothing to load", root);
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(true) {
        let entry = entry.map_err(|source| EtlError::Walk {
            root: root.to_path_buf(),
            source,
        })?;
        let is_json = entry.path().extension().is_some_and(|ext| ext == "json");
        if entry.file_type().is_file() && is_json {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

/// Run `handler` on every data file below `root`, one transaction per file.
///
/// The transaction is committed after each file. When the handler fails the
/// current file is rolled back and the walk stops; files already processed
/// stay committed.
pub fn walk<F>(
    conn: &mut Connection,
    root: &Path,
    progress: &Progress,
    mut handler: F,
) -> Result<WalkReport, EtlError>
where
    F: FnMut(&Connection, &Path) -> Result<FileStats, EtlError>,
{
    let files = discover_files(root)?;
    let total = files.len();
    progress.report(format!("{} files found in {}", total, root.display()));

    let mut report = WalkReport::default();
    for (index, path) in files.iter().enumerate() {
        let tx = conn.transaction()?;
        let stats = match handler(&*tx, path) {
            Ok(stats) => stats,
            Err(err) => {
                error!("Failed to process {:?}, rolling it back: {}", path, err);
                return Err(err);
            }
        };
        tx.commit()?;

        report.files += 1;
        report.stats += stats;
        progress.report(format!("{}/{} files processed.", index + 1, total));
    }
    Ok(report)
}
