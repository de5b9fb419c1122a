use std::path::PathBuf;
use thiserror::Error;

/// Failures that abort an ETL invocation.
///
/// An unresolved song reference is deliberately absent: it is recorded as
/// null foreign keys on the fact row, not reported as an error.
#[derive(Debug, Error)]
pub enum EtlError {
    #[error("Could not open warehouse {path:?}: {source:#}")]
    Connection {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("Schema setup failed: {0:#}")]
    Schema(#[source] anyhow::Error),

    #[error("Could not read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not walk {root:?}: {source}")]
    Walk {
        root: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("Malformed record in {path:?}: {reason}")]
    MalformedRecord { path: PathBuf, reason: String },

    #[error("Store error: {0}")]
    Store(#[from] rusqlite::Error),
}

impl EtlError {
    pub fn malformed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        EtlError::MalformedRecord {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
