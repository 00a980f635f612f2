use std::io;
use std::path::PathBuf;

/// Errors produced by the reconciliation log.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// I/O error while appending to or maintaining log files.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// A log file could not be opened for appending.
    #[error("cannot open reconciliation log {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A timestamp argument could not be parsed.
    #[error("invalid timestamp '{0}'")]
    InvalidTimestamp(String),
}

/// Convenience alias used throughout the reconcile crate.
pub type ReconcileResult<T> = std::result::Result<T, ReconcileError>;
