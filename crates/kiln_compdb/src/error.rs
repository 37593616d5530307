//! Error types for compile-command database operations.

use std::path::PathBuf;

/// Errors raised by the artifact store and the guarded transform.
///
/// Only two of these are ever benign, and only at the transition level:
/// [`CompdbError::BackupAlreadyExists`] during apply and
/// [`CompdbError::NoBackup`] when restoring a configuration that was
/// already clean. Everything else reaches the caller.
#[derive(Debug, thiserror::Error)]
pub enum CompdbError {
    /// No live database exists for the configuration.
    #[error("compile command database not found at {path}")]
    NotFound {
        /// The expected database path.
        path: PathBuf,
    },

    /// A backup is already present, so a second one would clobber it.
    #[error("backup already exists at {path}")]
    BackupAlreadyExists {
        /// The backup path.
        path: PathBuf,
    },

    /// A restore was requested but there is no backup to restore from.
    #[error("no backup to restore at {path}")]
    NoBackup {
        /// The backup path.
        path: PathBuf,
    },

    /// The database file is not a JSON array of invocation records.
    #[error("malformed compile command database {path}: {reason}")]
    Malformed {
        /// The offending file.
        path: PathBuf,
        /// Description of the parse failure.
        reason: String,
    },

    /// Writing, renaming, or removing a database file failed.
    #[error("failed to persist {path}: {source}")]
    Persistence {
        /// The path being written.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The original database could not be put back.
    ///
    /// The live file still holds a filtered view that downstream consumers
    /// cannot tell apart from the real one.
    #[error("failed to restore {path}, the live database is still filtered: {source}")]
    RestoreFailed {
        /// The live database path.
        path: PathBuf,
        /// Why the restore failed.
        source: Box<CompdbError>,
    },
}

impl CompdbError {
    pub(crate) fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Persistence {
            path: path.into(),
            source,
        }
    }
}
