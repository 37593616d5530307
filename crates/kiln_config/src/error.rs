//! Errors raised while reading `kiln.toml` and resolving presets.
//!
//! A project configuration can come from two files, `kiln.toml` and the
//! optional `kiln.local.toml` next to it, so read and parse failures name
//! the file they came from.

use std::path::{Path, PathBuf};

/// Why a project configuration could not be used.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A configuration file could not be read.
    #[error("cannot read {}: {source}", .path.display())]
    IoError {
        /// The file that failed.
        path: PathBuf,
        /// The underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// A document is not valid TOML or does not fit the schema.
    #[error("invalid configuration in {}: {reason}", origin(.path))]
    ParseError {
        /// The offending file, `None` for configuration given as a string.
        path: Option<PathBuf>,
        /// The parser's message.
        reason: String,
    },

    /// The preset is not among the declared `build.presets`.
    #[error("unknown preset '{name}' (declared: {})", .declared.join(", "))]
    UnknownPreset {
        /// The requested preset.
        name: String,
        /// The presets the project declares.
        declared: Vec<String>,
    },

    /// A required field is missing or empty.
    #[error("missing required field: {0}")]
    MissingField(String),

    /// A configuration value is out of range.
    #[error("validation error: {0}")]
    ValidationError(String),
}

impl ConfigError {
    pub(crate) fn read(path: &Path, source: std::io::Error) -> Self {
        Self::IoError {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn parse(path: Option<&Path>, reason: impl ToString) -> Self {
        Self::ParseError {
            path: path.map(Path::to_path_buf),
            reason: reason.to_string(),
        }
    }
}

fn origin(path: &Option<PathBuf>) -> String {
    match path {
        Some(path) => path.display().to_string(),
        None => "inline configuration".to_string(),
    }
}
