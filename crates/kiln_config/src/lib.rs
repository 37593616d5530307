//! Parsing and validation of `kiln.toml` project configuration files.
//!
//! This crate reads the project configuration file (and the optional
//! `kiln.local.toml` overlay) and produces a strongly-typed [`ProjectConfig`]
//! with preset resolution and job-count defaults.

#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod resolve;
pub mod types;

pub use error::ConfigError;
pub use loader::{
    load_config, load_config_file, load_config_from_str, load_config_with_overlay, CONFIG_FILE,
    LOCAL_CONFIG_FILE,
};
pub use resolve::{resolve_preset, ResolvedPreset};
pub use types::*;
