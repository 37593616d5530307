//! Configuration file loading, overlay merging, and validation.

use crate::error::ConfigError;
use crate::types::ProjectConfig;
use std::path::Path;

/// Name of the project configuration file at the project root.
pub const CONFIG_FILE: &str = "kiln.toml";

/// Name of the optional, uncommitted per-machine overlay.
pub const LOCAL_CONFIG_FILE: &str = "kiln.local.toml";

/// Loads and validates the configuration of a project directory.
///
/// Reads `<project_dir>/kiln.toml` and, when present,
/// `<project_dir>/kiln.local.toml` on top of it.
pub fn load_config(project_dir: &Path) -> Result<ProjectConfig, ConfigError> {
    load_config_file(&project_dir.join(CONFIG_FILE))
}

/// Loads a configuration file by path.
///
/// The `kiln.local.toml` overlay is looked up next to `path`.
pub fn load_config_file(path: &Path) -> Result<ProjectConfig, ConfigError> {
    let base = read_table(path)?;
    let local_path = path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(LOCAL_CONFIG_FILE);
    let overlay = if local_path.is_file() {
        Some(read_table(&local_path)?)
    } else {
        None
    };
    finish(base, overlay, Some(path))
}

/// Parses and validates a `kiln.toml` configuration from a string.
///
/// Useful for testing without filesystem dependencies.
pub fn load_config_from_str(content: &str) -> Result<ProjectConfig, ConfigError> {
    load_config_with_overlay(content, None)
}

/// Parses a base configuration and merges an optional overlay into it.
///
/// Tables merge key by key; any other overlay value replaces the base value.
pub fn load_config_with_overlay(
    content: &str,
    overlay: Option<&str>,
) -> Result<ProjectConfig, ConfigError> {
    let base = parse_table(content, None)?;
    let overlay = overlay.map(|o| parse_table(o, None)).transpose()?;
    finish(base, overlay, None)
}

fn read_table(path: &Path) -> Result<toml::Table, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::read(path, e))?;
    parse_table(&content, Some(path))
}

fn parse_table(content: &str, path: Option<&Path>) -> Result<toml::Table, ConfigError> {
    content
        .parse::<toml::Table>()
        .map_err(|e| ConfigError::parse(path, e))
}

/// Merges, deserializes and validates. Schema errors are reported against
/// the base file, which the overlay only patches.
fn finish(
    mut base: toml::Table,
    overlay: Option<toml::Table>,
    path: Option<&Path>,
) -> Result<ProjectConfig, ConfigError> {
    if let Some(overlay) = overlay {
        merge_tables(&mut base, overlay);
    }
    let config: ProjectConfig = toml::Value::Table(base)
        .try_into()
        .map_err(|e: toml::de::Error| ConfigError::parse(path, e))?;
    validate_config(&config)?;
    Ok(config)
}

/// Recursively merges `overlay` into `base`.
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        let incoming = match value {
            toml::Value::Table(incoming) => incoming,
            other => {
                base.insert(key, other);
                continue;
            }
        };
        if let Some(toml::Value::Table(existing)) = base.get_mut(&key) {
            merge_tables(existing, incoming);
            continue;
        }
        base.insert(key, toml::Value::Table(incoming));
    }
}

/// Validates that required fields are present and configuration values are consistent.
fn validate_config(config: &ProjectConfig) -> Result<(), ConfigError> {
    if config.project.name.is_empty() {
        return Err(ConfigError::MissingField("project.name".to_string()));
    }
    if config.build.default_preset.is_empty() {
        return Err(ConfigError::MissingField("build.default_preset".to_string()));
    }
    if config.build.jobs == Some(0) {
        return Err(ConfigError::ValidationError(
            "build.jobs must be at least 1".to_string(),
        ));
    }
    if config.compdb.file_name.is_empty() {
        return Err(ConfigError::MissingField("compdb.file_name".to_string()));
    }
    if config.compdb.backup_suffix.is_empty() {
        return Err(ConfigError::ValidationError(
            "compdb.backup_suffix must not be empty".to_string(),
        ));
    }
    if config.compdb.exclude_patterns.iter().any(|p| p.is_empty()) {
        // An empty substring matches every record.
        return Err(ConfigError::ValidationError(
            "compdb.exclude_patterns must not contain an empty pattern".to_string(),
        ));
    }
    Ok(())
}
