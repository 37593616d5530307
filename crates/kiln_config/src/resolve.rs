//! Preset resolution: turning a preset name into concrete build paths.

use crate::error::ConfigError;
use crate::types::ProjectConfig;
use std::path::{Path, PathBuf};

/// Placeholder in `build.build_dir` replaced by the preset name.
pub const PRESET_PLACEHOLDER: &str = "{preset}";

/// A preset with every path it implies resolved against the project root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPreset {
    /// The preset name passed to `cmake --preset`.
    pub name: String,
    /// The build directory of the preset.
    pub build_dir: PathBuf,
    /// The application binary produced by the build.
    pub executable: PathBuf,
    /// Parallel job count for the build and for run-clang-tidy.
    pub jobs: usize,
}

/// Resolves a preset name, or the configured default when `preset` is `None`.
///
/// Preset names map to directories, so path separators and `..` are
/// rejected. When `build.presets` is non-empty the name must be listed there.
pub fn resolve_preset(
    config: &ProjectConfig,
    project_dir: &Path,
    preset: Option<&str>,
) -> Result<ResolvedPreset, ConfigError> {
    let name = preset.unwrap_or(&config.build.default_preset);

    if name.is_empty() || name == ".." || name.contains(['/', '\\']) {
        return Err(ConfigError::ValidationError(format!(
            "invalid preset name '{name}'"
        )));
    }
    if !config.build.presets.is_empty() && !config.build.presets.iter().any(|p| p == name) {
        return Err(ConfigError::UnknownPreset {
            name: name.to_string(),
            declared: config.build.presets.clone(),
        });
    }

    let build_dir = project_dir.join(build_dir_for(&config.build.build_dir, name));
    let exe_name = format!("{}{}", config.project.name, std::env::consts::EXE_SUFFIX);

    Ok(ResolvedPreset {
        name: name.to_string(),
        executable: build_dir.join(exe_name),
        build_dir,
        jobs: config.build.effective_jobs(),
    })
}

/// Expands the build directory template for a preset.
pub fn build_dir_for(template: &str, preset: &str) -> String {
    template.replace(PRESET_PLACEHOLDER, preset)
}
