//! Shared pipeline helpers for CLI commands.
//!
//! Contains the utilities every command needs: project root resolution,
//! configuration loading, source file discovery, the compile-command store
//! of the project, and terminal coloring.

use std::path::{Path, PathBuf};

use kiln_compdb::{ArtifactStore, GuardedTransform, StoreLayout};
use kiln_config::{ProjectConfig, ResolvedPreset, CONFIG_FILE};

use crate::GlobalArgs;

/// ANSI red.
pub const RED: &str = "31";
/// ANSI green.
pub const GREEN: &str = "32";
/// ANSI yellow.
pub const YELLOW: &str = "33";
/// ANSI cyan.
pub const CYAN: &str = "36";

/// Wraps `text` in an ANSI color sequence when `color` is enabled.
pub fn paint(text: &str, code: &str, color: bool) -> String {
    if color {
        format!("\x1b[{code}m{text}\x1b[0m")
    } else {
        text.to_string()
    }
}

/// Walks up from `start` looking for the nearest directory containing `kiln.toml`.
///
/// Returns the directory containing `kiln.toml`, or an error if none is found.
pub fn find_project_root(start: &Path) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let mut current = start.to_path_buf();
    loop {
        if current.join(CONFIG_FILE).exists() {
            return Ok(current);
        }
        if !current.pop() {
            return Err(format!(
                "could not find {CONFIG_FILE} in {} or any parent directory",
                start.display()
            )
            .into());
        }
    }
}

/// Resolves the project root and the configuration file from global CLI args.
///
/// If `--config` is specified, uses that path (file → parent dir, dir → itself).
/// Otherwise walks up from the current directory looking for `kiln.toml`.
pub fn resolve_project_root(
    global: &GlobalArgs,
) -> Result<(PathBuf, PathBuf), Box<dyn std::error::Error>> {
    if let Some(ref config_path) = global.config {
        let p = PathBuf::from(config_path);
        if p.is_file() {
            let root = p
                .parent()
                .filter(|d| !d.as_os_str().is_empty())
                .map(|d| d.to_path_buf())
                .unwrap_or_else(|| PathBuf::from("."));
            Ok((root, p))
        } else {
            let file = p.join(CONFIG_FILE);
            Ok((p, file))
        }
    } else {
        let root = find_project_root(&std::env::current_dir()?)?;
        let file = root.join(CONFIG_FILE);
        Ok((root, file))
    }
}

/// A loaded project: its root directory and validated configuration.
#[derive(Debug, Clone)]
pub struct Project {
    /// The directory containing the configuration file.
    pub root: PathBuf,
    /// The validated configuration.
    pub config: ProjectConfig,
}

impl Project {
    /// Locates and loads the project selected by the global args.
    pub fn load(global: &GlobalArgs) -> Result<Self, Box<dyn std::error::Error>> {
        let (root, file) = resolve_project_root(global)?;
        let config = kiln_config::load_config_file(&file)?;
        // External tools run with other working directories.
        let root = if root.is_absolute() {
            root
        } else {
            std::env::current_dir()?.join(root)
        };
        Ok(Self::new(root, config))
    }

    /// Creates a project from an already loaded configuration.
    pub fn new(root: PathBuf, config: ProjectConfig) -> Self {
        Self { root, config }
    }

    /// Resolves a build preset, or `build.default_preset` when `None`.
    pub fn preset(&self, name: Option<&str>) -> Result<ResolvedPreset, Box<dyn std::error::Error>> {
        Ok(kiln_config::resolve_preset(&self.config, &self.root, name)?)
    }

    /// Resolves the preset whose database the analysis tools read.
    pub fn analysis_preset(&self) -> Result<ResolvedPreset, Box<dyn std::error::Error>> {
        self.preset(Some(&self.config.compdb.analysis_preset))
    }

    /// The compile-command store rooted at the project directory.
    pub fn store(&self) -> ArtifactStore {
        ArtifactStore::new(&self.root, StoreLayout::from_config(&self.config))
    }

    /// The guarded transform configured with the project's exclude patterns.
    pub fn transform(&self) -> GuardedTransform {
        GuardedTransform::new(self.store(), self.config.compdb.exclude_patterns.clone())
    }
}

/// Discovers source files under `dirs` (relative to `root`, recursive).
///
/// Only files whose extension is listed in `extensions` are returned, sorted
/// by path. Directories that do not exist are skipped.
pub fn discover_source_files(
    root: &Path,
    dirs: &[String],
    extensions: &[String],
) -> Result<Vec<PathBuf>, Box<dyn std::error::Error>> {
    let mut files = Vec::new();
    for dir in dirs {
        let dir = root.join(dir);
        if dir.is_dir() {
            walk_dir(&dir, extensions, &mut files)?;
        }
    }
    files.sort();
    files.dedup();
    Ok(files)
}

/// Recursively walks a directory collecting files with matching extensions.
fn walk_dir(
    dir: &Path,
    extensions: &[String],
    files: &mut Vec<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            walk_dir(&path, extensions, files)?;
        } else if has_extension(&path, extensions) {
            files.push(path);
        }
    }
    Ok(())
}

/// Returns true if the file's extension is one of `extensions`.
pub fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| extensions.iter().any(|x| x == e))
}
