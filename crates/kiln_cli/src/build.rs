//! `kiln build`, `kiln run`, and `kiln clean` — the CMake preset workflow.

use std::fs;
use std::path::PathBuf;

use kiln_config::ResolvedPreset;
use tracing::debug;

use crate::pipeline::Project;
use crate::runner::{ToolInvocation, ToolRunner};
use crate::GlobalArgs;

/// Runs the `kiln build` command.
///
/// Configures the preset with `cmake --preset` and then builds it in
/// parallel. Returns exit code 0 on success; a failing cmake step is
/// returned as an error carrying cmake's exit code.
pub fn build(
    project: &Project,
    runner: &dyn ToolRunner,
    preset: Option<&str>,
    global: &GlobalArgs,
) -> Result<i32, Box<dyn std::error::Error>> {
    let preset = project.preset(preset)?;
    build_preset(project, runner, &preset, global)?;
    Ok(0)
}

/// Configures and builds an already resolved preset.
pub fn build_preset(
    project: &Project,
    runner: &dyn ToolRunner,
    preset: &ResolvedPreset,
    global: &GlobalArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let cmake = &project.config.build.cmake;

    if !global.quiet {
        eprintln!(
            "   Building {} v{} [{}]",
            project.config.project.name, project.config.project.version, preset.name
        );
    }

    runner.run(
        &ToolInvocation::new(cmake)
            .args(["--preset", preset.name.as_str()])
            .current_dir(&project.root),
    )?;
    runner.run(
        &ToolInvocation::new(cmake)
            .args(["--build", "--preset", preset.name.as_str(), "-j"])
            .arg(preset.jobs.to_string())
            .current_dir(&project.root),
    )?;
    Ok(())
}

/// Runs the `kiln run` command.
///
/// Builds the preset first when its executable does not exist yet. On
/// Windows the Qt runtime is deployed next to the binary before launch.
pub fn run(
    project: &Project,
    runner: &dyn ToolRunner,
    preset: Option<&str>,
    global: &GlobalArgs,
) -> Result<i32, Box<dyn std::error::Error>> {
    let preset = project.preset(preset)?;

    if !preset.executable.is_file() {
        debug!(exe = %preset.executable.display(), "executable missing, building first");
        build_preset(project, runner, &preset, global)?;
    }

    let exe = preset.executable.display().to_string();
    if cfg!(windows) {
        runner.run(&ToolInvocation::new("windeployqt").arg(&exe))?;
    }
    runner.run(&ToolInvocation::new(exe).current_dir(&project.root))?;
    Ok(0)
}

/// Runs the `kiln clean` command.
///
/// Removes every `build*` directory and `.cache` under the project root,
/// and a `compile_commands.json` symlinked or copied to the root.
pub fn clean(project: &Project, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let targets = clean_targets(project)?;

    if targets.is_empty() {
        if !global.quiet {
            eprintln!("   Nothing to clean");
        }
        return Ok(0);
    }

    for path in targets {
        if !global.quiet {
            eprintln!("   Removing {}", path.display());
        }
        if path.is_dir() {
            fs::remove_dir_all(&path)?;
        } else {
            fs::remove_file(&path)?;
        }
    }
    Ok(0)
}

/// Lists what `clean` removes, sorted by path.
fn clean_targets(project: &Project) -> Result<Vec<PathBuf>, Box<dyn std::error::Error>> {
    let mut targets = Vec::new();
    for entry in fs::read_dir(&project.root)? {
        let entry = entry?;
        let path = entry.path();
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if path.is_dir() && (name.starts_with("build") || name == ".cache") {
            targets.push(path);
        }
    }

    let root_db = project.root.join(&project.config.compdb.file_name);
    if root_db.is_file() || root_db.is_symlink() {
        targets.push(root_db);
    }

    targets.sort();
    Ok(targets)
}
