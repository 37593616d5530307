//! `kiln format` and `kiln format-check` — clang-format over the sources.

use std::path::PathBuf;

use crate::pipeline::{discover_source_files, Project};
use crate::runner::{ToolInvocation, ToolRunner};
use crate::GlobalArgs;

/// Runs the `kiln format` command, rewriting files in place.
pub fn format(
    project: &Project,
    runner: &dyn ToolRunner,
    global: &GlobalArgs,
) -> Result<i32, Box<dyn std::error::Error>> {
    run_formatter(project, runner, global, &["-i"])
}

/// Runs the `kiln format-check` command.
///
/// Fails with clang-format's exit code when any file would change.
pub fn check(
    project: &Project,
    runner: &dyn ToolRunner,
    global: &GlobalArgs,
) -> Result<i32, Box<dyn std::error::Error>> {
    run_formatter(project, runner, global, &["--dry-run", "--Werror"])
}

fn run_formatter(
    project: &Project,
    runner: &dyn ToolRunner,
    global: &GlobalArgs,
    flags: &[&str],
) -> Result<i32, Box<dyn std::error::Error>> {
    let files = source_files(project)?;
    if files.is_empty() {
        if !global.quiet {
            eprintln!("No files found to format.");
        }
        return Ok(0);
    }

    let invocation = ToolInvocation::new(&project.config.format.program)
        .args(flags.iter().copied())
        .args(files.iter().map(|f| f.display().to_string()))
        .current_dir(&project.root);
    runner.run(&invocation)?;
    Ok(0)
}

/// The files clang-format is run on, relative to the project root.
fn source_files(project: &Project) -> Result<Vec<PathBuf>, Box<dyn std::error::Error>> {
    let format = &project.config.format;
    let files = discover_source_files(&project.root, &format.source_dirs, &format.extensions)?;
    Ok(files
        .into_iter()
        .map(|f| match f.strip_prefix(&project.root) {
            Ok(rel) => rel.to_path_buf(),
            Err(_) => f,
        })
        .collect())
}
