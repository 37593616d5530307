//! `kiln cppcheck` and `kiln tidy` — static analysis on a filtered database.
//!
//! Both commands share one pipeline:
//!
//! 1. Restore a database left filtered by an earlier, killed run
//! 2. Build the analysis preset if its database does not exist yet
//! 3. Back up the database and swap in the view without generated sources
//! 4. Run the analyzer
//! 5. Restore the original, whatever the analyzer did
//!
//! Interrupts received during step 4 are held until step 5 has finished.
//! An interrupt that arrives before step 4 ends the pipeline without
//! starting the analyzer.

use std::path::{Path, PathBuf};

use kiln_compdb::{ApplyOutcome, RestoreOutcome};
use kiln_config::ResolvedPreset;

use crate::build::build_preset;
use crate::interrupt::{Interrupt, INTERRUPTED_EXIT_CODE};
use crate::pipeline::{paint, Project, GREEN, YELLOW};
use crate::runner::{ToolError, ToolInvocation, ToolRunner};
use crate::GlobalArgs;

/// The database name run-clang-tidy looks up in its `-p` directory.
const TIDY_DATABASE: &str = "compile_commands.json";

/// Runs the `kiln cppcheck` command.
pub fn cppcheck(
    project: &Project,
    runner: &dyn ToolRunner,
    interrupt: &Interrupt,
    global: &GlobalArgs,
) -> Result<i32, Box<dyn std::error::Error>> {
    let preset = project.analysis_preset()?;
    let invocation = |live: &Path| cppcheck_invocation(project, live);
    guarded(project, runner, &preset, interrupt, global, invocation)
}

/// Runs the `kiln tidy` command.
///
/// The run-clang-tidy script is located before anything is touched, so a
/// missing LLVM install leaves the database alone.
pub fn tidy(
    project: &Project,
    runner: &dyn ToolRunner,
    interrupt: &Interrupt,
    global: &GlobalArgs,
) -> Result<i32, Box<dyn std::error::Error>> {
    let file_name = &project.config.compdb.file_name;
    if file_name != TIDY_DATABASE {
        return Err(format!(
            "run-clang-tidy only reads {TIDY_DATABASE}, but compdb.file_name is '{file_name}'"
        )
        .into());
    }
    let script = locate_script(&project.config.tidy.program)?;
    let preset = project.analysis_preset()?;
    let invocation = |_: &Path| tidy_invocation(project, &preset, &script);
    guarded(project, runner, &preset, interrupt, global, invocation)
}

fn cppcheck_invocation(project: &Project, live: &Path) -> ToolInvocation {
    let cfg = &project.config.cppcheck;
    let mut invocation = ToolInvocation::new(&cfg.program)
        .args(cfg.args.iter().cloned())
        .arg(format!("--project={}", live.display()));
    if project.root.join(&cfg.suppressions_file).is_file() {
        invocation = invocation.arg(format!("--suppressions-list={}", cfg.suppressions_file));
    }
    invocation.current_dir(&project.root)
}

fn tidy_invocation(project: &Project, preset: &ResolvedPreset, script: &Path) -> ToolInvocation {
    let cfg = &project.config.tidy;
    let script = script.display().to_string();
    let invocation = match cfg.launcher.as_deref() {
        Some(launcher) if !launcher.is_empty() => ToolInvocation::new(launcher).arg(script),
        _ => ToolInvocation::new(script),
    };
    invocation
        .arg("-p")
        .arg(preset.build_dir.display().to_string())
        .arg("-j")
        .arg(preset.jobs.to_string())
        .arg(format!(
            "-config-file={}",
            project.root.join(&cfg.config_file).display()
        ))
        .arg(format!("-header-filter={}", cfg.header_filter))
        .args(cfg.extra_args.iter().map(|a| format!("-extra-arg={a}")))
        .current_dir(&project.root)
}

/// Finds a script on `PATH`.
///
/// `which` honors `PATHEXT` on Windows and the executable bit elsewhere,
/// neither of which an extension-less Python script satisfies, so the
/// directories are also scanned for a plain file of that name.
fn locate_script(program: &str) -> Result<PathBuf, ToolError> {
    if let Ok(path) = which::which(program) {
        return Ok(path);
    }
    let direct = Path::new(program);
    if direct.components().count() > 1 && direct.is_file() {
        return Ok(direct.to_path_buf());
    }
    scan_path(program, std::env::var_os("PATH").as_deref()).ok_or_else(|| ToolError::NotFound {
        program: program.to_string(),
    })
}

fn scan_path(name: &str, path: Option<&std::ffi::OsStr>) -> Option<PathBuf> {
    std::env::split_paths(path?)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

/// Runs one analyzer between backup and restore of the analysis database.
fn guarded<F>(
    project: &Project,
    runner: &dyn ToolRunner,
    preset: &ResolvedPreset,
    interrupt: &Interrupt,
    global: &GlobalArgs,
    invocation: F,
) -> Result<i32, Box<dyn std::error::Error>>
where
    F: FnOnce(&Path) -> ToolInvocation,
{
    if interrupt.is_set() {
        return Ok(interrupted());
    }
    let transform = project.transform();
    let file_name = &project.config.compdb.file_name;

    // Step 1: Undo a filtered view left behind by a killed run
    if transform.recover(&preset.name)? == RestoreOutcome::Restored && !global.quiet {
        eprintln!(
            "{}",
            paint(
                &format!("warning: restored {file_name} left filtered by an interrupted run"),
                YELLOW,
                global.color
            )
        );
    }

    // Step 2: Make sure there is a database to filter
    if !transform.store().live_exists(&preset.name) {
        let built = build_preset(project, runner, preset, global);
        if interrupt.is_set() {
            return Ok(interrupted());
        }
        built?;
    }

    // Step 3: Clean -> Backed
    let guard = transform.guard(&preset.name)?;
    if !global.quiet {
        if let ApplyOutcome::Applied(report) = guard.outcome() {
            eprintln!(
                "{}",
                paint(
                    &format!(
                        "✓ Filtered {file_name}: {} -> {} entries",
                        report.before, report.after
                    ),
                    GREEN,
                    global.color
                )
            );
        }
    }

    // Step 4: Run the analyzer against the filtered view
    let result = if interrupt.is_set() {
        Ok(())
    } else {
        runner.run(&invocation(&guard.live_path()))
    };

    // Step 5: Backed -> Clean, before any other error is reported
    guard.finish()?;
    if !global.quiet {
        eprintln!(
            "{}",
            paint(&format!("✓ Restored {file_name}"), GREEN, global.color)
        );
    }

    if interrupt.is_set() {
        return Ok(interrupted());
    }
    result?;
    Ok(0)
}

fn interrupted() -> i32 {
    eprintln!("interrupted");
    INTERRUPTED_EXIT_CODE
}
