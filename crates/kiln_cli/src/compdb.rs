//! `kiln compdb` — inspect and repair the compile-command database.
//!
//! `filter` leaves the database in its filtered state on purpose, for
//! running an analyzer by hand; `restore` undoes it. `status` shows which
//! state a preset is in.

use std::path::PathBuf;

use kiln_compdb::{
    generated_files, ApplyOutcome, CompdbError, InvocationDatabase, RestoreOutcome,
    TransformState,
};
use kiln_config::ResolvedPreset;
use serde::Serialize;

use crate::pipeline::{paint, Project, GREEN, YELLOW};
use crate::{CompdbCommand, CompdbStatusArgs, GlobalArgs, ReportFormat};

/// Runs a `kiln compdb` subcommand.
pub fn run(
    cmd: &CompdbCommand,
    project: &Project,
    global: &GlobalArgs,
) -> Result<i32, Box<dyn std::error::Error>> {
    match cmd {
        CompdbCommand::Status(args) => status(args, project, global),
        CompdbCommand::Filter(args) => {
            filter(&preset(project, args.preset.as_deref())?, project, global)
        }
        CompdbCommand::Restore(args) => {
            restore(&preset(project, args.preset.as_deref())?, project, global)
        }
    }
}

/// Resolves `name`, defaulting to the analysis preset rather than the build default.
fn preset(
    project: &Project,
    name: Option<&str>,
) -> Result<ResolvedPreset, Box<dyn std::error::Error>> {
    match name {
        Some(name) => project.preset(Some(name)),
        None => project.analysis_preset(),
    }
}

/// State of one preset's database files.
#[derive(Debug, Serialize)]
pub struct CompdbStatus {
    /// The preset name.
    pub preset: String,
    /// `clean` or `filtered`.
    pub state: &'static str,
    /// The live database.
    pub live: FileStatus,
    /// The backup of the original database.
    pub backup: FileStatus,
}

/// One database file.
#[derive(Debug, Serialize)]
pub struct FileStatus {
    /// Where the file lives.
    pub path: PathBuf,
    /// Record count, `None` when the file does not exist.
    pub entries: Option<usize>,
    /// Records matching the exclude patterns.
    pub generated: Option<usize>,
}

/// Collects the status of a preset.
pub fn collect_status(
    preset: &ResolvedPreset,
    project: &Project,
) -> Result<CompdbStatus, CompdbError> {
    let store = project.store();
    let patterns = &project.config.compdb.exclude_patterns;

    let file_status = |path: PathBuf, db: Option<InvocationDatabase>| FileStatus {
        path,
        entries: db.as_ref().map(InvocationDatabase::len),
        generated: db.as_ref().map(|db| generated_files(db, patterns).count()),
    };

    let live = existing(store.load(&preset.name))?;
    let backup = existing(store.load_backup(&preset.name))?;
    let state = match store.state(&preset.name) {
        TransformState::Clean => "clean",
        TransformState::Backed => "filtered",
    };

    Ok(CompdbStatus {
        preset: preset.name.clone(),
        state,
        live: file_status(store.live_path(&preset.name), live),
        backup: file_status(store.backup_path(&preset.name), backup),
    })
}

/// Maps a missing file to `None`.
fn existing(
    loaded: Result<InvocationDatabase, CompdbError>,
) -> Result<Option<InvocationDatabase>, CompdbError> {
    match loaded {
        Ok(db) => Ok(Some(db)),
        Err(CompdbError::NotFound { .. } | CompdbError::NoBackup { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

fn status(
    args: &CompdbStatusArgs,
    project: &Project,
    global: &GlobalArgs,
) -> Result<i32, Box<dyn std::error::Error>> {
    let preset = preset(project, args.preset.as_deref())?;
    let status = collect_status(&preset, project)?;

    match args.format {
        ReportFormat::Text => print_status(&status, global),
        ReportFormat::Json => println!("{}", serde_json::to_string_pretty(&status)?),
    }
    Ok(0)
}

fn print_status(status: &CompdbStatus, global: &GlobalArgs) {
    let describe = |file: &FileStatus| match (file.entries, file.generated) {
        (Some(entries), Some(generated)) => {
            format!("{} ({entries} entries, {generated} generated)", file.path.display())
        }
        _ => format!("{} (missing)", file.path.display()),
    };

    let state = match status.state {
        "filtered" => paint(status.state, YELLOW, global.color),
        other => paint(other, GREEN, global.color),
    };
    println!("   Preset    {}", status.preset);
    println!("   State     {state}");
    println!("   Database  {}", describe(&status.live));
    if status.backup.entries.is_some() {
        println!("   Backup    {}", describe(&status.backup));
    }
}

fn filter(
    preset: &ResolvedPreset,
    project: &Project,
    global: &GlobalArgs,
) -> Result<i32, Box<dyn std::error::Error>> {
    let file_name = &project.config.compdb.file_name;
    match project.transform().apply(&preset.name)? {
        ApplyOutcome::Applied(report) => {
            if !global.quiet {
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
                eprintln!("   Run `kiln compdb restore` to put the original back");
            }
        }
        ApplyOutcome::AlreadyBacked => {
            if !global.quiet {
                eprintln!("   {file_name} is already filtered");
            }
        }
    }
    Ok(0)
}

fn restore(
    preset: &ResolvedPreset,
    project: &Project,
    global: &GlobalArgs,
) -> Result<i32, Box<dyn std::error::Error>> {
    let file_name = &project.config.compdb.file_name;
    let outcome = project.transform().restore(&preset.name)?;
    if !global.quiet {
        match outcome {
            RestoreOutcome::Restored => eprintln!(
                "{}",
                paint(&format!("✓ Restored {file_name}"), GREEN, global.color)
            ),
            RestoreOutcome::AlreadyClean => eprintln!("   Nothing to restore"),
        }
    }
    Ok(0)
}
