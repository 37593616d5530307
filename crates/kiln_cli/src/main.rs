//! Kiln CLI — the command-line driver for a CMake/Qt C++ project.
//!
//! Provides `kiln build` and `kiln run` for the preset workflow, `kiln format`
//! and `kiln format-check` around clang-format, `kiln cppcheck`, `kiln tidy`
//! and `kiln lint` for static analysis against a filtered compile-command
//! database, and `kiln compdb` for inspecting or repairing that database.

#![warn(missing_docs)]

mod analyze;
mod build;
mod compdb;
mod format;
mod interrupt;
mod lint;
mod pipeline;
mod runner;

use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use crate::pipeline::Project;
use crate::runner::{ProcessRunner, ToolError};

/// Environment variable overriding the log filter.
const LOG_ENV: &str = "KILN_LOG";

/// Kiln — build, format, and analyze a CMake/Qt project.
#[derive(Parser, Debug)]
#[command(name = "kiln", version, about = "Kiln C++ project orchestrator")]
pub struct Cli {
    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable verbose (debug-level) output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Control colored output.
    #[arg(long, global = true, value_enum, default_value_t = ColorChoice::Auto)]
    pub color: ColorChoice,

    /// Path to a custom `kiln.toml` configuration file.
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// The subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Configure and build a preset.
    Build(PresetArgs),
    /// Run the application, building it first if needed.
    Run(PresetArgs),
    /// Remove build directories and caches.
    Clean,
    /// Format sources in place with clang-format.
    Format,
    /// Check formatting without changing files.
    FormatCheck,
    /// Run cppcheck against the filtered compile-command database.
    Cppcheck,
    /// Run clang-tidy against the filtered compile-command database.
    Tidy,
    /// Run lint steps (format-check, cppcheck, tidy) in order.
    Lint(LintArgs),
    /// Inspect or repair the compile-command database.
    #[command(subcommand)]
    Compdb(CompdbCommand),
}

/// A preset name argument shared by several commands.
#[derive(Parser, Debug)]
pub struct PresetArgs {
    /// CMake preset (defaults to `build.default_preset`).
    pub preset: Option<String>,
}

/// Arguments for the `kiln lint` subcommand.
#[derive(Parser, Debug)]
pub struct LintArgs {
    /// Comma-separated steps, or `all`.
    #[arg(default_value = "all")]
    pub steps: String,
}

/// `kiln compdb` subcommands.
#[derive(Subcommand, Debug)]
pub enum CompdbCommand {
    /// Show whether a filtered view is active and how many records it hides.
    Status(CompdbStatusArgs),
    /// Back up the database and replace it with the filtered view.
    Filter(PresetArgs),
    /// Put the original database back from its backup.
    Restore(PresetArgs),
}

/// Arguments for `kiln compdb status`.
#[derive(Parser, Debug)]
pub struct CompdbStatusArgs {
    /// CMake preset (defaults to `compdb.analysis_preset`).
    pub preset: Option<String>,

    /// Output format.
    #[arg(short, long, value_enum, default_value_t = ReportFormat::Text)]
    pub format: ReportFormat,
}

/// Controls whether colored output is produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ColorChoice {
    /// Detect from terminal capabilities.
    Auto,
    /// Always produce colored output.
    Always,
    /// Never produce colored output.
    Never,
}

/// Report output format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    /// Human-readable terminal output.
    Text,
    /// Machine-readable JSON output.
    Json,
}

/// Global settings derived from CLI flags.
pub struct GlobalArgs {
    /// Whether to suppress non-error output.
    pub quiet: bool,
    /// Whether to print verbose/debug information.
    pub verbose: bool,
    /// Whether to use colored output.
    pub color: bool,
    /// Optional path to a custom config file.
    pub config: Option<String>,
}

fn main() {
    let cli = Cli::parse();

    let color = match cli.color {
        ColorChoice::Auto => std::io::IsTerminal::is_terminal(&std::io::stderr()),
        ColorChoice::Always => true,
        ColorChoice::Never => false,
    };

    let global = GlobalArgs {
        quiet: cli.quiet,
        verbose: cli.verbose,
        color,
        config: cli.config,
    };

    init_logging(&global);

    match dispatch(&cli.command, &global) {
        Ok(code) => process::exit(code),
        Err(e) => {
            let message = format!("error: {e}");
            eprintln!("{}", pipeline::paint(&message, pipeline::RED, global.color));
            process::exit(exit_code_for(e.as_ref()));
        }
    }
}

/// Loads the project and runs one command.
fn dispatch(command: &Command, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let project = Project::load(global)?;
    let runner = ProcessRunner::new(project.config.env.clone(), global.quiet, global.color);

    match command {
        Command::Build(args) => build::build(&project, &runner, args.preset.as_deref(), global),
        Command::Run(args) => build::run(&project, &runner, args.preset.as_deref(), global),
        Command::Clean => build::clean(&project, global),
        Command::Format => format::format(&project, &runner, global),
        Command::FormatCheck => format::check(&project, &runner, global),
        Command::Cppcheck => analyze::cppcheck(&project, &runner, &interrupt::trap()?, global),
        Command::Tidy => analyze::tidy(&project, &runner, &interrupt::trap()?, global),
        Command::Lint(args) => lint::run(args, &project, &runner, &interrupt::trap()?, global),
        Command::Compdb(cmd) => compdb::run(cmd, &project, global),
    }
}

/// A failed tool propagates its own exit code; everything else exits 1.
fn exit_code_for(err: &(dyn std::error::Error + 'static)) -> i32 {
    match err.downcast_ref::<ToolError>() {
        Some(ToolError::Failed {
            code: Some(code), ..
        }) if *code != 0 => *code,
        _ => 1,
    }
}

/// Installs the tracing subscriber.
///
/// `KILN_LOG` takes a full filter directive; otherwise `--verbose` enables
/// debug events from the kiln crates and `--quiet` limits output to errors.
fn init_logging(global: &GlobalArgs) {
    let default = if global.verbose {
        "kiln_cli=debug,kiln_compdb=debug,kiln_config=debug"
    } else if global.quiet {
        "error"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(global.color)
        .with_writer(std::io::stderr)
        .init();
}
