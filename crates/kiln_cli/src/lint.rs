//! `kiln lint` — format check and static analysis in sequence.

use std::fmt;
use std::str::FromStr;

use crate::analyze;
use crate::format;
use crate::interrupt::{Interrupt, INTERRUPTED_EXIT_CODE};
use crate::pipeline::{paint, Project, GREEN};
use crate::runner::ToolRunner;
use crate::{GlobalArgs, LintArgs};

/// One lint step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LintStep {
    /// `clang-format --dry-run --Werror`.
    FormatCheck,
    /// cppcheck on the filtered database.
    Cppcheck,
    /// run-clang-tidy on the filtered database.
    Tidy,
}

impl LintStep {
    /// Every step, in the order `all` runs them.
    pub const ALL: [LintStep; 3] = [LintStep::FormatCheck, LintStep::Cppcheck, LintStep::Tidy];

    /// The step's name on the command line.
    pub fn name(self) -> &'static str {
        match self {
            LintStep::FormatCheck => "format-check",
            LintStep::Cppcheck => "cppcheck",
            LintStep::Tidy => "tidy",
        }
    }
}

impl fmt::Display for LintStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LintStep {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LintStep::ALL
            .into_iter()
            .find(|step| step.name() == s)
            .ok_or_else(|| {
                format!("unknown lint step '{s}' (expected format-check, cppcheck, tidy, or all)")
            })
    }
}

/// Parses `all` or a comma-separated list of steps, keeping the given order.
pub fn parse_steps(input: &str) -> Result<Vec<LintStep>, String> {
    if input.trim() == "all" {
        return Ok(LintStep::ALL.to_vec());
    }
    let steps = input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(LintStep::from_str)
        .collect::<Result<Vec<_>, _>>()?;
    if steps.is_empty() {
        return Err("no lint steps given".to_string());
    }
    Ok(steps)
}

/// Runs the `kiln lint` command.
///
/// Steps run in order and the first failing one ends the run with its
/// error. A pending interrupt stops the run before the next step. Returns
/// 0 when every step passed.
pub fn run(
    args: &LintArgs,
    project: &Project,
    runner: &dyn ToolRunner,
    interrupt: &Interrupt,
    global: &GlobalArgs,
) -> Result<i32, Box<dyn std::error::Error>> {
    let steps = parse_steps(&args.steps)?;

    for step in steps {
        if interrupt.is_set() {
            eprintln!("interrupted");
            return Ok(INTERRUPTED_EXIT_CODE);
        }
        if !global.quiet {
            eprintln!("   Linting {step}");
        }
        let code = match step {
            LintStep::FormatCheck => format::check(project, runner, global)?,
            LintStep::Cppcheck => analyze::cppcheck(project, runner, interrupt, global)?,
            LintStep::Tidy => analyze::tidy(project, runner, interrupt, global)?,
        };
        if code != 0 {
            return Ok(code);
        }
    }

    if !global.quiet {
        eprintln!();
        eprintln!("{}", paint("✓ All lint checks passed!", GREEN, global.color));
    }
    Ok(0)
}
