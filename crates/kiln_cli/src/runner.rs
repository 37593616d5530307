//! External tool execution.
//!
//! Every program kiln drives (cmake, clang-format, cppcheck, run-clang-tidy,
//! the built application) goes through the [`ToolRunner`] trait so commands
//! can be exercised against a recording runner in tests.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

use crate::pipeline::{paint, CYAN};

/// One external program invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    /// Program name or path.
    pub program: String,
    /// Arguments, passed without shell interpretation.
    pub args: Vec<String>,
    /// Working directory, or the current one when `None`.
    pub current_dir: Option<PathBuf>,
    /// Variables set for this invocation only.
    pub env: BTreeMap<String, String>,
}

impl ToolInvocation {
    /// Starts an invocation of `program` with no arguments.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
            env: BTreeMap::new(),
        }
    }

    /// Appends one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets the working directory.
    pub fn current_dir(mut self, dir: &Path) -> Self {
        self.current_dir = Some(dir.to_path_buf());
        self
    }

    /// The command line as printed to the user.
    pub fn command_line(&self) -> String {
        let mut line = quote(&self.program);
        for arg in &self.args {
            line.push(' ');
            line.push_str(&quote(arg));
        }
        line
    }
}

fn quote(word: &str) -> String {
    if word.is_empty() || word.contains([' ', '\t', '"']) {
        format!("\"{}\"", word.replace('"', "\\\""))
    } else {
        word.to_string()
    }
}

/// Errors from running an external tool.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// The program could not be started.
    #[error("failed to start {program}: {source}")]
    Spawn {
        /// The program name.
        program: String,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The program ran and reported failure.
    #[error("{program} failed with {}", describe_exit(*code))]
    Failed {
        /// The program name.
        program: String,
        /// The exit code, `None` when terminated by a signal.
        code: Option<i32>,
    },

    /// A required program is not installed.
    #[error("{program} not found on PATH")]
    NotFound {
        /// The program name.
        program: String,
    },
}

fn describe_exit(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "a signal".to_string(),
    }
}

/// Runs external programs to completion.
pub trait ToolRunner {
    /// Runs the invocation, streaming its output, and waits for it to exit.
    fn run(&self, invocation: &ToolInvocation) -> Result<(), ToolError>;
}

/// Runs tools as child processes with inherited stdio.
pub struct ProcessRunner {
    env: BTreeMap<String, String>,
    quiet: bool,
    color: bool,
}

impl ProcessRunner {
    /// Creates a runner that applies `env` to every child.
    pub fn new(env: BTreeMap<String, String>, quiet: bool, color: bool) -> Self {
        Self { env, quiet, color }
    }
}

impl ToolRunner for ProcessRunner {
    fn run(&self, invocation: &ToolInvocation) -> Result<(), ToolError> {
        if !self.quiet {
            eprintln!(
                "{}",
                paint(
                    &format!("--> Running: {}", invocation.command_line()),
                    CYAN,
                    self.color
                )
            );
        }

        let program = resolve_program(&invocation.program);
        debug!(program = %program.display(), args = ?invocation.args, "spawning tool");

        let mut command = Command::new(&program);
        command
            .args(&invocation.args)
            .envs(&self.env)
            .envs(&invocation.env);
        if let Some(ref dir) = invocation.current_dir {
            command.current_dir(dir);
        }

        let status = command.status().map_err(|source| ToolError::Spawn {
            program: invocation.program.clone(),
            source,
        })?;
        debug!(program = %invocation.program, ?status, "tool exited");

        if status.success() {
            Ok(())
        } else {
            Err(ToolError::Failed {
                program: invocation.program.clone(),
                code: status.code(),
            })
        }
    }
}

/// Resolves a bare program name to a path.
///
/// On Windows `.exe`/`.bat` wrappers are only found through a PATHEXT
/// lookup, so the name is resolved with `which`. Elsewhere the OS lookup
/// performed by `Command` is used as is.
fn resolve_program(program: &str) -> PathBuf {
    if cfg!(windows) {
        which::which(program).unwrap_or_else(|_| PathBuf::from(program))
    } else {
        PathBuf::from(program)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::cell::RefCell;

    type Hook = Box<dyn Fn(&ToolInvocation)>;

    /// Records invocations instead of spawning them.
    #[derive(Default)]
    pub(crate) struct RecordingRunner {
        calls: RefCell<Vec<ToolInvocation>>,
        failing: BTreeMap<String, i32>,
        hook: Option<Hook>,
    }

    impl RecordingRunner {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        /// Makes every invocation of `program` fail with `code`.
        pub(crate) fn failing(mut self, program: &str, code: i32) -> Self {
            self.failing.insert(program.to_string(), code);
            self
        }

        /// Calls `hook` with each invocation while it "runs".
        pub(crate) fn with_hook(mut self, hook: impl Fn(&ToolInvocation) + 'static) -> Self {
            self.hook = Some(Box::new(hook));
            self
        }

        pub(crate) fn calls(&self) -> Vec<ToolInvocation> {
            self.calls.borrow().clone()
        }

        pub(crate) fn programs(&self) -> Vec<String> {
            self.calls.borrow().iter().map(|c| c.program.clone()).collect()
        }
    }

    impl ToolRunner for RecordingRunner {
        fn run(&self, invocation: &ToolInvocation) -> Result<(), ToolError> {
            self.calls.borrow_mut().push(invocation.clone());
            if let Some(ref hook) = self.hook {
                hook(invocation);
            }
            match self.failing.get(&invocation.program) {
                Some(&code) => Err(ToolError::Failed {
                    program: invocation.program.clone(),
                    code: Some(code),
                }),
                None => Ok(()),
            }
        }
    }
}
