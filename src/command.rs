//! Synchronous subprocess execution with captured output.
//!
//! The [`Runner`] is the only place in the crate that starts processes.  It never treats a
//! nonzero exit status as an error by itself: callers look at the returned [`CommandOutput`] and
//! decide, so that they can fall back to something else (a different reference, a softer
//! warning) when a command fails.  In [`RunMode::DryRun`] nothing is executed at all; the intended
//! command line is logged and a neutral, successful output is returned.

use std::{
    ffi::{OsStr, OsString},
    path::Path,
    process::Command,
};

use log::{debug, info, warn};

use crate::{
    error::{Error, Result},
    tools::{Tool, Toolbox},
};

/// Arguments whose following value must never appear in logs.
const SECRET_FLAGS: &[&str] = &["--passphrase"];

/// Whether commands are actually executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    #[default]
    Execute,
    DryRun,
}

impl RunMode {
    pub fn from_dry_run(dry_run: bool) -> Self {
        if dry_run {
            Self::DryRun
        } else {
            Self::Execute
        }
    }
}

/// What a single command invocation produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// The command line, as logged (secrets redacted).
    pub command: String,
    /// Captured standard output, trimmed.
    pub stdout: String,
    /// Captured standard error, trimmed.
    pub stderr: String,
    /// Exit code; `None` when the process was killed by a signal or never ran.
    pub code: Option<i32>,
    /// False in dry-run mode.
    pub executed: bool,
}

impl CommandOutput {
    /// True if the command exited with status 0, or was skipped by a dry run.
    pub fn success(&self) -> bool {
        !self.executed || self.code == Some(0)
    }

    /// The most useful diagnostic text: stderr, or stdout if stderr is empty.
    pub fn diagnostic(&self) -> &str {
        if self.stderr.is_empty() {
            &self.stdout
        } else {
            &self.stderr
        }
    }

    /// Converts an unsuccessful exit into [`Error::CommandFailed`].
    pub fn check(self) -> Result<Self> {
        if self.success() {
            Ok(self)
        } else {
            Err(Error::CommandFailed {
                stderr: self.diagnostic().to_string(),
                command: self.command,
                code: self.code,
            })
        }
    }
}

/// Runs external tools according to a [`RunMode`].
#[derive(Debug, Clone, Default)]
pub struct Runner {
    mode: RunMode,
    tools: Toolbox,
}

impl Runner {
    pub fn new(mode: RunMode, tools: Toolbox) -> Self {
        Self { mode, tools }
    }

    pub fn is_dry_run(&self) -> bool {
        self.mode == RunMode::DryRun
    }

    /// Runs `tool` with `args` in the current directory.
    pub fn run<I, S>(&self, tool: Tool, args: I) -> Result<CommandOutput>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.run_program(self.tools.program(tool), args, None)
    }

    /// Runs `tool` with `args`, failing with [`Error::CommandFailed`] on a nonzero exit.
    pub fn run_checked<I, S>(&self, tool: Tool, args: I) -> Result<CommandOutput>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.run(tool, args)?.check()
    }

    /// Runs an arbitrary program, optionally in `cwd`.
    ///
    /// Only a failure to start the process is an error; the exit status is reported in the
    /// returned [`CommandOutput`].
    pub fn run_program<I, S>(
        &self,
        program: impl AsRef<OsStr>,
        args: I,
        cwd: Option<&Path>,
    ) -> Result<CommandOutput>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let program = program.as_ref();
        let args: Vec<OsString> = args.into_iter().map(|a| a.as_ref().to_owned()).collect();
        let command = format_command(program, &args);

        debug!("Running command: {command}");

        if self.is_dry_run() {
            info!("[dry run] Skipping execution of: {command}");
            return Ok(CommandOutput {
                command,
                ..Default::default()
            });
        }

        let mut cmd = Command::new(program);
        cmd.args(&args);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }

        let output = match cmd.output() {
            Ok(output) => output,
            Err(source) => return Err(Error::Spawn { command, source }),
        };

        let result = CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            code: output.status.code(),
            executed: true,
            command,
        };

        if !output.status.success() {
            match result.code {
                Some(code) => warn!("Command exited with code {code}: {}", result.command),
                None => warn!("Command terminated by signal: {}", result.command),
            }
            warn!("Error output: {}", result.stderr);
        }

        Ok(result)
    }
}

/// Renders a command line for logging, quoting arguments that need it and redacting secrets.
pub fn format_command(program: &OsStr, args: &[OsString]) -> String {
    let mut parts = vec![quote(&program.to_string_lossy())];
    let mut redact_next = false;
    for arg in args {
        let arg = arg.to_string_lossy();
        if redact_next {
            parts.push("******".to_string());
        } else {
            parts.push(quote(&arg));
        }
        redact_next = SECRET_FLAGS.contains(&arg.as_ref());
    }
    parts.join(" ")
}

fn quote(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@,+%".contains(c));
    if plain {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}
