use std::ffi::OsString;
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::error::{PipelineError, Result};

/// Lines of a failed tool's stderr kept for the error message.
const STDERR_TAIL_LINES: usize = 20;

/// One external command line, optionally with stdout sent to a file.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub program: OsString,
    pub args: Vec<OsString>,
    pub stdout: Option<PathBuf>,
}

impl Invocation {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdout: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn stdout_to(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdout = Some(path.into());
        self
    }

    /// File name of the program, used in messages.
    pub fn tool_name(&self) -> String {
        Path::new(&self.program)
            .file_name()
            .unwrap_or(self.program.as_os_str())
            .to_string_lossy()
            .into_owned()
    }

    /// Value following `flag` in the argument list, if any.
    pub fn flag_value(&self, flag: &str) -> Option<&Path> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(Path::new)
    }

    pub fn has_arg(&self, arg: &str) -> bool {
        self.args.iter().any(|a| a == arg)
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.to_string_lossy())?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        if let Some(ref out) = self.stdout {
            write!(f, " > {}", out.display())?;
        }
        Ok(())
    }
}

/// How a finished process ended.
#[derive(Debug, Clone, PartialEq)]
pub struct ExitReport {
    pub success: bool,
    pub status: String,
    pub stderr: String,
}

impl ExitReport {
    pub fn ok() -> Self {
        Self {
            success: true,
            status: "exit status: 0".to_string(),
            stderr: String::new(),
        }
    }

    pub fn failed(code: i32, stderr: &str) -> Self {
        Self {
            success: false,
            status: format!("exit status: {}", code),
            stderr: stderr.to_string(),
        }
    }
}

/// Runs external programs one at a time, blocking until each finishes.
pub trait ProcessRunner {
    /// Errors only when the program could not be started; a non-zero exit is an `ExitReport`.
    fn run(&self, invocation: &Invocation) -> Result<ExitReport>;

    /// Runs and turns a non-zero exit into `PipelineError::ToolFailed`.
    fn run_checked(&self, invocation: &Invocation) -> Result<()> {
        let report = self.run(invocation)?;
        if report.success {
            Ok(())
        } else {
            Err(PipelineError::ToolFailed {
                tool: invocation.tool_name(),
                status: report.status,
                stderr: report.stderr,
            })
        }
    }
}

/// Runner backed by `std::process::Command`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl ProcessRunner for SystemRunner {
    fn run(&self, invocation: &Invocation) -> Result<ExitReport> {
        log::debug!("Running: {}", invocation);

        let mut command = Command::new(&invocation.program);
        command.args(&invocation.args).stdin(Stdio::null()).stderr(Stdio::piped());
        match invocation.stdout {
            Some(ref path) => {
                command.stdout(File::create(path)?);
            }
            None => {
                command.stdout(Stdio::inherit());
            }
        }

        let output = command.output().map_err(|source| PipelineError::Spawn {
            tool: invocation.tool_name(),
            source,
        })?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if output.status.success() {
            for line in stderr.lines() {
                log::debug!("[{}] {}", invocation.tool_name(), line);
            }
        }

        Ok(ExitReport {
            success: output.status.success(),
            status: output.status.to_string(),
            stderr: tail(&stderr, STDERR_TAIL_LINES),
        })
    }
}

fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.lines().collect();
    let start = all.len().saturating_sub(lines);
    all[start..].join("\n")
}

/// True if `path` exists and has at least one byte.
pub fn non_empty(path: &Path) -> bool {
    path.metadata().map(|m| m.is_file() && m.len() > 0).unwrap_or(false)
}
