//! Host tool invocation.
//!
//! The filesystem backends shell out to `cp`, `unsquashfs` and `getfattr`.
//! All of them go through [`Cmd`], which captures both streams and turns a
//! non-zero exit into [`AnalyzerError::Command`] carrying the tool's stderr.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};

use tracing::trace;

use crate::error::{AnalyzerError, Result};

/// Captured output of a finished tool.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Exit code, or -1 when the tool was killed by a signal.
    pub fn exit_code(&self) -> i32 {
        self.status.code().unwrap_or(-1)
    }
}

/// Builder for one tool invocation.
#[derive(Debug)]
pub struct Cmd {
    program: String,
    args: Vec<OsString>,
    allow_fail: bool,
    context: Option<String>,
}

impl Cmd {
    pub fn new(program: impl AsRef<str>) -> Self {
        Self {
            program: program.as_ref().to_string(),
            args: Vec::new(),
            allow_fail: false,
            context: None,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    /// Host paths are passed through byte for byte.
    pub fn arg_path(mut self, path: &Path) -> Self {
        self.args.push(path.as_os_str().to_os_string());
        self
    }

    /// Return the output even when the tool exits non-zero.
    pub fn allow_fail(mut self) -> Self {
        self.allow_fail = true;
        self
    }

    /// Replace the default `'<program>' failed` prefix of the error.
    pub fn error_msg(mut self, msg: impl AsRef<str>) -> Self {
        self.context = Some(msg.as_ref().to_string());
        self
    }

    /// Run to completion. There is no timeout.
    pub fn run(self) -> Result<ToolOutput> {
        trace!(program = %self.program, args = ?self.args, "running host tool");
        let raw = Command::new(&self.program)
            .args(&self.args)
            .output()
            .map_err(|e| {
                AnalyzerError::Command(format!(
                    "could not start '{}', is it installed? ({})",
                    self.program, e
                ))
            })?;

        let out = ToolOutput {
            status: raw.status,
            stdout: String::from_utf8_lossy(&raw.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&raw.stderr).into_owned(),
        };
        if out.success() || self.allow_fail {
            return Ok(out);
        }
        Err(AnalyzerError::Command(self.failure_message(&out)))
    }

    fn failure_message(&self, out: &ToolOutput) -> String {
        let head = match &self.context {
            Some(ctx) => ctx.clone(),
            None => format!("'{}' failed", self.program),
        };
        match out.stderr.trim() {
            "" => format!("{} (exit code {})", head, out.exit_code()),
            stderr => format!("{} (exit code {}):\n{}", head, out.exit_code(), stderr),
        }
    }
}

/// Full path of `program` if it is on `PATH`.
pub fn which(program: &str) -> Option<PathBuf> {
    which::which(program).ok()
}

pub fn exists(program: &str) -> bool {
    which(program).is_some()
}
