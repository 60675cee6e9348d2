//! Narrow interface over the external `git` binary.
//!
//! The probe and the fetcher only ever see a [`ToolRunner`]: they build an
//! [`Invocation`] and inspect the returned [`ToolOutput`]. [`GitCli`] is the
//! production runner; tests substitute a scripted one.

pub mod fetch;
pub mod probe;

use std::{
    ffi::{OsStr, OsString},
    path::{Path, PathBuf},
    process::{Command, Stdio},
};

use log::trace;

/// Arguments for one external tool invocation, excluding the program itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invocation {
    args: Vec<OsString>,
}

impl Invocation {
    pub fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        Invocation {
            args: args.into_iter().map(|a| a.as_ref().to_owned()).collect(),
        }
    }

    /// Runs the invocation inside `path`, as `git -C <path> ...`.
    pub fn in_dir(path: &Path) -> Self {
        Invocation::new([OsStr::new("-C"), path.as_os_str()])
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_owned());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args.extend(args.into_iter().map(|a| a.as_ref().to_owned()));
        self
    }

    pub fn as_slice(&self) -> &[OsString] {
        &self.args
    }

    /// The git subcommand, skipping leading `-C <dir>` and `-c <key=value>` pairs.
    pub fn subcommand(&self) -> Option<&str> {
        let mut args = self.args.iter();
        while let Some(arg) = args.next() {
            match arg.to_str() {
                Some("-C") | Some("-c") => {
                    args.next();
                }
                other => return other,
            }
        }
        None
    }
}

impl std::fmt::Display for Invocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for arg in &self.args {
            if !first {
                f.write_str(" ")?;
            }
            first = false;
            write!(f, "{}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

/// Exit status and captured output of a finished invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        ToolOutput {
            success: true,
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        ToolOutput {
            success: false,
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Diagnostic text to surface to the user: stderr, or stdout if stderr is empty.
    pub fn diagnostics(&self) -> &str {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim()
        } else {
            stderr
        }
    }
}

/// Runs the external version control tool.
///
/// An `Err` means the tool could not be started at all; a non-zero exit is
/// reported through [`ToolOutput::success`].
pub trait ToolRunner: Send + Sync {
    fn run(&self, invocation: &Invocation) -> std::io::Result<ToolOutput>;
}

/// Runs the system `git` binary with interactive prompts and hooks disabled.
#[derive(Debug, Clone)]
pub struct GitCli {
    git_path: PathBuf,
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new("git")
    }
}

impl GitCli {
    pub fn new(git_path: impl Into<PathBuf>) -> Self {
        GitCli {
            git_path: git_path.into(),
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.git_path);
        cmd.env("GIT_TERMINAL_PROMPT", "0");
        cmd.args(["-c", "core.hooksPath="]);
        cmd.stdin(Stdio::null());
        cmd
    }
}

impl ToolRunner for GitCli {
    fn run(&self, invocation: &Invocation) -> std::io::Result<ToolOutput> {
        trace!("Running {} {}", self.git_path.display(), invocation);
        let output = self.command().args(invocation.as_slice()).output()?;
        Ok(ToolOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
