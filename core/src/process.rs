//! The one seam through which the workspace starts external programs.

use crate::Result;
use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;

/// Number of stderr lines kept in command errors.
pub const ERROR_TAIL_LINES: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Feed this file to the child's stdin.
    pub stdin_file: Option<PathBuf>,
    /// Write the child's stdout to this file instead of capturing it.
    pub stdout_file: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdin_file: None,
            stdout_file: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn stdin_from(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdin_file = Some(path.into());
        self
    }

    pub fn stdout_to(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdout_file = Some(path.into());
        self
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        if let Some(stdin) = &self.stdin_file {
            write!(f, " < {}", stdin.display())?;
        }
        if let Some(stdout) = &self.stdout_file {
            write!(f, " > {}", stdout.display())?;
        }
        Ok(())
    }
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs the command to completion and returns its captured stdout. A
    /// non-zero exit is an `Error::Command` carrying the tail of stderr.
    async fn run(&self, command: &CommandSpec) -> Result<String>;
}

/// The last `count` lines joined with newlines.
pub fn last_lines(lines: &[&str], count: usize) -> String {
    let start = lines.len().saturating_sub(count);
    lines[start..].join("\n")
}
