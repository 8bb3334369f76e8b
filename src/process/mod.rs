//! External command execution
//!
//! Every call to `mysqldump` or `mysql` goes through [`CommandRunner`], which
//! runs one command to completion and hands back its exit status and captured
//! output. Two failures are kept apart:
//!
//! - the program could not be started at all ([`ProcessError::ToolNotFound`])
//! - the program ran and exited non-zero ([`ProcessError::NonZeroExit`])
//!
//! There is no timeout and no cancellation. A started process runs until it
//! exits.

pub mod mysql;

use std::fmt;
use std::io;
use std::process::{Command, Stdio};

/// A single command line to execute.
///
/// Arguments marked secret are masked when the invocation is displayed or
/// debug-printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Invocation {
    program: String,
    args: Vec<String>,
    secret: Vec<usize>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            secret: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append an argument that must never reach a log line
    pub fn secret_arg(mut self, arg: impl Into<String>) -> Self {
        self.secret.push(self.args.len());
        self.args.push(arg.into());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for (i, arg) in self.args.iter().enumerate() {
            if self.secret.contains(&i) {
                // keep the flag prefix readable: -p**** rather than ****
                let shown = if arg.starts_with("-p") { "-p****" } else { "****" };
                write!(f, " {}", shown)?;
            } else if arg.contains(char::is_whitespace) {
                write!(f, " {:?}", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Invocation").field(&self.to_string()).finish()
    }
}

/// Exit status and captured streams of a finished process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when the process was terminated by a signal
    pub status: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    pub fn status_label(&self) -> String {
        match self.status {
            Some(code) => format!("exit code {}", code),
            None => "terminated by signal".to_string(),
        }
    }
}

/// Why a command did not succeed
#[derive(Debug)]
pub enum ProcessError {
    /// The executable could not be located or started
    ToolNotFound { program: String, source: io::Error },
    /// The process ran and reported failure
    NonZeroExit { program: String, output: CommandOutput },
}

impl fmt::Display for ProcessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessError::ToolNotFound { program, source } => {
                write!(f, "{} could not be started: {}", program, source)
            }
            ProcessError::NonZeroExit { program, output } => {
                write!(f, "{} failed with {}", program, output.status_label())
            }
        }
    }
}

impl std::error::Error for ProcessError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProcessError::ToolNotFound { source, .. } => Some(source),
            ProcessError::NonZeroExit { .. } => None,
        }
    }
}

/// Capability to run one external command and capture its result.
///
/// Implementations must only report `Ok` for a zero exit status.
pub trait CommandRunner {
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput, ProcessError>;
}

/// Runs commands on the host with `std::process::Command`.
///
/// stdin is closed so that a tool that decides to prompt for a password fails
/// instead of hanging.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput, ProcessError> {
        let output = Command::new(invocation.program())
            .args(invocation.args())
            .stdin(Stdio::null())
            .output()
            .map_err(|source| ProcessError::ToolNotFound {
                program: invocation.program().to_string(),
                source,
            })?;

        let output = CommandOutput {
            status: output.status.code(),
            stdout: output.stdout,
            stderr: output.stderr,
        };

        if output.success() {
            Ok(output)
        } else {
            Err(ProcessError::NonZeroExit {
                program: invocation.program().to_string(),
                output,
            })
        }
    }
}
