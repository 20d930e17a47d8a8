//! External command execution
//!
//! Account creation and the service-manager reload shell out to system
//! utilities. The [`CommandRunner`] trait keeps that boundary replaceable so
//! the adapters can be exercised without touching the host.

use crate::error::CommandError;
use std::io;
use std::process::Output;
use std::sync::{Arc, Mutex};

/// Output from an external command
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub success: bool,
    /// Exit code, `None` when terminated by a signal
    pub code: Option<i32>,
}

impl From<Output> for CommandOutput {
    fn from(output: Output) -> Self {
        Self {
            stdout: output.stdout,
            stderr: output.stderr,
            success: output.status.success(),
            code: output.status.code(),
        }
    }
}

impl CommandOutput {
    /// Successful output with empty streams
    pub fn ok() -> Self {
        Self {
            success: true,
            code: Some(0),
            ..Default::default()
        }
    }

    /// Failed output with the given exit code and stderr
    pub fn failed(code: i32, stderr: &str) -> Self {
        Self {
            stderr: stderr.as_bytes().to_vec(),
            success: false,
            code: Some(code),
            ..Default::default()
        }
    }

    /// Get stdout as a string
    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    /// Get stderr as a string
    pub fn stderr_str(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }

    fn status_label(&self) -> String {
        match self.code {
            Some(code) => format!("exit code {code}"),
            None => "termination by signal".to_string(),
        }
    }
}

/// Render a program and its arguments as one line for messages
pub fn command_line(program: &str, args: &[&str]) -> String {
    std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Runs external programs and reports their output
pub trait CommandRunner: Send + Sync {
    /// Run a command to completion, capturing its output
    fn run(&self, program: &str, args: &[&str]) -> io::Result<CommandOutput>;

    /// Run a command and turn spawn failures or a non-zero exit into an error
    fn run_checked(&self, program: &str, args: &[&str]) -> Result<CommandOutput, CommandError> {
        let output = self.run(program, args).map_err(|source| CommandError::Spawn {
            command: command_line(program, args),
            source,
        })?;

        if !output.success {
            return Err(CommandError::Failed {
                command: command_line(program, args),
                status: output.status_label(),
                stderr: output.stderr_str().trim().to_string(),
            });
        }

        Ok(output)
    }
}

/// Runner that records invocations and replays canned results.
///
/// Commands with no configured result succeed with empty output.
#[derive(Debug, Clone, Default)]
pub struct MockRunner {
    calls: Arc<Mutex<Vec<String>>>,
    failures: Arc<Mutex<Vec<(String, CommandOutput)>>>,
    unspawnable: Arc<Mutex<Vec<String>>>,
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every invocation of `program` fail with the given exit code
    pub fn fail(&self, program: &str, code: i32, stderr: &str) {
        let mut failures = self.failures.lock().unwrap();
        failures.push((program.to_string(), CommandOutput::failed(code, stderr)));
    }

    /// Make every invocation of `program` fail to spawn
    pub fn missing(&self, program: &str) {
        self.unspawnable.lock().unwrap().push(program.to_string());
    }

    /// Command lines seen so far, in order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl CommandRunner for MockRunner {
    fn run(&self, program: &str, args: &[&str]) -> io::Result<CommandOutput> {
        self.calls.lock().unwrap().push(command_line(program, args));

        if self.unspawnable.lock().unwrap().iter().any(|p| p == program) {
            return Err(io::Error::new(io::ErrorKind::NotFound, "No such file or directory"));
        }

        let failures = self.failures.lock().unwrap();
        Ok(failures
            .iter()
            .find(|(p, _)| p == program)
            .map(|(_, output)| output.clone())
            .unwrap_or_else(CommandOutput::ok))
    }
}
