//! External command execution
//!
//! `grpcurl` is driven as a subprocess. The [`CommandRunner`] seam lets tests
//! substitute canned process output.

use super::error::TransportError;
use async_trait::async_trait;
use std::fmt;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Captured output of a finished process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when terminated by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs a program to completion
#[async_trait]
pub trait CommandRunner: Send + Sync + fmt::Debug {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<CommandOutput, TransportError>;
}

/// [`CommandRunner`] backed by `tokio::process`
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioCommandRunner;

#[async_trait]
impl CommandRunner for TokioCommandRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<CommandOutput, TransportError> {
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TransportError::Command {
                command: program.to_string(),
                message: format!("failed to spawn: {}", e),
                output: String::new(),
            })?;

        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| TransportError::Timeout {
                target: program.to_string(),
                timeout,
            })?
            .map_err(|e| TransportError::Command {
                command: program.to_string(),
                message: format!("failed to collect output: {}", e),
                output: String::new(),
            })?;

        Ok(CommandOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Render a command line for diagnostics, masking bearer tokens
pub fn render_command(program: &str, args: &[String]) -> String {
    let mut parts = vec![program.to_string()];
    for arg in args {
        if arg.to_ascii_lowercase().starts_with("authorization:") {
            parts.push("'Authorization: Bearer ***'".to_string());
        } else if arg.contains(' ') || arg.contains('"') {
            parts.push(format!("'{}'", arg));
        } else {
            parts.push(arg.clone());
        }
    }
    parts.join(" ")
}
