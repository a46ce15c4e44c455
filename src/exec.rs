//! Allow-listed external command execution.
//!
//! Commands run without a shell. Arguments are still scrubbed of shell
//! metacharacters so output copied into a terminal cannot smuggle anything in.

use serde::{Deserialize, Serialize};
use tokio::process::Command;

use std::process::Stdio;
use std::time::Duration;

use crate::{Config, ProfhubError, ProfhubResult};

const SHELL_METACHARACTERS: &[char] = &[
    ';', '&', '|', '`', '$', '<', '>', '(', ')', '{', '}', '[', ']', '!', '\\', '\'', '"', '*',
    '?', '~', '#', '\n', '\r',
];

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecRequest {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

pub fn sanitize_arg(arg: &str) -> String {
    arg.chars()
        .filter(|c| !SHELL_METACHARACTERS.contains(c))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Sanitizes every argument, dropping the ones that end up empty.
pub fn sanitize_args(args: &[String]) -> Vec<String> {
    args.iter()
        .map(|a| sanitize_arg(a))
        .filter(|a| !a.is_empty())
        .collect()
}

/// Rejects anything but a bare binary name present in the allow-list.
pub fn check_command(config: &Config, command: &str) -> ProfhubResult<()> {
    let name = command.trim();
    if name.is_empty() {
        return Err(ProfhubError::invalid_field("command", "must not be empty"));
    }
    if name.contains(['/', '\\']) || !config.is_command_allowed(name) {
        return Err(ProfhubError::CommandNotAllowed(name.to_string()));
    }
    Ok(())
}

pub async fn run_command(config: &Config, request: &ExecRequest) -> ProfhubResult<ExecOutput> {
    check_command(config, &request.command)?;
    let args = sanitize_args(&request.args);
    let timeout = config.command_timeout.as_duration();
    run_allowed(request.command.trim(), &args, timeout).await
}

async fn run_allowed(command: &str, args: &[String], timeout: Duration) -> ProfhubResult<ExecOutput> {
    tracing::info!(command, ?args, "running external command");
    let child = Command::new(command)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| ProfhubError::CommandFailed(format!("failed to start {command}: {e}")))?;

    // On timeout the future is dropped, which kills the child.
    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| ProfhubError::Timeout(format!("{command} exceeded {}ms", timeout.as_millis())))??;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    let Some(exit_code) = output.status.code() else {
        return Err(ProfhubError::CommandFailed(format!(
            "{command} terminated by signal: {}",
            stderr.trim()
        )));
    };
    if exit_code != 0 {
        tracing::warn!(command, exit_code, "external command failed");
        return Err(ProfhubError::CommandFailed(format!(
            "command exited with status {exit_code}: {}",
            stderr.trim()
        )));
    }
    Ok(ExecOutput {
        stdout,
        stderr,
        exit_code,
    })
}
