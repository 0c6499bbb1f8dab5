use std::process::ExitStatus;

use async_trait::async_trait;
use tracing::debug;

use crate::error::RiskSyncError;

use super::{CommandLine, CommandRunner};

/// Marker that downgrades stderr output from an error to a notice. The
/// directory CLI prints deprecation warnings on stderr for commands that
/// still succeed.
const DEPRECATION_MARKER: &str = "deprecated";

/// Runs commands as child processes via `tokio::process::Command`.
#[derive(Debug, Default)]
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, command: &CommandLine) -> Result<String, RiskSyncError> {
        debug!(command = %command, "running directory command");

        let output = tokio::process::Command::new(&command.program)
            .args(command.args.iter().map(|a| a.value.as_str()))
            .stdin(std::process::Stdio::null())
            .output()
            .await
            .map_err(|e| {
                RiskSyncError::Command(format!("cannot start {}: {e}", command.program))
            })?;

        interpret(
            command,
            output.status,
            &String::from_utf8_lossy(&output.stdout),
            &String::from_utf8_lossy(&output.stderr),
        )
    }
}

/// Turn a finished process into the runner's result.
///
/// Any stderr text is a failure carrying that text, and so is a non-zero exit,
/// unless stderr only holds a deprecation notice.
fn interpret(
    command: &CommandLine,
    status: ExitStatus,
    stdout: &str,
    stderr: &str,
) -> Result<String, RiskSyncError> {
    let stderr = stderr.trim();
    let deprecation_only = stderr.contains(DEPRECATION_MARKER);

    if !stderr.is_empty() && !deprecation_only {
        return Err(RiskSyncError::Command(stderr.to_owned()));
    }
    if !status.success() && !deprecation_only {
        return Err(RiskSyncError::Command(format!(
            "`{command}` exited with {status}"
        )));
    }
    Ok(stdout.trim().to_owned())
}
