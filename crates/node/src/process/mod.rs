use async_trait::async_trait;
use log::debug;
use std::io;

#[cfg(test)]
pub(crate) mod fake;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CommandOutput {
    pub(crate) status_code: i32,
    pub(crate) stdout: String,
    pub(crate) stderr: String,
}

impl CommandOutput {
    pub(crate) const fn success(&self) -> bool {
        self.status_code == 0
    }
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum CommandError {
    #[error("Failed to execute {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("Command `{program} {}` exited with code {code}", args.join(" "))]
    Failed {
        program: String,
        args: Vec<String>,
        code: i32,
        stderr: String,
    },
}

pub(crate) fn to_args(args: &[&str]) -> Vec<String> {
    args.iter().map(|arg| arg.to_string()).collect()
}

/// Runs external programs to completion and captures their output.
#[async_trait]
pub(crate) trait ProcessRunner: Send + Sync {
    /// Returns the captured output whatever the exit code was.
    async fn output(&self, program: &str, args: &[String]) -> Result<CommandOutput, CommandError>;

    /// Like [`ProcessRunner::output`] but a non-zero exit code is an error.
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput, CommandError> {
        let output = self.output(program, args).await?;
        if output.success() {
            return Ok(output);
        }

        debug!(
            "`{program} {}` exited with {}: {}",
            args.join(" "),
            output.status_code,
            output.stderr.trim()
        );
        Err(CommandError::Failed {
            program: program.to_string(),
            args: args.to_vec(),
            code: output.status_code,
            stderr: output.stderr,
        })
    }
}

pub(crate) struct SystemProcessRunner;

#[async_trait]
impl ProcessRunner for SystemProcessRunner {
    async fn output(&self, program: &str, args: &[String]) -> Result<CommandOutput, CommandError> {
        debug!("Executing: {program} {}", args.join(" "));
        let output = tokio::process::Command::new(program)
            .args(args)
            .output()
            .await
            .map_err(|source| CommandError::Spawn {
                program: program.to_string(),
                source,
            })?;

        let status_code = output
            .status
            .code()
            .unwrap_or(if output.status.success() { 0 } else { 1 });

        Ok(CommandOutput {
            status_code,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
