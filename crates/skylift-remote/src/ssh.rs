//! OpenSSH-backed executor.
//!
//! Each call spawns the system `ssh` client once per command. Host keys
//! are not pinned: instances are brand new and their keys are unknown
//! ahead of time. Exit status 255 is how the client reports that it could
//! not establish the session, and is the only status retried.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use skylift_core::config::SshConfig;

use crate::error::{RemoteExecutionError, RemoteResult};
use crate::executor::{CommandOutput, RemoteExecutor, RemoteTarget};
use crate::shell;

/// Exit status the OpenSSH client uses for its own failures.
const SSH_CONNECT_FAILURE: i32 = 255;

/// Bounded connect retry with exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectRetry {
    pub attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for ConnectRetry {
    fn default() -> Self {
        Self {
            attempts: 5,
            initial_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl ConnectRetry {
    /// Delay before retry number `retry` (1-based): doubles each time up to
    /// `max_backoff`.
    pub fn backoff(&self, retry: u32) -> Duration {
        let mut delay = self.initial_backoff;
        for _ in 1..retry {
            delay = (delay * 2).min(self.max_backoff);
        }
        delay.min(self.max_backoff)
    }
}

#[derive(Debug, Clone)]
pub struct SshExecutor {
    program: String,
    retry: ConnectRetry,
    connect_timeout: Duration,
    command_timeout: Duration,
}

impl SshExecutor {
    pub fn new(
        program: impl Into<String>,
        retry: ConnectRetry,
        connect_timeout: Duration,
        command_timeout: Duration,
    ) -> Self {
        Self {
            program: program.into(),
            retry,
            connect_timeout,
            command_timeout,
        }
    }

    pub fn from_config(config: &SshConfig) -> Self {
        Self::new(
            config.program.clone(),
            ConnectRetry {
                attempts: config.connect_attempts,
                initial_backoff: config.initial_backoff(),
                max_backoff: config.max_backoff(),
            },
            config.connect_timeout(),
            config.command_timeout(),
        )
    }

    fn command(&self, target: &RemoteTarget, remote_command: &str) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-o")
            .arg("BatchMode=yes")
            .arg("-o")
            .arg("StrictHostKeyChecking=no")
            .arg("-o")
            .arg("UserKnownHostsFile=/dev/null")
            .arg("-o")
            .arg("LogLevel=ERROR")
            // Offer only the automation key; agent keys would use up MaxAuthTries.
            .arg("-o")
            .arg("IdentitiesOnly=yes")
            .arg("-o")
            .arg(format!(
                "ConnectTimeout={}",
                self.connect_timeout.as_secs().max(1)
            ))
            .arg("-i")
            .arg(&target.credential.identity_file)
            .arg("-p")
            .arg(target.address.port.to_string())
            .arg(format!(
                "{}@{}",
                target.credential.user, target.address.host
            ))
            .arg(remote_command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    async fn run_once(&self, target: &RemoteTarget, remote_command: &str) -> RemoteResult<CommandOutput> {
        let mut cmd = self.command(target, remote_command);
        let output = tokio::time::timeout(self.command_timeout, cmd.output())
            .await
            .map_err(|_| RemoteExecutionError::Timeout(self.command_timeout))?
            .map_err(|e| RemoteExecutionError::Spawn(format!("{}: {e}", self.program)))?;

        Ok(CommandOutput {
            // Killed by a signal: no code.
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[async_trait]
impl RemoteExecutor for SshExecutor {
    async fn run(&self, target: &RemoteTarget, command: &str) -> RemoteResult<CommandOutput> {
        let attempts = self.retry.attempts.max(1);
        let label = shell::label(command);
        let mut last_stderr = String::new();

        for attempt in 1..=attempts {
            debug!(%target, command = %label, attempt, "running remote command");
            let output = self.run_once(target, command).await?;
            if output.exit_code != SSH_CONNECT_FAILURE {
                return Ok(output);
            }

            last_stderr = shell::tail(&output.stderr);
            if attempt < attempts {
                let delay = self.retry.backoff(attempt);
                warn!(
                    %target,
                    attempt,
                    attempts,
                    retry_in = ?delay,
                    stderr = %last_stderr,
                    "ssh connection failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }

        Err(RemoteExecutionError::ConnectionFailed {
            target: target.to_string(),
            attempts,
            stderr: last_stderr,
        })
    }
}
